
//! Describes the meta data of a deep scanline file.

pub mod attribute;

use crate::compression::Compression;
use crate::error::{i32_to_usize, usize_to_i32, Error, Result, UnitResult};
use crate::io::{Data, PeekRead, Read, Tracking, Write};
use crate::math::Vec2;
use crate::meta::attribute::{
    attribute_names, block_type_strings, AttributeValue, ChannelList,
    IntegerBounds, LineOrder, Matrix4x4, Text,
};
use std::io::Seek;


/// The first four bytes of each file.
/// Used to abort reading files that are not in this format.
pub mod magic_number {
    use super::*;

    /// The first four bytes of each file in this format.
    pub const BYTES: [u8; 4] = [0x76, 0x2f, 0x31, 0x01];

    /// Without validation, write this instance to the byte stream.
    pub fn write(write: &mut impl Write) -> UnitResult {
        u8::write_slice(write, &self::BYTES)
    }

    /// Consumes four bytes from the reader and returns whether the file may be in this format.
    pub fn is_exr(read: &mut impl Read) -> Result<bool> {
        let mut magic_num = [0; 4];
        u8::read_slice(read, &mut magic_num)?;
        Ok(magic_num == self::BYTES)
    }

    /// Validate the first four bytes of the file. If they match, return `Ok(())`.
    pub fn validate_exr(read: &mut impl Read) -> UnitResult {
        if self::is_exr(read)? {
            Ok(())
        }
        else {
            Err(Error::invalid("file identifier missing"))
        }
    }
}

/// A `0_u8` at the end of a sequence.
pub mod sequence_end {
    use super::*;

    /// Number of bytes this would consume in a file.
    pub fn byte_size() -> usize {
        1
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(write: &mut W) -> UnitResult {
        0_u8.write(write)
    }

    /// Peeks the next byte. If it is zero, consumes the byte and returns true.
    pub fn has_come(read: &mut PeekRead<impl Read>) -> Result<bool> {
        Ok(read.skip_if_eq(0)?)
    }
}

fn missing_attribute(name: &str) -> Error {
    Error::invalid(format!("missing or invalid {} attribute", name))
}


/// Used to determine whether a file can be read by this crate.
/// Includes the file format version number.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct Requirements {

    /// The file format version. Deep data requires version 2.
    pub file_format_version: u8,

    /// If true, this file has tiled blocks and contains only a single layer.
    pub is_single_layer_and_tiled: bool,

    /// Whether this file has strings with a length greater than 31.
    /// Strings can never be longer than 255.
    pub has_long_names: bool,

    /// This file contains at least one layer with deep data.
    pub has_deep_data: bool,

    /// Whether this file contains multiple layers.
    pub has_multiple_layers: bool,
}

impl Requirements {

    /// The requirements of any single-layer deep scanline file this crate writes.
    pub fn for_deep_scan_lines() -> Self {
        Requirements {
            file_format_version: 2,
            is_single_layer_and_tiled: false,
            has_long_names: false,
            has_deep_data: true,
            has_multiple_layers: false,
        }
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        use ::bit_field::BitField;

        let version_and_flags = u32::read(read)?;

        // take the 8 least significant bits, they contain the file format version number
        let version = (version_and_flags & 0x000F) as u8;

        // the 24 most significant bits are treated as a set of boolean flags
        let is_single_tile = version_and_flags.get_bit(9);
        let has_long_names = version_and_flags.get_bit(10);
        let has_deep_data = version_and_flags.get_bit(11);
        let has_multiple_layers = version_and_flags.get_bit(12);

        // all remaining bits except 9, 10, 11 and 12 are reserved and should be 0
        // if a file has any of these bits set to 1, it contains
        // a feature that this crate does not know of
        let unknown_flags = version_and_flags >> 13;

        if unknown_flags != 0 {
            return Err(Error::unsupported("too new file feature flags"));
        }

        Ok(Requirements {
            file_format_version: version,
            is_single_layer_and_tiled: is_single_tile,
            has_long_names,
            has_deep_data,
            has_multiple_layers,
        })
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(self, write: &mut W) -> UnitResult {
        use ::bit_field::BitField;

        // the 8 least significant bits contain the file format version number,
        // the 24 most significant bits are treated as a set of boolean flags
        let mut version_and_flags = self.file_format_version as u32;

        version_and_flags.set_bit(9, self.is_single_layer_and_tiled);
        version_and_flags.set_bit(10, self.has_long_names);
        version_and_flags.set_bit(11, self.has_deep_data);
        version_and_flags.set_bit(12, self.has_multiple_layers);
        // all remaining bits except 9, 10, 11 and 12 are reserved and should be 0

        version_and_flags.write(write)?;
        Ok(())
    }

    /// Returns an error for files this crate cannot process:
    /// everything but single-layer deep scanline files of format version 2.
    pub fn validate(&self) -> UnitResult {
        if self.file_format_version != 2 {
            return Err(Error::unsupported("deep data requires file format version 2"));
        }

        if self.has_multiple_layers {
            return Err(Error::unsupported("multi-layer deep files"));
        }

        if self.is_single_layer_and_tiled {
            return Err(Error::unsupported("tiled deep files"));
        }

        if !self.has_deep_data {
            return Err(Error::invalid("file contains no deep data"));
        }

        Ok(())
    }
}


/// Describes the single layer of a deep scanline file.
#[derive(Clone, Debug, PartialEq)]
pub struct Header {

    /// List of channels in this layer, sorted alphabetically.
    pub channels: ChannelList,

    /// How the sample data of all channels in this layer is compressed.
    pub compression: Compression,

    /// In what order the chunks of this header occur in the file.
    pub line_order: LineOrder,

    /// The rectangle that this layer's pixels occupy,
    /// anywhere in the global infinite 2D space of the file.
    pub data_window: IntegerBounds,

    /// The rectangle that clips all contents of the file for display.
    pub display_window: IntegerBounds,

    /// Aspect ratio of each pixel in this layer.
    pub pixel_aspect: f32,

    /// Part of the perspective projection. Default should be `(0, 0)`.
    pub screen_window_center: Vec2<f32>,

    /// Part of the perspective projection. Default should be `1`.
    pub screen_window_width: f32,

    /// This crate supports only deep data version 1.
    pub deep_data_version: i32,

    /// Maximum number of samples in a single pixel.
    /// The value `-1` is written while the data is not yet known,
    /// and overwritten when the file is complete. Files that were not
    /// closed correctly may still contain `-1`.
    pub max_samples_per_pixel: i32,

    /// The matrix that transforms 3D points from the world to the camera coordinate space.
    pub world_to_camera: Option<Matrix4x4>,

    /// The matrix that transforms 3D points from the world
    /// to the "Normalized Device Coordinate" space.
    pub world_to_normalized_device: Option<Matrix4x4>,
}

impl Header {

    /// Create a deep scanline header with default projection attributes.
    pub fn new(data_size: Vec2<usize>, channels: ChannelList, compression: Compression) -> Self {
        Header {
            channels,
            compression,
            line_order: LineOrder::Increasing,
            data_window: IntegerBounds::from_dimensions(data_size),
            display_window: IntegerBounds::from_dimensions(data_size),
            pixel_aspect: 1.0,
            screen_window_center: Vec2(0.0, 0.0),
            screen_window_width: 1.0,
            deep_data_version: 1,
            max_samples_per_pixel: -1,
            world_to_camera: None,
            world_to_normalized_device: None,
        }
    }

    /// The resolution of this layer. Equals the size of the data window.
    pub fn data_size(&self) -> Vec2<usize> {
        self.data_window.size
    }

    /// Number of chunks in this file.
    /// Each chunk of deep scanline data contains exactly one scanline.
    pub fn chunk_count(&self) -> usize {
        self.data_window.size.height()
    }

    /// Validate this instance.
    pub fn validate(&self) -> UnitResult {
        self.channels.validate()?;
        self.data_window.validate()?;
        self.display_window.validate()?;

        if self.deep_data_version != 1 {
            return Err(Error::unsupported("deep data version other than 1"));
        }

        if self.data_window.size.area() == 0 {
            return Err(Error::invalid("empty data window"));
        }

        Ok(())
    }

    /// Read the value without validating. Unknown attributes are skipped.
    pub fn read(read: &mut PeekRead<impl Read>, requirements: &Requirements) -> Result<Self> {
        let max_string_len = if requirements.has_long_names { 256 } else { 32 };

        // these required attributes will be filled when encountered while parsing
        let mut block_type = None;
        let mut channels = None;
        let mut compression = None;
        let mut data_window = None;
        let mut display_window = None;
        let mut line_order = None;
        let mut pixel_aspect = None;
        let mut screen_window_center = None;
        let mut screen_window_width = None;
        let mut deep_data_version = None;
        let mut chunk_count = None;
        let mut max_samples_per_pixel = None;
        let mut world_to_camera = None;
        let mut world_to_normalized_device = None;

        // read each attribute in this header
        while !sequence_end::has_come(read)? {
            let (attribute_name, value) = attribute::read(read, max_string_len)?;

            // unknown attribute types were already skipped
            let value = match value {
                Some(value) => value,
                None => continue,
            };

            use crate::meta::attribute::attribute_names as name;
            use crate::meta::attribute::AttributeValue::*;

            // the following attributes are stored only if the attribute type
            // matches the commonly used type for that attribute name
            match (attribute_name.as_slice(), value) {
                (name::BLOCK_TYPE, Text(value)) => block_type = Some(value),
                (name::CHANNELS, ChannelList(value)) => channels = Some(value),
                (name::COMPRESSION, Compression(value)) => compression = Some(value),
                (name::DATA_WINDOW, IntegerBounds(value)) => data_window = Some(value),
                (name::DISPLAY_WINDOW, IntegerBounds(value)) => display_window = Some(value),
                (name::LINE_ORDER, LineOrder(value)) => line_order = Some(value),
                (name::PIXEL_ASPECT, F32(value)) => pixel_aspect = Some(value),
                (name::WINDOW_CENTER, FloatVec2(value)) => screen_window_center = Some(value),
                (name::WINDOW_WIDTH, F32(value)) => screen_window_width = Some(value),
                (name::DEEP_DATA_VERSION, I32(value)) => deep_data_version = Some(value),
                (name::CHUNKS, I32(value)) => chunk_count = Some(i32_to_usize(value, "chunk count")?),
                (name::MAX_SAMPLES, I32(value)) => max_samples_per_pixel = Some(value),
                (name::WORLD_TO_CAMERA, Matrix4x4(value)) => world_to_camera = Some(value),
                (name::WORLD_TO_NDC, Matrix4x4(value)) => world_to_normalized_device = Some(value),

                // this crate carries no other attributes through
                _ => {}
            }
        }

        match block_type {
            Some(ref value) if value.as_slice() == block_type_strings::DEEP_SCAN_LINE => {},

            Some(ref value) if value.as_slice() == block_type_strings::SCAN_LINE
                || value.as_slice() == block_type_strings::TILE =>
                return Err(Error::invalid("file contains no deep data")),

            Some(ref value) if value.as_slice() == block_type_strings::DEEP_TILE =>
                return Err(Error::unsupported("tiled deep files")),

            _ => return Err(missing_attribute("type")),
        }

        let data_window = data_window.ok_or_else(|| missing_attribute("data window"))?;
        data_window.validate()?;

        let header = Header {
            channels: channels.ok_or_else(|| missing_attribute("channels"))?,
            compression: compression.ok_or_else(|| missing_attribute("compression"))?,
            line_order: line_order.unwrap_or(LineOrder::Unspecified),
            data_window,
            display_window: display_window.ok_or_else(|| missing_attribute("display window"))?,
            pixel_aspect: pixel_aspect.unwrap_or(1.0),
            screen_window_center: screen_window_center.unwrap_or(Vec2(0.0, 0.0)),
            screen_window_width: screen_window_width.unwrap_or(1.0),
            deep_data_version: deep_data_version.ok_or_else(|| missing_attribute("deep data version"))?,
            max_samples_per_pixel: max_samples_per_pixel.ok_or_else(|| missing_attribute("max samples per pixel"))?,
            world_to_camera,
            world_to_normalized_device,
        };

        // always compute the chunk count ourselves, but verify the declared one
        if let Some(declared) = chunk_count {
            if declared != header.chunk_count() {
                return Err(Error::invalid("chunk count not matching data size"));
            }
        }
        else {
            return Err(missing_attribute("chunk count"));
        }

        Ok(header)
    }

    /// Without validation, write this instance to the byte stream.
    ///
    /// Returns the byte position of the `maxSamplesPerPixel` value,
    /// so it can be overwritten after all sample data was written.
    pub fn write<W: Write + Seek>(&self, write: &mut Tracking<W>) -> Result<usize> {

        macro_rules! write_attributes {
            ( $($name: ident : $variant: ident = $value: expr),* ) => { $(
                attribute::write(attribute_names::$name, & AttributeValue::$variant($value), write)?;
            )* };
        }

        write_attributes!(
            BLOCK_TYPE: Text = Text::from_bytes(&block_type_strings::DEEP_SCAN_LINE[..]),
            CHANNELS: ChannelList = self.channels.clone(),
            COMPRESSION: Compression = self.compression,
            DATA_WINDOW: IntegerBounds = self.data_window,
            DISPLAY_WINDOW: IntegerBounds = self.display_window,
            LINE_ORDER: LineOrder = self.line_order,
            PIXEL_ASPECT: F32 = self.pixel_aspect,
            WINDOW_CENTER: FloatVec2 = self.screen_window_center,
            WINDOW_WIDTH: F32 = self.screen_window_width,
            DEEP_DATA_VERSION: I32 = self.deep_data_version,
            CHUNKS: I32 = usize_to_i32(self.chunk_count(), "chunk count")?
        );

        // remember where the max sample count value lands,
        // as it is only known after all chunks are written
        attribute::write_preamble(
            attribute_names::MAX_SAMPLES,
            attribute::type_names::I32, i32::BYTE_SIZE, write
        )?;

        let max_samples_byte_position = write.byte_position();
        self.max_samples_per_pixel.write(write)?;

        if let Some(matrix) = self.world_to_camera {
            attribute::write(attribute_names::WORLD_TO_CAMERA, &AttributeValue::Matrix4x4(matrix), write)?;
        }

        if let Some(matrix) = self.world_to_normalized_device {
            attribute::write(attribute_names::WORLD_TO_NDC, &AttributeValue::Matrix4x4(matrix), write)?;
        }

        sequence_end::write(write)?;
        Ok(max_samples_byte_position)
    }
}


/// Contains the complete meta data of a deep scanline file.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaData {

    /// Some flags summarizing the features that must be supported to decode the file.
    pub requirements: Requirements,

    /// The header describing the single layer in this file.
    pub header: Header,
}

impl MetaData {

    /// Read the meta data of a deep scanline file,
    /// rejecting all files this crate cannot process.
    pub fn read_validated(read: &mut PeekRead<impl Read>) -> Result<Self> {
        magic_number::validate_exr(read)?;

        let requirements = Requirements::read(read)?;
        requirements.validate()?;

        let header = Header::read(read, &requirements)?;
        header.validate()?;

        Ok(MetaData { requirements, header })
    }
}
