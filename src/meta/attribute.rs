
//! Contains the attribute definitions needed for deep scanline files.
//! Unknown attributes are skipped when reading, never errors.

use smallvec::SmallVec;

use crate::compression::Compression;
use crate::error::{i32_to_usize, usize_to_i32, Error, Result, UnitResult};
use crate::io::{Data, PeekRead, Read, Write};
use crate::math::Vec2;
use crate::meta::sequence_end;


/// A byte array with each byte being a char.
/// This is not UTF and must be constructed from a standard string.
#[derive(Clone, PartialEq, Eq, Ord, PartialOrd, Default, Hash)]
pub struct Text {
    bytes: SmallVec<[u8; 24]>,
}

impl Text {

    /// Create a `Text` from the specified bytes.
    pub fn from_bytes(bytes: impl Into<SmallVec<[u8; 24]>>) -> Self {
        Text { bytes: bytes.into() }
    }

    /// The underlying bytes of this text.
    pub fn as_slice(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    /// Number of bytes, without any terminator.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether this text contains no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of bytes this would consume in a file, including the terminating zero byte.
    pub fn null_terminated_byte_size(&self) -> usize {
        self.bytes.len() + sequence_end::byte_size()
    }

    /// Without validation, write this instance to the byte stream, followed by a zero byte.
    pub fn write_null_terminated<W: Write>(&self, write: &mut W) -> UnitResult {
        Self::write_null_terminated_bytes(self.as_slice(), write)
    }

    /// Without validation, write these bytes to the byte stream, followed by a zero byte.
    pub fn write_null_terminated_bytes<W: Write>(bytes: &[u8], write: &mut W) -> UnitResult {
        debug_assert!(!bytes.contains(&0), "text contains zero bytes bug");

        u8::write_slice(write, bytes)?;
        sequence_end::write(write)?;
        Ok(())
    }

    /// Read a string until the null-terminator is found. Then skips the null-terminator.
    pub fn read_null_terminated<R: Read>(read: &mut R, max_len: usize) -> Result<Self> {
        let mut bytes = SmallVec::new();

        loop {
            match u8::read(read)? {
                0 => break,
                non_terminator => bytes.push(non_terminator),
            }

            if bytes.len() > max_len {
                return Err(Error::invalid("text too long"))
            }
        }

        Ok(Text { bytes })
    }

    /// Check whether this string is valid, considering the maximum text length.
    pub fn validate(&self, null_terminated: bool) -> UnitResult {
        if null_terminated && self.bytes.is_empty() {
            return Err(Error::invalid("text must not be empty"));
        }

        if self.bytes.contains(&0) {
            return Err(Error::invalid("text must not contain null bytes"));
        }

        if self.bytes.len() >= 256 {
            return Err(Error::invalid("text must not be longer than 255"));
        }

        Ok(())
    }
}

impl<'s> From<&'s str> for Text {
    fn from(string: &'s str) -> Self {
        Text::from_bytes(string.as_bytes())
    }
}

impl std::fmt::Display for Text {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use std::fmt::Write;

        for &byte in self.bytes.iter() {
            formatter.write_char(byte as char)?;
        }

        Ok(())
    }
}

impl std::fmt::Debug for Text {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "\"{}\"", self)
    }
}


/// The type of samples in a channel.
#[derive(Clone, Debug, Eq, PartialEq, Copy, Hash)]
pub enum SampleType {

    /// This channel contains 32-bit unsigned int values.
    U32,

    /// This channel contains 16-bit float values.
    F16,

    /// This channel contains 32-bit float values.
    F32,
}

impl SampleType {

    /// How many bytes a single sample takes up.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleType::F16 => half::f16::BYTE_SIZE,
            SampleType::F32 => f32::BYTE_SIZE,
            SampleType::U32 => u32::BYTE_SIZE,
        }
    }

    /// Number of bytes this would consume in a file.
    pub fn byte_size() -> usize {
        i32::BYTE_SIZE
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(self, write: &mut W) -> UnitResult {
        match self {
            SampleType::U32 => 0_i32,
            SampleType::F16 => 1_i32,
            SampleType::F32 => 2_i32,
        }.write(write)?;

        Ok(())
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        Ok(match i32::read(read)? {
            0 => SampleType::U32,
            1 => SampleType::F16,
            2 => SampleType::F32,
            _ => return Err(Error::invalid("pixel type attribute value")),
        })
    }
}


/// A single channel in a layer.
/// Does not contain the actual pixel data,
/// but instead merely describes it.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ChannelDescription {

    /// One of "R", "G", "B", "A", "Z" or "ZBack" most of the time.
    pub name: Text,

    /// U32, F16 or F32.
    pub sample_type: SampleType,

    /// This attribute only tells lossy compression methods
    /// whether this value should be quantized exponentially or linearly.
    ///
    /// Should be `false` for red, green, or blue channels.
    /// Should be `true` for hue, chroma, saturation, or alpha channels.
    pub quantize_linearly: bool,

    /// How many of the samples are skipped compared to the other channels in this layer.
    /// Deep images require x and y sampling rates of 1 for all channels.
    pub sampling: Vec2<usize>,
}

impl ChannelDescription {

    /// Choose whether to compress samples linearly or not, based on the channel name.
    pub fn guess_quantization_linearity(name: &Text) -> bool {
        !(
            name.as_slice() == b"R" || name.as_slice() == b"G" ||
                name.as_slice() == b"B" || name.as_slice() == b"Z" ||
                name.as_slice() == b"ZBack"
        )
    }

    /// Create a new channel with the specified properties and a sampling rate of (1,1).
    /// Automatically chooses the linearity for compression based on the channel name.
    pub fn named(name: impl Into<Text>, sample_type: SampleType) -> Self {
        let name = name.into();
        let quantize_linearly = Self::guess_quantization_linearity(&name);
        ChannelDescription { name, sample_type, quantize_linearly, sampling: Vec2(1, 1) }
    }

    /// Number of bytes this would consume in a file.
    pub fn byte_size(&self) -> usize {
        self.name.null_terminated_byte_size()
            + SampleType::byte_size()
            + 1 // is_linear
            + 3 // reserved bytes
            + 2 * i32::BYTE_SIZE // sampling x, y
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        self.name.write_null_terminated(write)?;
        self.sample_type.write(write)?;

        match self.quantize_linearly {
            false => 0_u8,
            true => 1_u8,
        }.write(write)?;

        i8::write_slice(write, &[0_i8, 0_i8, 0_i8])?;
        usize_to_i32(self.sampling.x(), "x channel sampling")?.write(write)?;
        usize_to_i32(self.sampling.y(), "y channel sampling")?.write(write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        let name = Text::read_null_terminated(read, 256)?;
        let sample_type = SampleType::read(read)?;

        let is_linear = match u8::read(read)? {
            1 => true,
            0 => false,
            _ => return Err(Error::invalid("channel linearity attribute value")),
        };

        let mut reserved = [0_i8; 3];
        i8::read_slice(read, &mut reserved)?;

        let x_sampling = i32_to_usize(i32::read(read)?, "x channel sampling")?;
        let y_sampling = i32_to_usize(i32::read(read)?, "y channel sampling")?;

        Ok(ChannelDescription {
            name, sample_type,
            quantize_linearly: is_linear,
            sampling: Vec2(x_sampling, y_sampling),
        })
    }

    /// Validate this instance. Deep images do not allow subsampled channels.
    pub fn validate(&self) -> UnitResult {
        self.name.validate(true)?;

        if self.sampling != Vec2(1, 1) {
            return Err(Error::unsupported("deep data with subsampled channels"));
        }

        Ok(())
    }
}


/// A list of channels. Channels are sorted alphabetically by name.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ChannelList {

    /// The channels in this list, sorted by name.
    pub list: SmallVec<[ChannelDescription; 6]>,

    /// The number of bytes that one sample of all channels together needs.
    pub bytes_per_sample: usize,
}

impl ChannelList {

    /// Sorts the channels alphabetically, as the file format requires.
    pub fn new(mut channels: SmallVec<[ChannelDescription; 6]>) -> Self {
        channels.sort_by(|a, b| a.name.as_slice().cmp(b.name.as_slice()));

        ChannelList {
            bytes_per_sample: channels.iter().map(|channel| channel.sample_type.bytes_per_sample()).sum(),
            list: channels,
        }
    }

    /// Return the index of the channel with the exact name, case sensitive, or none.
    pub fn find_index_of_channel(&self, exact_name: &[u8]) -> Option<usize> {
        self.list.iter().position(|channel| channel.name.as_slice() == exact_name)
    }

    /// Number of bytes this would consume in a file.
    pub fn byte_size(&self) -> usize {
        self.list.iter().map(ChannelDescription::byte_size).sum::<usize>() + sequence_end::byte_size()
    }

    /// Without validation, write this instance to the byte stream.
    /// Assumes channels are sorted alphabetically and all values are validated.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        for channel in &self.list {
            channel.write(write)?;
        }

        sequence_end::write(write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read(read: &mut PeekRead<impl Read>) -> Result<Self> {
        let mut channels = SmallVec::new();
        while !sequence_end::has_come(read)? {
            channels.push(ChannelDescription::read(read)?);
        }

        Ok(ChannelList::new(channels))
    }

    /// Check if channels are valid and sorted.
    pub fn validate(&self) -> UnitResult {
        let mut iterator = self.list.iter().map(|channel| channel.validate().map(|_| &channel.name));
        let mut previous = iterator.next().ok_or_else(|| Error::invalid("at least one channel is required"))??;

        for result in iterator {
            let name = result?;
            if previous == name { return Err(Error::invalid("channel names are not unique")); }
            else if previous > name { return Err(Error::invalid("channel names are not sorted alphabetically")); }
            else { previous = name; }
        }

        Ok(())
    }
}


/// In what order the chunks of this header occur in the file.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum LineOrder {

    /// The chunks are ordered top to bottom.
    Increasing,

    /// The chunks are ordered bottom to top.
    Decreasing,

    /// The chunks can occur in any order.
    Unspecified,
}

impl LineOrder {

    /// Number of bytes this would consume in a file.
    pub fn byte_size() -> usize {
        u8::BYTE_SIZE
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(self, write: &mut W) -> UnitResult {
        use self::LineOrder::*;
        match self {
            Increasing => 0_u8,
            Decreasing => 1_u8,
            Unspecified => 2_u8,
        }.write(write)?;

        Ok(())
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        use self::LineOrder::*;
        Ok(match u8::read(read)? {
            0 => Increasing,
            1 => Decreasing,
            2 => Unspecified,
            _ => return Err(Error::invalid("line order attribute value")),
        })
    }
}


/// A rectangular section anywhere in 2D integer space.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, Hash)]
pub struct IntegerBounds {

    /// The top left corner of this rectangle.
    /// This rectangle includes this pixel if the size is not zero.
    pub position: Vec2<i32>,

    /// How many pixels to include in this rectangle.
    /// Extends to the right and downwards.
    /// Does not include the actual boundary, just like `Vec::len()`.
    pub size: Vec2<usize>,
}

impl IntegerBounds {

    /// Create a box with a size starting at zero.
    pub fn from_dimensions(size: impl Into<Vec2<usize>>) -> Self {
        Self::new(Vec2(0, 0), size)
    }

    /// Create a box with a size and an origin point.
    pub fn new(start: impl Into<Vec2<i32>>, size: impl Into<Vec2<usize>>) -> Self {
        IntegerBounds { position: start.into(), size: size.into() }
    }

    /// Returns the maximum coordinate that a value in this rectangle may have.
    pub fn max(self) -> Vec2<i32> {
        self.position + self.size.to_i32() - Vec2(1, 1)
    }

    /// Validate this instance.
    pub fn validate(&self) -> UnitResult {
        let max_box_size = (i32::MAX / 2) as i64; // as defined in the original library

        let min = Vec2(self.position.x() as i64, self.position.y() as i64);
        let max = Vec2(
            self.position.x() as i64 + self.size.width() as i64,
            self.position.y() as i64 + self.size.height() as i64,
        );

        if max.x() >= max_box_size || max.y() >= max_box_size
            || min.x() <= -max_box_size || min.y() <= -max_box_size
        {
            return Err(Error::invalid("window size exceeding integer maximum"));
        }

        Ok(())
    }

    /// Number of bytes this would consume in a file.
    pub fn byte_size() -> usize {
        4 * i32::BYTE_SIZE
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        let Vec2(x_min, y_min) = self.position;
        let Vec2(x_max, y_max) = self.max();

        x_min.write(write)?;
        y_min.write(write)?;
        x_max.write(write)?;
        y_max.write(write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        let x_min = i32::read(read)?;
        let y_min = i32::read(read)?;
        let x_max = i32::read(read)?;
        let y_max = i32::read(read)?;

        let min = Vec2(x_min.min(x_max), y_min.min(y_max));
        let max = Vec2(x_min.max(x_max), y_min.max(y_max));

        // add one to max because the max is inclusive, but the size is not
        let size = Vec2(max.x() as i64 + 1 - min.x() as i64, max.y() as i64 + 1 - min.y() as i64);
        if size.x() < 0 || size.y() < 0 || size.x() > u32::MAX as i64 || size.y() > u32::MAX as i64 {
            return Err(Error::invalid("box coordinates"));
        }

        let bounds = IntegerBounds {
            position: min,
            size: Vec2(size.x() as usize, size.y() as usize),
        };

        bounds.validate()?;
        Ok(bounds)
    }
}


/// A float matrix with four rows and four columns.
pub type Matrix4x4 = [f32; 4 * 4];


/// The text values of the `type` attribute. Only deep scan lines are supported.
pub mod block_type_strings {

    /// Type attribute text value of deep scan lines.
    pub const DEEP_SCAN_LINE: &[u8] = b"deepscanline";

    /// Type attribute text value of flat scan lines.
    pub const SCAN_LINE: &[u8] = b"scanlineimage";

    /// Type attribute text value of flat tiles.
    pub const TILE: &[u8] = b"tiledimage";

    /// Type attribute text value of deep tiles.
    pub const DEEP_TILE: &[u8] = b"deeptile";
}


/// The name string literals of the attribute types this crate models.
pub mod type_names {
    macro_rules! define_attribute_type_names {
        ( $($name: ident : $value: expr),* ) => {
            $(
                /// The byte string name of this attribute type as it appears in a file.
                pub const $name: &'static [u8] = $value;
            )*
        };
    }

    define_attribute_type_names! {
        I32BOX2:        b"box2i",
        I32:            b"int",
        F32:            b"float",
        F32VEC2:        b"v2f",
        F32MATRIX4X4:   b"m44f",
        CHANNEL_LIST:   b"chlist",
        COMPRESSION:    b"compression",
        LINE_ORDER:     b"lineOrder",
        TEXT:           b"string"
    }
}

/// The name string literals of the attributes this crate models.
pub mod attribute_names {
    macro_rules! define_required_attribute_names {
        ( $($name: ident : $value: expr),* ) => {
            $(
                /// The byte string name of this attribute as it appears in a file.
                pub const $name: &'static [u8] = $value;
            )*
        };
    }

    define_required_attribute_names! {
        BLOCK_TYPE:     b"type",
        CHANNELS:       b"channels",
        COMPRESSION:    b"compression",
        DATA_WINDOW:    b"dataWindow",
        DISPLAY_WINDOW: b"displayWindow",
        LINE_ORDER:     b"lineOrder",
        PIXEL_ASPECT:   b"pixelAspectRatio",
        WINDOW_CENTER:  b"screenWindowCenter",
        WINDOW_WIDTH:   b"screenWindowWidth",
        DEEP_DATA_VERSION: b"version",
        CHUNKS:         b"chunkCount",
        MAX_SAMPLES:    b"maxSamplesPerPixel",
        WORLD_TO_CAMERA: b"worldToCamera",
        WORLD_TO_NDC:   b"worldToNDC"
    }
}


/// Contains one of all possible attribute values this crate models.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {

    /// Channel meta data.
    ChannelList(ChannelList),

    /// Compression method of this layer.
    Compression(Compression),

    /// Order of the chunks in the file.
    LineOrder(LineOrder),

    /// A 4x4 matrix of floats.
    Matrix4x4(Matrix4x4),

    /// A string of byte-chars.
    Text(Text),

    /// 32-bit float.
    F32(f32),

    /// 32-bit signed integer.
    I32(i32),

    /// 2D integer rectangle.
    IntegerBounds(IntegerBounds),

    /// 2D float vector.
    FloatVec2(Vec2<f32>),
}

impl AttributeValue {

    /// Number of bytes this would consume in a file.
    pub fn byte_size(&self) -> usize {
        use self::AttributeValue::*;

        match self {
            IntegerBounds(_) => self::IntegerBounds::byte_size(),
            I32(_) => i32::BYTE_SIZE,
            F32(_) => f32::BYTE_SIZE,
            FloatVec2(_) => 2 * f32::BYTE_SIZE,
            ChannelList(channels) => channels.byte_size(),
            Compression(_) => self::Compression::byte_size(),
            LineOrder(_) => self::LineOrder::byte_size(),
            Matrix4x4(matrix) => matrix.len() * f32::BYTE_SIZE,
            Text(text) => text.len(),
        }
    }

    /// The file format name string of the type of this attribute.
    pub fn kind_name(&self) -> &[u8] {
        use self::AttributeValue::*;
        use self::type_names as ty;

        match self {
            IntegerBounds(_) => ty::I32BOX2,
            I32(_) => ty::I32,
            F32(_) => ty::F32,
            FloatVec2(_) => ty::F32VEC2,
            ChannelList(_) => ty::CHANNEL_LIST,
            Compression(_) => ty::COMPRESSION,
            LineOrder(_) => ty::LINE_ORDER,
            Matrix4x4(_) => ty::F32MATRIX4X4,
            Text(_) => ty::TEXT,
        }
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        use self::AttributeValue::*;
        match self {
            IntegerBounds(value) => value.write(write)?,
            I32(value) => value.write(write)?,
            F32(value) => value.write(write)?,
            FloatVec2(Vec2(x, y)) => { x.write(write)?; y.write(write)?; },
            ChannelList(channels) => channels.write(write)?,
            Compression(value) => value.write(write)?,
            LineOrder(value) => value.write(write)?,
            Matrix4x4(matrix) => f32::write_slice(write, matrix)?,

            // attribute value texts are not null-terminated,
            // as their length is already stored as the attribute size
            Text(value) => u8::write_slice(write, value.as_slice())?,
        };

        Ok(())
    }

    /// Read an attribute value of the specified kind and size.
    /// Unknown attribute kinds return `None` after consuming the bytes.
    pub fn read(read: &mut PeekRead<impl Read>, kind: Text, byte_size: usize) -> Result<Option<Self>> {
        use self::AttributeValue::*;
        use self::type_names as ty;

        // read the raw bytes first, so unknown and damaged attributes can be skipped
        let attribute_bytes = u8::read_vec(read, byte_size, 128, Some(1024 * 1024), "attribute value size")?;
        let reader = &mut attribute_bytes.as_slice();

        Ok(Some(match kind.as_slice() {
            ty::I32BOX2 => IntegerBounds(self::IntegerBounds::read(reader)?),
            ty::I32 => I32(i32::read(reader)?),
            ty::F32 => F32(f32::read(reader)?),

            ty::F32VEC2 => FloatVec2({
                let x = f32::read(reader)?;
                let y = f32::read(reader)?;
                Vec2(x, y)
            }),

            ty::CHANNEL_LIST => ChannelList(self::ChannelList::read(&mut PeekRead::new(reader))?),
            ty::COMPRESSION => Compression(self::Compression::read(reader)?),
            ty::LINE_ORDER => LineOrder(self::LineOrder::read(reader)?),

            ty::F32MATRIX4X4 => Matrix4x4({
                let mut matrix = [0.0_f32; 16];
                f32::read_slice(reader, &mut matrix)?;
                matrix
            }),

            ty::TEXT => Text(self::Text::from_bytes(attribute_bytes.as_slice())),

            // unknown attribute type: bytes already consumed, skip it
            _ => return Ok(None),
        }))
    }
}


/// Write an attribute, consisting of the name, the type name, the size, and the value.
pub fn write<W: Write>(name: &[u8], value: &AttributeValue, write: &mut W) -> UnitResult {
    write_preamble(name, value.kind_name(), value.byte_size(), write)?;
    value.write(write)
}

/// Write only the name, the type name, and the size of an attribute,
/// so the value can be written separately.
pub fn write_preamble<W: Write>(name: &[u8], kind_name: &[u8], byte_size: usize, write: &mut W) -> UnitResult {
    Text::write_null_terminated_bytes(name, write)?;
    Text::write_null_terminated_bytes(kind_name, write)?;
    usize_to_i32(byte_size, "attribute byte size")?.write(write)?;
    Ok(())
}

/// Read an attribute, consisting of the name, the type name, the size, and the value.
/// The value is `None` for attribute types this crate does not model.
pub fn read(read: &mut PeekRead<impl Read>, max_size: usize) -> Result<(Text, Option<AttributeValue>)> {
    let name = Text::read_null_terminated(read, max_size)?;
    let kind = Text::read_null_terminated(read, max_size)?;
    let size = i32_to_usize(i32::read(read)?, "attribute size")?;
    let value = AttributeValue::read(read, kind, size)?;
    Ok((name, value))
}
