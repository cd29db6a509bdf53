
//! Streaming writer for deep scanline files.
//!
//! Rows are accepted one scanline at a time and serialized immediately.
//! The chunk offset table and the `maxSamplesPerPixel` attribute can only be
//! known after the last row, so placeholders are written first and patched
//! when the writer is finished.

use crate::chunk::CompressedDeepScanLineBlock;
use crate::convert::row::DeepOutputRow;
use crate::convert::Parameters;
use crate::error::{usize_to_i32, Error, Result, UnitResult};
use crate::io::{Data, Tracking, Write};
use crate::math::Vec2;
use crate::meta::attribute::{ChannelDescription, ChannelList, Matrix4x4, SampleType};
use crate::meta::{magic_number, Header, Requirements};
use half::f16;
use smallvec::smallvec;
use std::io::Seek;


/// Writes a single-layer deep scanline file, one row at a time.
///
/// Every row of the image must be written exactly once, top to bottom,
/// and [`DeepScanlineWriter::finish`] must be called afterwards —
/// otherwise the file is left with a `maxSamplesPerPixel` of `-1`
/// and an incomplete offset table.
#[derive(Debug)]
pub struct DeepScanlineWriter<W: Write + Seek> {
    write: Tracking<W>,
    header: Header,
    color_sample_type: SampleType,
    has_color: bool,
    has_back_depth: bool,

    offset_table_position: usize,
    max_samples_position: usize,
    offset_table: Vec<u64>,
    rows_written: usize,
    max_samples_per_pixel: u32,

    // per-row scratch, reused to avoid reallocation
    packed_table: Vec<u8>,
    packed_samples: Vec<u8>,
}

impl<W: Write + Seek> DeepScanlineWriter<W> {

    /// Start a deep scanline file: writes the magic number, the version
    /// flags, the header, and a placeholder chunk offset table.
    pub fn begin(
        destination: W,
        resolution: Vec2<usize>,
        has_color: bool,
        parameters: &Parameters,
        world_to_camera: Option<Matrix4x4>,
        world_to_normalized_device: Option<Matrix4x4>,
    ) -> Result<Self> {
        let color_sample_type =
            if parameters.full_precision { SampleType::F32 }
            else { SampleType::F16 };

        let has_back_depth = parameters.has_back_depth();

        let mut channels: smallvec::SmallVec<[ChannelDescription; 6]> = smallvec![
            ChannelDescription::named("A", color_sample_type),
            ChannelDescription::named("Z", SampleType::F32),
        ];

        if has_color {
            channels.push(ChannelDescription::named("R", color_sample_type));
            channels.push(ChannelDescription::named("G", color_sample_type));
            channels.push(ChannelDescription::named("B", color_sample_type));
        }

        if has_back_depth {
            channels.push(ChannelDescription::named("ZBack", SampleType::F32));
        }

        let mut header = Header::new(resolution, ChannelList::new(channels), parameters.compression);
        header.world_to_camera = world_to_camera;
        header.world_to_normalized_device = world_to_normalized_device;
        header.validate()?;

        let mut write = Tracking::new(destination);
        magic_number::write(&mut write)?;
        Requirements::for_deep_scan_lines().write(&mut write)?;
        let max_samples_position = header.write(&mut write)?;

        // reserve the offset table, to be patched in finish()
        let offset_table_position = write.byte_position();
        for _ in 0 .. header.chunk_count() {
            0_u64.write(&mut write)?;
        }

        Ok(DeepScanlineWriter {
            write,
            header,
            color_sample_type,
            has_color,
            has_back_depth,
            offset_table_position,
            max_samples_position,
            offset_table: Vec::new(),
            rows_written: 0,
            max_samples_per_pixel: 0,
            packed_table: Vec::new(),
            packed_samples: Vec::new(),
        })
    }

    /// The header this writer serializes.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Pack, compress and write the next scanline.
    pub fn write_row(&mut self, row: &DeepOutputRow) -> UnitResult {
        let width = self.header.data_size().width();

        if row.pixel_count() != width {
            return Err(Error::invalid("row pixel count not matching image width"));
        }

        if self.rows_written >= self.header.chunk_count() {
            return Err(Error::invalid("more rows than the image has scan lines"));
        }

        self.max_samples_per_pixel = self.max_samples_per_pixel.max(row.max_samples_per_pixel());

        // the file stores the cumulative sample count per pixel column
        self.packed_table.clear();
        for cumulative_count in row.cumulative_counts() {
            (cumulative_count as i32).write(&mut self.packed_table)?;
        }

        self.pack_samples(row)?;
        let decompressed_sample_data_size = self.packed_samples.len();

        let compression = self.header.compression;
        let compressed_pixel_offset_table = compression.compress_bytes(&self.packed_table)?;
        let compressed_sample_data = compression.compress_bytes(&self.packed_samples)?;

        let block = CompressedDeepScanLineBlock {
            y_coordinate: self.header.data_window.position.y() + usize_to_i32(self.rows_written, "row index")?,
            decompressed_sample_data_size,
            compressed_pixel_offset_table,
            compressed_sample_data,
        };

        self.offset_table.push(self.write.byte_position() as u64);
        block.write(&mut self.write)?;
        self.rows_written += 1;
        Ok(())
    }

    /// Serialize one row of samples, channel by channel in the alphabetical
    /// channel order of the file: `A`, (`B`, `G`, `R`,) `Z` (, `ZBack`).
    fn pack_samples(&mut self, row: &DeepOutputRow) -> UnitResult {
        self.packed_samples.clear();
        let samples = &mut self.packed_samples;

        write_color_channel(samples, &row.alpha, self.color_sample_type)?;

        if self.has_color {
            write_color_channel(samples, &row.blue, self.color_sample_type)?;
            write_color_channel(samples, &row.green, self.color_sample_type)?;
            write_color_channel(samples, &row.red, self.color_sample_type)?;
        }

        f32::write_slice(samples, &row.front)?;

        if self.has_back_depth {
            f32::write_slice(samples, &row.back)?;
        }

        Ok(())
    }

    /// Patch the offset table and the maximum sample count, then flush.
    pub fn finish(mut self) -> UnitResult {
        if self.rows_written != self.header.chunk_count() {
            return Err(Error::invalid("not all rows of the image were written"));
        }

        let file_end_position = self.write.byte_position();

        self.write.seek_write_to(self.offset_table_position)?;
        for &offset in &self.offset_table {
            offset.write(&mut self.write)?;
        }

        self.write.seek_write_to(self.max_samples_position)?;
        (self.max_samples_per_pixel as i32).write(&mut self.write)?;

        self.write.seek_write_to(file_end_position)?;
        self.write.flush()?;
        Ok(())
    }
}

fn write_color_channel(write: &mut impl Write, values: &[f32], sample_type: SampleType) -> UnitResult {
    match sample_type {
        SampleType::F32 => f32::write_slice(write, values),

        SampleType::F16 => {
            for &value in values {
                f16::from_f32(value).write(write)?;
            }
            Ok(())
        },

        SampleType::U32 => Err(Error::unsupported("32-bit integer deep channels")),
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::compression::Compression;
    use crate::convert::pixel::DeepOutputPixel;

    fn write_tiny_image(parameters: &Parameters) -> Vec<u8> {
        let mut buffer = std::io::Cursor::new(Vec::new());

        let mut writer = DeepScanlineWriter::begin(
            &mut buffer, Vec2(2, 1), false, parameters, None, None,
        ).unwrap();

        let mut pixel = DeepOutputPixel::new();
        pixel.clear_and_reserve(2);
        pixel.push_alpha(1.0, 0.5);
        pixel.push_alpha(2.0, 1.0);

        let mut row = DeepOutputRow::new();
        row.append_pixel(&pixel);
        row.append_hole();

        writer.write_row(&row).unwrap();
        writer.finish().unwrap();

        buffer.into_inner()
    }

    #[test]
    fn starts_with_magic_number(){
        let bytes = write_tiny_image(&Parameters::default());
        assert_eq!(&bytes[0..4], &magic_number::BYTES);
    }

    #[test]
    fn missing_rows_are_an_error(){
        let mut buffer = std::io::Cursor::new(Vec::new());

        let writer = DeepScanlineWriter::begin(
            &mut buffer, Vec2(2, 2), false, &Parameters::default(), None, None,
        ).unwrap();

        assert!(matches!(writer.finish(), Err(Error::Invalid(_))));
    }

    #[test]
    fn row_width_is_validated(){
        let mut buffer = std::io::Cursor::new(Vec::new());

        let mut writer = DeepScanlineWriter::begin(
            &mut buffer, Vec2(3, 1), false, &Parameters::default(), None, None,
        ).unwrap();

        let mut row = DeepOutputRow::new();
        row.append_hole(); // only one pixel, but the image is three wide

        assert!(writer.write_row(&row).is_err());
    }

    #[test]
    fn compression_choice_changes_the_file(){
        let compressed = write_tiny_image(&Parameters::default());
        let uncompressed = write_tiny_image(&Parameters {
            compression: Compression::Uncompressed,
            .. Parameters::default()
        });

        // both contain the same two samples, but declare different codecs
        assert_ne!(compressed, uncompressed);
        assert_eq!(compressed.len(), uncompressed.len());
    }
}
