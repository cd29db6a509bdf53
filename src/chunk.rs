
//! Read and write already compressed deep scanline data blocks.
//! Does not include the process of compression and decompression.

use crate::error::{u64_to_usize, Error, Result, UnitResult};
use crate::io::{Data, Read, Write};
use crate::meta::Header;


/// This block consists of one deep scan line.
/// Corresponds to type attribute `deepscanline`.
/// The byte data is in little-endian format,
/// as these bytes will be written into the file directly.
#[derive(Debug, Clone)]
pub struct CompressedDeepScanLineBlock {

    /// The block's y coordinate is the pixel space y coordinate of the scan line in the block.
    /// The top scan line block in the image is aligned with the top edge of the data window.
    pub y_coordinate: i32,

    /// Size of the sample data when decompressed, in bytes.
    pub decompressed_sample_data_size: usize,

    /// The pixel offset table is a list of integers, one for each pixel column within the data window.
    /// Each entry in the table indicates the total number of samples required
    /// to store the pixel in it as well as all pixels to the left of it.
    /// This data is compressed and in little-endian format.
    pub compressed_pixel_offset_table: Vec<u8>,

    /// The samples of the scan line.
    /// For each channel, for each pixel, the pixel's samples are contiguous.
    /// This data is compressed and in little-endian format.
    pub compressed_sample_data: Vec<u8>,
}


impl CompressedDeepScanLineBlock {

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        self.y_coordinate.write(write)?;
        (self.compressed_pixel_offset_table.len() as u64).write(write)?;
        (self.compressed_sample_data.len() as u64).write(write)?;
        (self.decompressed_sample_data_size as u64).write(write)?;
        u8::write_slice(write, &self.compressed_pixel_offset_table)?;
        u8::write_slice(write, &self.compressed_sample_data)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read(read: &mut impl Read, header: &Header) -> Result<Self> {
        let max_block_byte_size = header.max_block_byte_size();

        let y_coordinate = i32::read(read)?;
        let compressed_pixel_offset_table_size = u64_to_usize(u64::read(read)?, "deep table size")?;
        let compressed_sample_data_size = u64_to_usize(u64::read(read)?, "deep size")?;
        let decompressed_sample_data_size = u64_to_usize(u64::read(read)?, "raw deep size")?;

        if decompressed_sample_data_size > max_block_byte_size {
            return Err(Error::invalid("deep scan line block too large"));
        }

        let compressed_pixel_offset_table = u8::read_vec(
            read, compressed_pixel_offset_table_size,
            6 * u16::MAX as usize, Some(max_block_byte_size),
            "deep scan line block table size"
        )?;

        let compressed_sample_data = u8::read_vec(
            read, compressed_sample_data_size,
            6 * u16::MAX as usize, Some(max_block_byte_size),
            "deep scan line block sample count"
        )?;

        Ok(CompressedDeepScanLineBlock {
            y_coordinate,
            decompressed_sample_data_size,
            compressed_pixel_offset_table,
            compressed_sample_data,
        })
    }
}

impl Header {

    /// Maximum byte size of a decompressed block of this header.
    /// Deep scanline pixels have a variable sample count,
    /// so this is a generous sanity limit, not an exact size.
    pub fn max_block_byte_size(&self) -> usize {
        let max_samples_per_line = self.data_size().width()
            .saturating_mul(u16::MAX as usize);

        max_samples_per_line.saturating_mul(self.channels.bytes_per_sample)
            .min(1024 * 1024 * 1024) // 1 GB sanity limit per scanline
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::compression::Compression;
    use crate::math::Vec2;
    use crate::meta::attribute::{ChannelDescription, ChannelList, SampleType};
    use smallvec::smallvec;

    #[test]
    fn roundtrip(){
        let header = Header::new(
            Vec2(4, 4),
            ChannelList::new(smallvec![
                ChannelDescription::named("A", SampleType::F32),
                ChannelDescription::named("Z", SampleType::F32),
            ]),
            Compression::Uncompressed,
        );

        let block = CompressedDeepScanLineBlock {
            y_coordinate: -3,
            decompressed_sample_data_size: 40,
            compressed_pixel_offset_table: vec![1, 0, 0, 0, 2, 0, 0, 0],
            compressed_sample_data: vec![0; 40],
        };

        let mut bytes = Vec::new();
        block.write(&mut bytes).unwrap();

        let decoded = CompressedDeepScanLineBlock::read(&mut bytes.as_slice(), &header).unwrap();
        assert_eq!(decoded.y_coordinate, -3);
        assert_eq!(decoded.decompressed_sample_data_size, 40);
        assert_eq!(decoded.compressed_pixel_offset_table, block.compressed_pixel_offset_table);
        assert_eq!(decoded.compressed_sample_data, block.compressed_sample_data);
    }
}
