
//! Contains the compression attribute definition
//! and methods to compress and decompress deep data.

use crate::error::{Error, Result, UnitResult};
use crate::io::{Data, Read, Write};

/// A byte vector.
pub type ByteVec = Vec<u8>;

/// A byte slice.
pub type Bytes<'s> = &'s [u8];


/// Specifies which compression method to use.
/// Only the methods that the file format allows for deep data are supported.
/// Use uncompressed data for fastest loading and writing speeds.
/// Use RLE compression for fast loading and writing with slight memory savings.
/// Use ZIP compression for slow processing with large memory savings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {

    /// Store uncompressed values.
    /// Produces large files that can be read and written very quickly.
    Uncompressed,

    /// Produces slightly smaller files
    /// that can still be read and written rather quickly.
    /// Works best for data with large flat areas, such as masks.
    /// This compression method is lossless.
    RLE,

    /// Uses ZIP compression to compress each scan line individually.
    /// Slowly produces small files which can be read with moderate speed.
    /// This compression method is lossless.
    ZIP,
}

impl Compression {

    /// Number of bytes this would consume in a file.
    pub fn byte_size() -> usize {
        u8::BYTE_SIZE
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write(self, write: &mut impl Write) -> UnitResult {
        use self::Compression::*;
        match self {
            Uncompressed => 0_u8,
            RLE => 1_u8,
            ZIP => 2_u8, // the file format calls this "ZIPS"
        }.write(write)
    }

    /// Read the value, returning an error for compression methods
    /// that the file format does not allow for deep data.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        use self::Compression::*;
        match u8::read(read)? {
            0 => Ok(Uncompressed),
            1 => Ok(RLE),
            2 => Ok(ZIP),
            3 | 4 | 5 | 6 | 7 | 8 | 9 => Err(Error::unsupported("compression method not allowed for deep data")),
            _ => Err(Error::invalid("compression method attribute value")),
        }
    }

    /// Compress the specified packed little-endian bytes.
    ///
    /// If the compressed data would not be smaller than the packed data,
    /// the packed data is stored unchanged, as the file format dictates.
    pub fn compress_bytes(self, packed: Bytes<'_>) -> Result<ByteVec> {
        let compressed = match self {
            Compression::Uncompressed => return Ok(packed.to_vec()),
            Compression::ZIP => zip::compress_bytes(packed)?,
            Compression::RLE => rle::compress_bytes(packed)?,
        };

        if compressed.len() < packed.len() { Ok(compressed) }
        else { Ok(packed.to_vec()) }
    }

    /// Decompress the specified bytes into exactly `expected_byte_size` packed bytes.
    ///
    /// Data whose length already equals the expected size
    /// is treated as uncompressed, as the file format dictates.
    pub fn decompress_bytes(self, compressed: ByteVec, expected_byte_size: usize) -> Result<ByteVec> {
        if compressed.len() == expected_byte_size || self == Compression::Uncompressed {
            if compressed.len() != expected_byte_size {
                return Err(Error::invalid("uncompressed data size"));
            }

            return Ok(compressed);
        }

        let decompressed = match self {
            Compression::ZIP => zip::decompress_bytes(&compressed, expected_byte_size)?,
            Compression::RLE => rle::decompress_bytes(&compressed, expected_byte_size)?,
            Compression::Uncompressed => unreachable!("handled above"),
        };

        if decompressed.len() != expected_byte_size {
            return Err(Error::invalid("decompressed data size"));
        }

        Ok(decompressed)
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{} compression", match self {
            Compression::Uncompressed => "no",
            Compression::RLE => "rle",
            Compression::ZIP => "zip line",
        })
    }
}


mod optimize_bytes {

    /// Integrate over all differences to the previous value
    /// in order to reconstruct sample values.
    pub fn differences_to_samples(buffer: &mut [u8]) {
        for index in 1..buffer.len() {
            buffer[index] = (buffer[index - 1] as i32 + buffer[index] as i32 - 128) as u8;
        }
    }

    /// Derive over all values in order to produce differences to the previous value.
    pub fn samples_to_differences(buffer: &mut [u8]) {
        for index in (1..buffer.len()).rev() {
            buffer[index] = (buffer[index] as i32 - buffer[index - 1] as i32 + 128) as u8;
        }
    }

    /// Interleave the bytes such that the second half of the array is every other byte.
    pub fn interleave_byte_blocks(separated: &mut [u8]) {
        let mut interleaved = Vec::with_capacity(separated.len());
        let (first_half, second_half) = separated.split_at((separated.len() + 1) / 2);
        let mut second_half_iterator = second_half.iter();

        for first in first_half {
            interleaved.push(*first);
            if let Some(second) = second_half_iterator.next() {
                interleaved.push(*second);
            }
        }

        separated.copy_from_slice(&interleaved)
    }

    /// Separate the bytes such that the second half contains every other byte.
    pub fn separate_bytes_fragments(source: &mut [u8]) {
        let mut first_half = Vec::with_capacity(source.len() / 2 + 1);
        let mut second_half = Vec::with_capacity(source.len() / 2);
        let mut source_iterator = source.iter();

        while let Some(first) = source_iterator.next() {
            first_half.push(*first);

            if let Some(second) = source_iterator.next() {
                second_half.push(*second);
            }
        }

        let mut result = first_half;
        result.append(&mut second_half);
        source.copy_from_slice(&result)
    }


    #[cfg(test)]
    mod test {

        #[test]
        fn roundtrip_interleave(){
            let source = vec![ 0, 1, 2, 3, 4, 5, 6, 7, 8 ];
            let mut modified = source.clone();

            super::separate_bytes_fragments(&mut modified);
            super::interleave_byte_blocks(&mut modified);

            assert_eq!(source, modified);
        }

        #[test]
        fn roundtrip_derive(){
            let source = vec![ 0, 23, 122, 3, 45, 45, 0, 1, 255, 0 ];
            let mut modified = source.clone();

            super::samples_to_differences(&mut modified);
            super::differences_to_samples(&mut modified);

            assert_eq!(source, modified);
        }
    }
}


mod zip {
    use super::optimize_bytes::*;
    use super::{Bytes, ByteVec};
    use crate::error::{Error, Result};

    pub fn decompress_bytes(data: Bytes<'_>, expected_byte_size: usize) -> Result<ByteVec> {
        let options = zune_inflate::DeflateOptions::default()
            .set_limit(expected_byte_size)
            .set_size_hint(expected_byte_size);

        let mut decompressed = zune_inflate::DeflateDecoder::new_with_options(data, options)
            .decode_zlib()
            .map_err(|_| Error::invalid("zlib-compressed data malformed"))?;

        differences_to_samples(&mut decompressed);
        interleave_byte_blocks(&mut decompressed);
        Ok(decompressed)
    }

    pub fn compress_bytes(packed: Bytes<'_>) -> Result<ByteVec> {
        let mut packed = Vec::from(packed);
        separate_bytes_fragments(&mut packed);
        samples_to_differences(&mut packed);

        Ok(miniz_oxide::deflate::compress_to_vec_zlib(packed.as_slice(), 4))
    }
}


mod rle {
    use super::optimize_bytes::*;
    use super::{Bytes, ByteVec};
    use crate::error::{Error, Result};

    const MIN_RUN_LENGTH: usize = 3;
    const MAX_RUN_LENGTH: usize = 127;

    pub fn decompress_bytes(mut remaining: Bytes<'_>, expected_byte_size: usize) -> Result<ByteVec> {
        let mut decompressed = Vec::with_capacity(expected_byte_size.min(8 * 2048));

        while !remaining.is_empty() {
            let count = take_1(&mut remaining)? as i8 as i32;

            if count < 0 {
                // take the next '-count' bytes as-is
                let values = take_n(&mut remaining, (-count) as usize)?;
                decompressed.extend_from_slice(values);
            }
            else {
                // repeat the next value 'count + 1' times
                let value = take_1(&mut remaining)?;
                decompressed.resize(decompressed.len() + count as usize + 1, value);
            }

            if decompressed.len() > expected_byte_size {
                return Err(Error::invalid("rle-compressed data length"));
            }
        }

        differences_to_samples(&mut decompressed);
        interleave_byte_blocks(&mut decompressed);
        Ok(decompressed)
    }

    pub fn compress_bytes(packed: Bytes<'_>) -> Result<ByteVec> {
        let mut data = Vec::from(packed);
        separate_bytes_fragments(&mut data);
        samples_to_differences(&mut data);

        let mut compressed = Vec::with_capacity(data.len());
        let mut run_start = 0;
        let mut run_end = 1;

        while run_start < data.len() {
            while
                run_end < data.len()
                    && data[run_start] == data[run_end]
                    && (run_end - run_start) as i32 - 1 < MAX_RUN_LENGTH as i32
            {
                run_end += 1;
            }

            if run_end - run_start >= MIN_RUN_LENGTH {
                compressed.push(((run_end - run_start) as i32 - 1) as u8);
                compressed.push(data[run_start]);
                run_start = run_end;
            }
            else {
                while
                    run_end < data.len() && (
                        (run_end + 1 >= data.len() || data[run_end] != data[run_end + 1])
                            || (run_end + 2 >= data.len() || data[run_end + 1] != data[run_end + 2])
                    ) && run_end - run_start < MAX_RUN_LENGTH
                {
                    run_end += 1;
                }

                compressed.push((run_start as i32 - run_end as i32) as u8);
                compressed.extend_from_slice(&data[run_start .. run_end]);

                run_start = run_end;
                run_end += 1;
            }
        }

        Ok(compressed)
    }

    fn take_1(slice: &mut &[u8]) -> Result<u8> {
        if !slice.is_empty() {
            let result = slice[0];
            *slice = &slice[1..];
            Ok(result)
        }
        else {
            Err(Error::invalid("compressed data"))
        }
    }

    fn take_n<'s>(slice: &mut &'s [u8], n: usize) -> Result<&'s [u8]> {
        if n <= slice.len() {
            let (front, back) = slice.split_at(n);
            *slice = back;
            Ok(front)
        }
        else {
            Err(Error::invalid("compressed data"))
        }
    }
}


#[cfg(test)]
mod test {
    use super::Compression;

    fn roundtrip(compression: Compression, data: Vec<u8>) {
        let compressed = compression.compress_bytes(&data).unwrap();
        let decompressed = compression.decompress_bytes(compressed, data.len()).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn roundtrip_zip(){
        roundtrip(Compression::ZIP, vec![ 0, 23, 4, 4, 4, 4, 4, 4, 4, 4, 4, 5, 0, 0, 0, 1, 23, 43, 4 ]);
    }

    #[test]
    fn roundtrip_rle(){
        roundtrip(Compression::RLE, vec![ 0, 23, 4, 4, 4, 4, 4, 4, 4, 4, 4, 5, 0, 0, 0, 1, 23, 43, 4 ]);
    }

    #[test]
    fn roundtrip_uncompressed(){
        roundtrip(Compression::Uncompressed, vec![ 9, 8, 7, 6, 5 ]);
    }

    #[test]
    fn roundtrip_empty(){
        roundtrip(Compression::ZIP, vec![]);
        roundtrip(Compression::RLE, vec![]);
    }

    #[test]
    fn rejects_flat_only_compression(){
        use crate::io::Data;

        // value 4 is the wavelet-based compression, which the format forbids for deep data
        let result = Compression::read(&mut [4_u8].as_slice());
        assert!(matches!(result, Err(crate::error::Error::NotSupported(_))));

        let mut bytes = Vec::new();
        Compression::ZIP.write(&mut bytes).unwrap();
        assert_eq!(u8::read(&mut bytes.as_slice()).unwrap(), 2);
    }
}
