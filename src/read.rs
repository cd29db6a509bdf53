
//! Load a deep scanline file fully into an in-memory [`DeepTexture`].

use crate::chunk::CompressedDeepScanLineBlock;
use crate::error::{Error, Result};
use crate::io::{skip_bytes, Data, PeekRead, Read};
use crate::math::Vec2;
use crate::meta::attribute::{ChannelList, SampleType};
use crate::meta::MetaData;
use crate::texture::DeepTexture;
use half::f16;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;


/// What a channel of the file contributes to the in-memory texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelRole {

    /// The `Z` channel, becoming the per-sample depth.
    Depth,

    /// The specified data channel of the texture.
    Data(usize),

    /// A channel without a counterpart in the texture, for example `ZBack`.
    /// The conversion re-derives all extents, so an input back depth is dropped.
    Ignored,
}

/// The mapping from the alphabetically ordered file channels
/// to the channels of the in-memory texture.
#[derive(Debug)]
struct ChannelLayout {

    /// One role per file channel, in file channel order.
    roles: Vec<(ChannelRole, SampleType)>,

    /// Number of data channels of the texture: 1, 3 or 4.
    data_channel_count: usize,
}

impl ChannelLayout {

    /// Match the file channels against the layouts the conversion supports.
    fn of(channels: &ChannelList) -> Result<Self> {
        let mut roles = Vec::with_capacity(channels.list.len());
        let mut data_names = Vec::new();
        let mut has_depth = false;

        for channel in &channels.list {
            if channel.sample_type == SampleType::U32 {
                return Err(Error::unsupported("32-bit integer deep channels"));
            }

            let role = match channel.name.as_slice() {
                b"Z" => { has_depth = true; ChannelRole::Depth },
                b"ZBack" => ChannelRole::Ignored,
                name => {
                    data_names.push(name.to_vec());
                    ChannelRole::Data(usize::MAX) // resolved below, once all names are known
                },
            };

            roles.push((role, channel.sample_type));
        }

        if !has_depth {
            return Err(Error::invalid("deep image without a Z channel"));
        }

        // single data channels keep their one buffer regardless of name,
        // color layouts require the conventional names
        let expected_names: &[&[u8]] = match data_names.len() {
            1 => &[&[]], // any name
            3 => &[b"B", b"G", b"R"],
            4 => &[b"A", b"B", b"G", b"R"],
            count => return Err(Error::unsupported(format!(
                "deep image with {} channels (must be 1, 3 or 4)", count
            ))),
        };

        let data_channel_count = data_names.len();
        let mut next_data_channel = 0;

        for (role, _) in roles.iter_mut() {
            if let ChannelRole::Data(texture_channel) = role {
                let name = &data_names[next_data_channel];

                // the texture stores single-channel data at 0, and colors as R, G, B, A
                *texture_channel = match data_channel_count {
                    1 => 0,
                    _ => match name.as_slice() {
                        b"R" => 0,
                        b"G" => 1,
                        b"B" => 2,
                        b"A" => 3,
                        _ => return Err(Error::unsupported("deep color image with unconventional channel names")),
                    },
                };

                if data_channel_count > 1 && name.as_slice() != expected_names[next_data_channel] {
                    return Err(Error::unsupported("deep color image with unconventional channel names"));
                }

                next_data_channel += 1;
            }
        }

        Ok(ChannelLayout { roles, data_channel_count })
    }
}


/// The parsed samples of one scanline.
#[derive(Debug, Clone, Default)]
struct RowSamples {
    counts: Vec<u32>,
    depths: Vec<f32>,
    channels: Vec<Vec<f32>>,
}

impl DeepTexture {

    /// Load a single-layer deep scanline file fully into memory.
    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::read_from_buffered(BufReader::new(File::open(path)?))
    }

    /// Load a single-layer deep scanline file fully into memory
    /// from the specified buffered byte source.
    pub fn read_from_buffered(read: impl Read) -> Result<Self> {
        let mut read = PeekRead::new(read);

        let meta = MetaData::read_validated(&mut read)?;
        let header = &meta.header;
        let layout = ChannelLayout::of(&header.channels)?;

        let size = header.data_size();
        let Vec2(width, height) = size;

        // the offset table is not needed, as all chunks are read anyway
        skip_bytes(&mut read, (header.chunk_count() * u64::BYTE_SIZE) as u64)?;

        let mut rows: Vec<Option<RowSamples>> = vec![None; height];

        for _ in 0 .. header.chunk_count() {
            let block = CompressedDeepScanLineBlock::read(&mut read, header)?;

            let row_index = block.y_coordinate as i64 - header.data_window.position.y() as i64;
            if row_index < 0 || row_index >= height as i64 {
                return Err(Error::invalid("deep scan line block y coordinate"));
            }

            let row_index = row_index as usize;
            if rows[row_index].is_some() {
                return Err(Error::invalid("duplicate deep scan line block"));
            }

            rows[row_index] = Some(read_row(&block, header, &layout, width)?);
        }

        // concatenate all rows in image order
        let mut counts = Vec::with_capacity(width * height);
        let mut depths = Vec::new();
        let mut channels = vec![Vec::new(); layout.data_channel_count];

        for row in rows {
            let row = row.ok_or_else(|| Error::invalid("missing deep scan line block"))?;

            counts.extend_from_slice(&row.counts);
            depths.extend_from_slice(&row.depths);
            for (channel, row_channel) in channels.iter_mut().zip(&row.channels) {
                channel.extend_from_slice(row_channel);
            }
        }

        Ok(
            DeepTexture::from_samples(size, counts, depths, channels)?
                .with_transforms(header.world_to_camera, header.world_to_normalized_device)
        )
    }
}

/// Decompress and parse the sample count table and the sample data of one scanline.
fn read_row(
    block: &CompressedDeepScanLineBlock,
    header: &crate::meta::Header,
    layout: &ChannelLayout,
    width: usize,
) -> Result<RowSamples> {
    let compression = header.compression;

    // the table stores the cumulative sample count per pixel column
    let table_bytes = compression.decompress_bytes(
        block.compressed_pixel_offset_table.clone(),
        width * i32::BYTE_SIZE,
    )?;

    let mut counts = Vec::with_capacity(width);
    let mut previous_cumulative = 0_i64;

    let table_reader = &mut table_bytes.as_slice();
    for _ in 0 .. width {
        let cumulative = i32::read(table_reader)? as i64;

        // a decreasing table would mean a pixel with a negative sample count
        if cumulative < previous_cumulative {
            return Err(Error::invalid("negative sample count in deep scan line"));
        }

        counts.push((cumulative - previous_cumulative) as u32);
        previous_cumulative = cumulative;
    }

    let row_sample_count = previous_cumulative as usize;
    let expected_byte_size = row_sample_count * header.channels.bytes_per_sample;

    let data_bytes = compression.decompress_bytes(
        block.compressed_sample_data.clone(),
        expected_byte_size,
    )?;

    if expected_byte_size != block.decompressed_sample_data_size {
        return Err(Error::invalid("deep scan line sample data size"));
    }

    // the data stores, for each channel in file order, all samples of the line
    let mut row = RowSamples {
        counts,
        depths: Vec::with_capacity(row_sample_count),
        channels: vec![Vec::with_capacity(row_sample_count); layout.data_channel_count],
    };

    let data_reader = &mut data_bytes.as_slice();
    for &(role, sample_type) in &layout.roles {
        match role {
            ChannelRole::Ignored => {
                skip_bytes(data_reader, (row_sample_count * sample_type.bytes_per_sample()) as u64)?;
            },

            ChannelRole::Depth => {
                read_channel_into(data_reader, sample_type, row_sample_count, &mut row.depths)?;
            },

            ChannelRole::Data(texture_channel) => {
                read_channel_into(data_reader, sample_type, row_sample_count, &mut row.channels[texture_channel])?;
            },
        }
    }

    Ok(row)
}

/// Read one channel's samples of a scanline, widening f16 on the fly.
fn read_channel_into(
    read: &mut impl Read,
    sample_type: SampleType,
    sample_count: usize,
    target: &mut Vec<f32>,
) -> Result<()> {
    match sample_type {
        SampleType::F32 => {
            f32::read_into_vec(read, target, sample_count, 1024 * 1024, None, "deep sample data")?;
        },

        SampleType::F16 => {
            for _ in 0 .. sample_count {
                target.push(f16::read(read)?.to_f32());
            }
        },

        SampleType::U32 => return Err(Error::unsupported("32-bit integer deep channels")),
    }

    Ok(())
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::attribute::ChannelDescription;

    fn channel_list(names: &[&str]) -> ChannelList {
        ChannelList::new(
            names.iter()
                .map(|name| ChannelDescription::named(*name, SampleType::F32))
                .collect::<smallvec::SmallVec<[ChannelDescription; 6]>>()
        )
    }

    #[test]
    fn rgba_layout_maps_alphabetical_channels(){
        let layout = ChannelLayout::of(&channel_list(&["R", "G", "B", "A", "Z", "ZBack"])).unwrap();

        assert_eq!(layout.data_channel_count, 4);

        // file order is A, B, G, R, Z, ZBack
        assert_eq!(layout.roles[0].0, ChannelRole::Data(3));
        assert_eq!(layout.roles[1].0, ChannelRole::Data(2));
        assert_eq!(layout.roles[2].0, ChannelRole::Data(1));
        assert_eq!(layout.roles[3].0, ChannelRole::Data(0));
        assert_eq!(layout.roles[4].0, ChannelRole::Depth);
        assert_eq!(layout.roles[5].0, ChannelRole::Ignored);
    }

    #[test]
    fn single_channel_layout_accepts_any_name(){
        let layout = ChannelLayout::of(&channel_list(&["A", "Z"])).unwrap();
        assert_eq!(layout.data_channel_count, 1);
        assert_eq!(layout.roles[0].0, ChannelRole::Data(0));

        let layout = ChannelLayout::of(&channel_list(&["opacity", "Z"])).unwrap();
        assert_eq!(layout.data_channel_count, 1);
    }

    #[test]
    fn unsupported_channel_counts_are_fatal(){
        // two data channels
        let result = ChannelLayout::of(&channel_list(&["A", "Y", "Z"]));
        assert!(matches!(result, Err(Error::NotSupported(_))));

        // five data channels
        let result = ChannelLayout::of(&channel_list(&["R", "G", "B", "A", "Q", "Z"]));
        assert!(matches!(result, Err(Error::NotSupported(_))));
    }

    #[test]
    fn missing_depth_channel_is_fatal(){
        let result = ChannelLayout::of(&channel_list(&["R", "G", "B", "A"]));
        assert!(result.is_err());
    }
}
