
//! In-memory storage for deep textures with variable sample counts per pixel.
//!
//! Deep images store multiple samples per pixel at different depths. This type
//! efficiently stores the samples in flat arrays with a separate array tracking
//! how many samples each pixel has.

use crate::error::{Error, Result, UnitResult};
use crate::math::Vec2;
use crate::meta::attribute::Matrix4x4;


/// Anything that can hand the conversion engine one deep pixel at a time.
///
/// The row driver owns a single [`RawPixel`] scratch buffer and passes it
/// to [`DeepSource::read_pixel`] for every pixel, so implementations
/// should fill the buffer instead of allocating.
pub trait DeepSource {

    /// Image dimensions (width, height).
    fn resolution(&self) -> Vec2<usize>;

    /// Number of data channels per sample, not counting the depth.
    /// The conversion engine supports exactly 1, 3 or 4.
    fn channel_count(&self) -> usize;

    /// The matrix that transforms 3D points from the world to the camera
    /// coordinate space, to be carried into the output file unchanged.
    fn world_to_camera(&self) -> Option<Matrix4x4> { None }

    /// The matrix that transforms 3D points from the world to the
    /// "Normalized Device Coordinate" space, carried into the output unchanged.
    fn world_to_normalized_device(&self) -> Option<Matrix4x4> { None }

    /// Copy the ordered samples of the pixel at the specified position
    /// into the provided scratch buffer, replacing its previous contents.
    fn read_pixel(&self, position: Vec2<usize>, pixel: &mut RawPixel) -> UnitResult;
}


/// A reusable buffer holding the raw samples of a single deep pixel.
///
/// Samples are ordered as the source delivers them, which is not necessarily
/// sorted by depth. The per-sample channel values are stored interleaved.
#[derive(Debug, Clone, Default)]
pub struct RawPixel {
    channel_count: usize,
    depths: Vec<f32>,
    values: Vec<f32>,
}

impl RawPixel {

    /// Create an empty pixel buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard all samples and prepare the buffer
    /// for samples with the specified channel count.
    pub fn clear(&mut self, channel_count: usize) {
        self.channel_count = channel_count;
        self.depths.clear();
        self.values.clear();
    }

    /// Number of data channels per sample, not counting the depth.
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Number of samples currently in this buffer.
    pub fn sample_count(&self) -> usize {
        self.depths.len()
    }

    /// Append one sample. The number of values must equal the channel count.
    pub fn push_sample(&mut self, depth: f32, values: &[f32]) {
        debug_assert_eq!(values.len(), self.channel_count, "sample channel count bug");
        self.depths.push(depth);
        self.values.extend_from_slice(values);
    }

    /// The depth of the sample with the specified index.
    pub fn depth(&self, sample_index: usize) -> f32 {
        self.depths[sample_index]
    }

    /// The channel values of the sample with the specified index.
    pub fn values(&self, sample_index: usize) -> &[f32] {
        let start = sample_index * self.channel_count;
        &self.values[start .. start + self.channel_count]
    }

    /// Lossy pre-merge compression within an error tolerance.
    ///
    /// Collapses each run of adjacent samples whose channel values all lie
    /// within `tolerance` of the run's first sample, keeping that first
    /// sample. A tolerance of zero keeps every sample.
    pub fn simplify(&mut self, tolerance: f32) {
        if tolerance <= 0.0 || self.sample_count() < 2 {
            return;
        }

        let channel_count = self.channel_count;
        let mut kept = 0; // index of the current run's first sample
        let mut write = 1; // number of samples kept so far

        for index in 1..self.sample_count() {
            let in_run = (0..channel_count).all(|channel| {
                let head = self.values[kept * channel_count + channel];
                let value = self.values[index * channel_count + channel];
                (value - head).abs() <= tolerance
            });

            if !in_run {
                self.depths[write] = self.depths[index];
                for channel in 0..channel_count {
                    self.values[write * channel_count + channel] =
                        self.values[index * channel_count + channel];
                }

                kept = write;
                write += 1;
            }
        }

        self.depths.truncate(write);
        self.values.truncate(write * channel_count);
    }
}


/// Storage for a deep texture with variable sample counts per pixel.
///
/// # Memory Layout
///
/// The samples are stored in flat arrays, with pixel sample arrays concatenated
/// together in row-major pixel order. The `sample_counts` array stores how many
/// samples each pixel has, and the cached cumulative offsets allow O(1) access
/// to any pixel's sample range:
///
/// ```text
/// Pixel (0,0): 3 samples  -> indices 0..3
/// Pixel (1,0): 0 samples  -> (empty)
/// Pixel (2,0): 5 samples  -> indices 3..8
/// ...
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DeepTexture {

    /// Image dimensions (width, height) for indexing.
    resolution: Vec2<usize>,

    /// Number of data channels per sample, not counting the depth.
    channel_count: usize,

    /// Number of samples for each pixel (row-major: width × height).
    sample_counts: Vec<u32>,

    /// Cached cumulative offsets for O(1) pixel access.
    /// `cumulative_offsets[pixel_index]` is the sum of all sample counts before that pixel.
    /// Length is `sample_counts.len() + 1`, with the last element being the total sample count.
    cumulative_offsets: Vec<usize>,

    /// The depth of every sample, concatenated in pixel order.
    depths: Vec<f32>,

    /// One buffer per data channel, each holding one value per sample,
    /// concatenated in pixel order. Four-channel textures store R, G, B, A;
    /// three-channel textures store R, G, B; single-channel textures store
    /// the opacity or alpha values.
    channels: Vec<Vec<f32>>,

    /// Carried from the source file into the output unchanged.
    world_to_camera: Option<Matrix4x4>,

    /// Carried from the source file into the output unchanged.
    world_to_normalized_device: Option<Matrix4x4>,
}

impl DeepTexture {

    /// Creates a deep texture from per-pixel sample counts and flat sample data.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel count is not 1, 3 or 4,
    /// if `sample_counts` does not have one entry per pixel, or if any
    /// sample buffer length does not match the sum of all sample counts.
    pub fn from_samples(
        resolution: Vec2<usize>,
        sample_counts: Vec<u32>,
        depths: Vec<f32>,
        channels: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if channels.len() != 1 && channels.len() != 3 && channels.len() != 4 {
            return Err(Error::unsupported(format!(
                "deep texture with {} channels (must be 1, 3 or 4)", channels.len()
            )));
        }

        let pixel_count = resolution.area();
        if sample_counts.len() != pixel_count {
            return Err(Error::invalid(format!(
                "sample count table length {} not matching resolution {}×{}",
                sample_counts.len(), resolution.width(), resolution.height()
            )));
        }

        // build cumulative offsets for O(1) access
        let mut cumulative_offsets = Vec::with_capacity(pixel_count + 1);
        cumulative_offsets.push(0_usize);

        let mut offset = 0_usize;
        for &count in &sample_counts {
            offset += count as usize;
            cumulative_offsets.push(offset);
        }

        if depths.len() != offset || channels.iter().any(|channel| channel.len() != offset) {
            return Err(Error::invalid("sample buffer length not matching sum of sample counts"));
        }

        Ok(DeepTexture {
            resolution,
            channel_count: channels.len(),
            sample_counts,
            cumulative_offsets,
            depths,
            channels,
            world_to_camera: None,
            world_to_normalized_device: None,
        })
    }

    /// Attach the transform matrices that should be carried into the output file.
    pub fn with_transforms(
        self,
        world_to_camera: Option<Matrix4x4>,
        world_to_normalized_device: Option<Matrix4x4>,
    ) -> Self {
        DeepTexture { world_to_camera, world_to_normalized_device, .. self }
    }

    /// Returns the image resolution (width, height).
    pub fn resolution(&self) -> Vec2<usize> {
        self.resolution
    }

    /// Returns the total number of pixels in the image.
    pub fn pixel_count(&self) -> usize {
        self.sample_counts.len()
    }

    /// Returns the total number of samples across all pixels.
    pub fn total_sample_count(&self) -> usize {
        *self.cumulative_offsets.last().unwrap_or(&0)
    }

    /// Returns the number of samples for the pixel at (x, y).
    pub fn sample_count(&self, position: Vec2<usize>) -> u32 {
        self.sample_counts[self.pixel_index(position)]
    }

    /// Returns the range of sample indices for the pixel at (x, y).
    /// The returned range can be used to index into the flat sample buffers.
    pub fn sample_range(&self, position: Vec2<usize>) -> std::ops::Range<usize> {
        let pixel_index = self.pixel_index(position);
        self.cumulative_offsets[pixel_index] .. self.cumulative_offsets[pixel_index + 1]
    }

    /// Converts pixel coordinates to a flat pixel index.
    ///
    /// # Panics
    ///
    /// Panics if the pixel coordinates are out of bounds.
    fn pixel_index(&self, position: Vec2<usize>) -> usize {
        assert!(
            position.x() < self.resolution.width() && position.y() < self.resolution.height(),
            "pixel position {:?} out of bounds for resolution {:?}", position, self.resolution
        );

        position.y() * self.resolution.width() + position.x()
    }
}

impl DeepSource for DeepTexture {

    fn resolution(&self) -> Vec2<usize> {
        self.resolution
    }

    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn world_to_camera(&self) -> Option<Matrix4x4> {
        self.world_to_camera
    }

    fn world_to_normalized_device(&self) -> Option<Matrix4x4> {
        self.world_to_normalized_device
    }

    fn read_pixel(&self, position: Vec2<usize>, pixel: &mut RawPixel) -> UnitResult {
        pixel.clear(self.channel_count);

        let mut values = [0.0_f32; 4];
        for sample_index in self.sample_range(position) {
            for (channel_index, channel) in self.channels.iter().enumerate() {
                values[channel_index] = channel[sample_index];
            }

            pixel.push_sample(self.depths[sample_index], &values[.. self.channel_count]);
        }

        Ok(())
    }
}
