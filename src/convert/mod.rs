
//! The conversion engine: merge deep samples per pixel and
//! re-emit them in the requested representation.
//!
//! Six algorithms exist, one for every combination of input representation
//! ({deep opacity, alpha, rgba}) and output interpretation
//! ({discrete, continuous}). All six share the same skeleton:
//!
//! 1. decode the raw samples into spans, clamping every degenerate value,
//! 2. sort the spans by depth, ties broken by the original sample index,
//! 3. merge spans with coincident depths,
//! 4. extrapolate missing extents (continuous interpretation only), and
//! 5. emit the surviving samples, dropping fully transparent ones
//!    unless the keep policy is active.

pub mod density;
pub mod span;
pub mod pixel;
pub mod row;
pub mod opacity;
pub mod alpha;
pub mod rgba;

use crate::compression::Compression;
use crate::error::{Error, Result, UnitResult};
use crate::math::Vec2;
use crate::texture::{DeepSource, RawPixel};
use crate::write::DeepScanlineWriter;
use std::io::{Seek, Write};

use self::pixel::DeepOutputPixel;
use self::row::DeepOutputRow;
use self::span::{ColorSpan, OpacitySpan, Span};


/// How the single data channel of a source is interpreted.
/// Sources with color channels always carry a plain alpha channel.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Representation {

    /// Each raw sample stores the visibility accumulated from the near side
    /// of the pixel up to and including the sample, non-increasing with depth.
    DeepOpacity,

    /// Each raw sample stores an ordinary, independent alpha value.
    Alpha,
}

/// Whether output samples are points or depth intervals.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Interpretation {

    /// Each output sample is an instantaneous point at one exact depth.
    Discrete,

    /// Each output sample covers a depth interval, with intervals
    /// tiling the depth axis without gaps.
    Continuous,
}


/// Configuration of one conversion run. Set once, read-only thereafter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {

    /// How the single data channel of the source is interpreted.
    pub representation: Representation,

    /// Whether output samples are points or depth intervals.
    pub interpretation: Interpretation,

    /// Whether the source color is already unpremultiplied.
    /// Premultiplied input color is divided by alpha while decoding.
    pub unpremultiplied_input: bool,

    /// Whether fully transparent output samples are dropped. Defaults to true.
    pub discard_transparent: bool,

    /// Whether to emit a back-depth channel even for discrete output.
    pub keep_back_depth: bool,

    /// Whether to transpose the image while fetching from the source.
    pub sideways: bool,

    /// Error tolerance of the lossy pre-merge simplification.
    /// Zero disables simplification.
    pub tolerance: f32,

    /// Whether color and alpha are written as 32-bit floats
    /// instead of 16-bit floats. Depth channels are always 32-bit.
    pub full_precision: bool,

    /// How the output sample data is compressed.
    pub compression: Compression,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            representation: Representation::DeepOpacity,
            interpretation: Interpretation::Discrete,
            unpremultiplied_input: false,
            discard_transparent: true,
            keep_back_depth: false,
            sideways: false,
            tolerance: 0.0,
            full_precision: false,
            compression: Compression::ZIP,
        }
    }
}

impl Parameters {

    /// Whether the output declares a back-depth channel.
    pub fn has_back_depth(&self) -> bool {
        self.keep_back_depth || self.interpretation == Interpretation::Continuous
    }
}


/// One of the six merge algorithms, selected once per conversion run
/// from the parameters and the source channel count.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Mode {

    /// Single channel of accumulated visibility, discrete output.
    OpacityDiscrete,

    /// Single channel of accumulated visibility, continuous output.
    OpacityContinuous,

    /// Single channel of independent alpha, discrete output.
    AlphaDiscrete,

    /// Single channel of independent alpha, continuous output.
    AlphaContinuous,

    /// Color and alpha channels, discrete output.
    RgbaDiscrete,

    /// Color and alpha channels, continuous output.
    RgbaContinuous,
}

impl Mode {

    /// Select the algorithm for the specified source.
    /// Sources with color channels always use the rgba algorithms,
    /// as the representation parameter only distinguishes the two
    /// possible meanings of a single data channel.
    pub fn select(parameters: &Parameters, channel_count: usize) -> Result<Mode> {
        use self::Interpretation::*;
        use self::Representation::*;

        match (channel_count, parameters.representation, parameters.interpretation) {
            (1, DeepOpacity, Discrete) => Ok(Mode::OpacityDiscrete),
            (1, DeepOpacity, Continuous) => Ok(Mode::OpacityContinuous),
            (1, Alpha, Discrete) => Ok(Mode::AlphaDiscrete),
            (1, Alpha, Continuous) => Ok(Mode::AlphaContinuous),
            (3, _, Discrete) | (4, _, Discrete) => Ok(Mode::RgbaDiscrete),
            (3, _, Continuous) | (4, _, Continuous) => Ok(Mode::RgbaContinuous),

            (channels, _, _) => Err(Error::unsupported(format!(
                "deep image with {} channels (must be 1, 3 or 4)", channels
            ))),
        }
    }

    /// Whether this algorithm emits color channels.
    pub fn has_color(self) -> bool {
        matches!(self, Mode::RgbaDiscrete | Mode::RgbaContinuous)
    }

    /// Turn the raw samples of one pixel into finished output samples.
    ///
    /// The scratch buffers and the output pixel are cleared before use,
    /// so they can be reused across pixels without reallocation.
    pub fn process_pixel(
        self,
        raw: &RawPixel,
        parameters: &Parameters,
        scratch: &mut MergeScratch,
        output: &mut DeepOutputPixel,
    ) {
        output.clear_and_reserve(raw.sample_count());

        match self {
            Mode::OpacityDiscrete => opacity::discrete(raw, parameters, &mut scratch.opacity_spans, output),
            Mode::OpacityContinuous => opacity::continuous(raw, parameters, &mut scratch.opacity_spans, output),
            Mode::AlphaDiscrete => alpha::discrete(raw, parameters, &mut scratch.spans, output),
            Mode::AlphaContinuous => alpha::continuous(raw, parameters, &mut scratch.spans, output),
            Mode::RgbaDiscrete => rgba::discrete(raw, parameters, &mut scratch.color_spans, output),
            Mode::RgbaContinuous => rgba::continuous(raw, parameters, &mut scratch.color_spans, output),
        }
    }
}


/// Reusable span buffers, owned by the row driver and passed
/// into the merge algorithms by mutable reference.
#[derive(Debug, Clone, Default)]
pub struct MergeScratch {

    /// Scratch for the single-channel alpha algorithms.
    pub spans: Vec<Span>,

    /// Scratch for the rgba algorithms.
    pub color_spans: Vec<ColorSpan>,

    /// Scratch for the deep opacity algorithms.
    pub opacity_spans: Vec<OpacitySpan>,
}


/// Convert all pixels of the source and write them
/// as a deep scanline file into the destination.
pub fn convert(
    source: &impl DeepSource,
    parameters: &Parameters,
    destination: impl Write + Seek,
) -> UnitResult {
    let mode = Mode::select(parameters, source.channel_count())?;

    let source_size = source.resolution();
    let output_size = if parameters.sideways { source_size.transposed() } else { source_size };

    let mut writer = DeepScanlineWriter::begin(
        destination, output_size, mode.has_color(), parameters,
        source.world_to_camera(), source.world_to_normalized_device(),
    )?;

    // all per-pixel buffers are owned here and reused for every pixel
    let mut raw = RawPixel::new();
    let mut scratch = MergeScratch::default();
    let mut output_pixel = DeepOutputPixel::new();
    let mut output_row = DeepOutputRow::new();

    for y in 0 .. output_size.height() {
        output_row.clear();

        for x in 0 .. output_size.width() {
            let position = if parameters.sideways { Vec2(y, x) } else { Vec2(x, y) };
            source.read_pixel(position, &mut raw)?;

            if raw.sample_count() > 1 && parameters.tolerance > 0.0 {
                raw.simplify(parameters.tolerance);
            }

            if raw.sample_count() < 1 {
                output_row.append_hole();
                continue;
            }

            mode.process_pixel(&raw, parameters, &mut scratch, &mut output_pixel);
            output_row.append_pixel(&output_pixel);
        }

        writer.write_row(&output_row)?;
    }

    writer.finish()
}


/// Convert the deep scanline file at the input path and write the result
/// to the output path. A partially written output file is deleted on error.
pub fn convert_file(
    input_path: impl AsRef<std::path::Path>,
    output_path: impl AsRef<std::path::Path>,
    parameters: &Parameters,
) -> UnitResult {
    let texture = crate::texture::DeepTexture::read_from_file(input_path)?;

    crate::io::attempt_delete_file_on_write_error(output_path.as_ref(), |write| {
        convert(&texture, parameters, write)
    })
}
