
//! Command line interface of the deep image converter.

use clap::{Parser, ValueEnum};
use deeptidy::prelude::*;
use std::path::PathBuf;

/// Convert a deep scanline image between discrete and continuous sample representations.
///
/// Merges coincident depth samples, enforces monotonic accumulated visibility,
/// and re-extrapolates missing sample extents for continuous output.
#[derive(Debug, Parser)]
#[command(name = "deeptidy", version)]
struct Arguments {

    /// Path of the deep scanline file to read.
    input: PathBuf,

    /// Path of the deep scanline file to write.
    output: PathBuf,

    /// Treat the single input channel as plain per-sample alpha
    /// instead of accumulated deep opacity.
    #[arg(long)]
    alpha: bool,

    /// Emit continuous samples with front and back depths
    /// instead of discrete point samples.
    #[arg(long)]
    continuous: bool,

    /// Write color and alpha as 32-bit floats instead of 16-bit floats.
    #[arg(long)]
    full_precision: bool,

    /// The input color channels are already unpremultiplied.
    #[arg(long)]
    unpremultiplied: bool,

    /// Transpose the image while fetching from the source.
    #[arg(long)]
    sideways: bool,

    /// Error tolerance of the lossy pre-merge simplification. Zero disables it.
    #[arg(long, default_value_t = 0.0)]
    tolerance: f32,

    /// Keep fully transparent samples instead of dropping them.
    #[arg(long)]
    keep_zero_alpha: bool,

    /// Emit a back depth channel even for discrete samples.
    #[arg(long)]
    zback: bool,

    /// How the output sample data is compressed.
    #[arg(long, value_enum, default_value = "zip")]
    compression: CompressionArgument,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompressionArgument {
    None,
    Rle,
    Zip,
}

impl From<CompressionArgument> for Compression {
    fn from(argument: CompressionArgument) -> Self {
        match argument {
            CompressionArgument::None => Compression::Uncompressed,
            CompressionArgument::Rle => Compression::RLE,
            CompressionArgument::Zip => Compression::ZIP,
        }
    }
}

fn main() {
    let arguments = Arguments::parse();

    if let Err(error) = run(&arguments) {
        eprintln!("deeptidy: {}", error);
        std::process::exit(1);
    }
}

fn run(arguments: &Arguments) -> UnitResult {
    if arguments.input.as_os_str().is_empty() {
        return Err(Error::invalid("empty input file name"));
    }

    let parameters = Parameters {
        representation:
            if arguments.alpha { Representation::Alpha }
            else { Representation::DeepOpacity },

        interpretation:
            if arguments.continuous { Interpretation::Continuous }
            else { Interpretation::Discrete },

        unpremultiplied_input: arguments.unpremultiplied,
        discard_transparent: !arguments.keep_zero_alpha,
        keep_back_depth: arguments.zback,
        sideways: arguments.sideways,
        tolerance: arguments.tolerance,
        full_precision: arguments.full_precision,
        compression: arguments.compression.into(),
    };

    convert_file(&arguments.input, &arguments.output, &parameters)?;

    println!("wrote {}", arguments.output.display());
    Ok(())
}
