
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Convert deep images between discrete and continuous sample representations.
//!
//! A deep image stores, per pixel, an ordered list of samples at different
//! depths. This crate merges, tidies and re-extrapolates those samples and
//! writes the result as a single-part deep scanline OpenEXR file:
//!
//! - **discrete** output treats every sample as a point at one exact depth,
//! - **continuous** output gives every sample a `[front, back]` depth interval
//!   over which a piecewise-exponential visibility function applies.
//!
//! The heart of the crate is the [`convert`] module, which implements the six
//! merge algorithms ({deep opacity, alpha, rgba} × {discrete, continuous}).
//! Deep pixel data enters through the [`texture::DeepSource`] trait, either
//! loaded from a file by [`read`] or constructed in memory, and leaves through
//! the streaming [`write::DeepScanlineWriter`].

pub mod error;
pub mod math;
pub mod io;
pub mod meta;
pub mod compression;
pub mod chunk;
pub mod texture;
pub mod read;
pub mod write;
pub mod convert;


/// Commonly used types and functions, all in one module.
pub mod prelude {

    // main entry points
    pub use crate::convert::{convert, convert_file, Parameters, Representation, Interpretation};
    pub use crate::texture::{DeepTexture, DeepSource};
    pub use crate::write::DeepScanlineWriter;

    // secondary data types
    pub use crate::error::{Error, Result, UnitResult};
    pub use crate::math::Vec2;
    pub use crate::meta::attribute::{ChannelDescription, ChannelList, SampleType};
    pub use crate::compression::Compression;

    // re-export external stuff
    pub use half::f16;
}
