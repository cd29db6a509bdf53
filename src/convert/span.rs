
//! Span records: one merged or un-merged depth interval candidate per raw sample.

use std::cmp::Ordering;


/// One depth interval candidate of a deep pixel.
///
/// Before merging, `back` equals `front` and the span is a point sample.
/// Continuous interpretation gives the span an extent afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span {

    /// Entry depth of this span.
    pub front: f32,

    /// Exit depth of this span. Equal to `front` before merging.
    pub back: f32,

    /// Transmittance of this span, in `[0, 1]`. One means fully transparent.
    pub visibility: f64,

    /// Index of the raw sample this span came from,
    /// used as a tie-break for a stable ordering.
    pub index: usize,
}

impl Span {

    /// Create a point span at the specified depth.
    pub fn new(depth: f32, visibility: f64, index: usize) -> Self {
        Span { front: depth, back: depth, visibility, index }
    }

    /// The opacity of this span.
    pub fn alpha(&self) -> f64 {
        1.0 - self.visibility
    }

    /// Whether this span lets all light pass.
    pub fn is_transparent(&self) -> bool {
        self.visibility >= 1.0
    }

    /// Order spans ascending by front depth, ties broken by the original sample index.
    pub fn depth_ordering(&self, other: &Self) -> Ordering {
        self.front.total_cmp(&other.front)
            .then_with(|| self.index.cmp(&other.index))
    }
}


/// A span carrying unpremultiplied color, for four-channel pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorSpan {

    /// The depth interval and visibility.
    pub span: Span,

    /// Unpremultiplied red, green and blue.
    /// For zero-alpha glow samples, these are the raw sample values.
    pub color: [f64; 3],
}

impl ColorSpan {

    /// Create a point span at the specified depth.
    pub fn new(depth: f32, visibility: f64, color: [f64; 3], index: usize) -> Self {
        ColorSpan { span: Span::new(depth, visibility, index), color }
    }
}


/// A span for deep opacity pixels, where each raw sample encodes
/// the visibility accumulated from the near side of the pixel
/// up to and including the sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpacitySpan {

    /// The depth interval. Its `visibility` is derived from the
    /// accumulated values only after merging.
    pub span: Span,

    /// The running product of visibility from the pixel's near side
    /// up to and including this span. Non-increasing with depth.
    pub accumulated_visibility: f64,
}

impl OpacitySpan {

    /// Create a point span at the specified depth.
    pub fn new(depth: f32, accumulated_visibility: f64, index: usize) -> Self {
        OpacitySpan {
            // per-span visibility is derived later, from the accumulated chain
            span: Span::new(depth, 1.0, index),
            accumulated_visibility,
        }
    }
}
