
//! Merge algorithms for sources carrying color channels.
//!
//! Color is carried unpremultiplied through the merge so coincident
//! contributions can be summed, and premultiplied again on output.
//! Zero-alpha samples are pure emission ("glow") — their color is never
//! divided or multiplied by the zero alpha, neither when decoding nor
//! when emitting.

use crate::convert::density::{
    clamp_depth, clamp_unit, density_from_visibility, dz_from_visibility, next_float_up,
};
use crate::convert::pixel::DeepOutputPixel;
use crate::convert::span::ColorSpan;
use crate::convert::Parameters;
use crate::texture::RawPixel;


/// Decode the raw samples into sorted point spans carrying unpremultiplied color.
fn decode(raw: &RawPixel, parameters: &Parameters, spans: &mut Vec<ColorSpan>) {
    spans.clear();

    for index in 0 .. raw.sample_count() {
        let depth = clamp_depth(raw.depth(index));
        let values = raw.values(index);

        // three-channel sources have no alpha of their own,
        // so the mean of the three values stands in for it
        let alpha = clamp_unit(match values.len() {
            4 => values[3] as f64,
            _ => (values[0] as f64 + values[1] as f64 + values[2] as f64) / 3.0,
        });

        let mut color = [values[0] as f64, values[1] as f64, values[2] as f64];

        if !parameters.unpremultiplied_input && alpha > 0.0 {
            for component in color.iter_mut() {
                *component /= alpha;
            }
        }

        spans.push(ColorSpan::new(depth, 1.0 - alpha, color, index));
    }

    spans.sort_unstable_by(|a, b| a.span.depth_ordering(&b.span));
}

/// Merge groups of spans that share the identical front depth.
/// Each sample occludes independently, so visibilities multiply,
/// while the unpremultiplied color contributions sum.
fn merge_coincident(spans: &mut Vec<ColorSpan>) {
    let length = spans.len();
    let mut write = 0;
    let mut read = 0;

    while read < length {
        let mut merged = spans[read];

        let mut next = read + 1;
        while next < length && spans[next].span.front == merged.span.front {
            merged.span.visibility *= spans[next].span.visibility;

            for component in 0..3 {
                merged.color[component] += spans[next].color[component];
            }

            next += 1;
        }

        spans[write] = merged;
        write += 1;
        read = next;
    }

    spans.truncate(write);
}

/// Premultiply the color by the final alpha, unless the sample is pure glow.
fn premultiplied(color: [f64; 3], alpha: f64) -> [f32; 3] {
    if alpha > 0.0 {
        [
            (color[0] * alpha) as f32,
            (color[1] * alpha) as f32,
            (color[2] * alpha) as f32,
        ]
    }
    else {
        [color[0] as f32, color[1] as f32, color[2] as f32]
    }
}

/// Emit one point sample per surviving span.
pub fn discrete(raw: &RawPixel, parameters: &Parameters, spans: &mut Vec<ColorSpan>, output: &mut DeepOutputPixel) {
    decode(raw, parameters, spans);
    merge_coincident(spans);

    for span in spans.iter() {
        if parameters.discard_transparent && span.span.is_transparent() {
            continue;
        }

        let alpha = span.span.alpha();
        output.push_rgba(span.span.front, premultiplied(span.color, alpha), alpha as f32);
    }
}

/// Emit one interval sample per surviving span, chaining forward
/// exactly like the single-channel alpha algorithm.
pub fn continuous(raw: &RawPixel, parameters: &Parameters, spans: &mut Vec<ColorSpan>, output: &mut DeepOutputPixel) {
    decode(raw, parameters, spans);
    merge_coincident(spans);

    let mut max_density = 0.0_f64;
    for index in 1 .. spans.len() {
        let gap = (spans[index].span.front - spans[index - 1].span.front) as f64;
        max_density = max_density.max(density_from_visibility(spans[index - 1].span.visibility, gap));
    }

    // chain each back edge to the successor's front edge, so spans tile without gaps
    for index in 1 .. spans.len() {
        spans[index - 1].span.back = spans[index].span.front;
    }

    if let Some(last) = spans.last_mut() {
        let dz = dz_from_visibility(last.span.visibility, max_density);
        let back = clamp_depth(last.span.front + dz as f32);
        last.span.back = if back > last.span.front { back } else { next_float_up(last.span.front) };
    }

    for span in spans.iter() {
        if parameters.discard_transparent && span.span.is_transparent() {
            continue;
        }

        let alpha = span.span.alpha();
        output.push_rgba_span(
            span.span.front, span.span.back,
            premultiplied(span.color, alpha), alpha as f32,
        );
    }
}


#[cfg(test)]
mod test {
    use super::*;

    fn raw_pixel(samples: &[(f32, [f32; 4])]) -> RawPixel {
        let mut raw = RawPixel::new();
        raw.clear(4);
        for (depth, values) in samples {
            raw.push_sample(*depth, values);
        }
        raw
    }

    fn run(samples: &[(f32, [f32; 4])], continuous_mode: bool, parameters: &Parameters) -> DeepOutputPixel {
        let raw = raw_pixel(samples);
        let mut spans = Vec::new();
        let mut output = DeepOutputPixel::new();
        output.clear_and_reserve(raw.sample_count());

        if continuous_mode { continuous(&raw, parameters, &mut spans, &mut output); }
        else { discrete(&raw, parameters, &mut spans, &mut output); }

        output
    }

    #[test]
    fn unpremultiply_premultiply_roundtrip(){
        // premultiplied color at alpha 0.5 must come back unchanged
        // when no merge or extrapolation alters the alpha
        let output = run(&[(1.0, [0.25, 0.5, 0.75, 0.5])], false, &Parameters::default());

        assert_eq!(output.sample_count(), 1);
        assert!((output.red[0] - 0.25).abs() < 1e-6);
        assert!((output.green[0] - 0.5).abs() < 1e-6);
        assert!((output.blue[0] - 0.75).abs() < 1e-6);
        assert!((output.alpha[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn glow_sample_color_is_never_scaled(){
        let parameters = Parameters {
            discard_transparent: false,
            .. Parameters::default()
        };

        let output = run(&[(1.0, [0.1, 0.2, 0.3, 0.0])], false, &parameters);

        assert_eq!(output.sample_count(), 1);
        assert_eq!(output.alpha, vec![0.0]);
        assert!((output.red[0] - 0.1).abs() < 1e-6);
        assert!((output.green[0] - 0.2).abs() < 1e-6);
        assert!((output.blue[0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn coincident_samples_combine(){
        // two premultiplied half-transparent samples at the same depth:
        // visibilities multiply to 0.25, unpremultiplied colors sum
        let output = run(
            &[(2.0, [0.5, 0.0, 0.0, 0.5]), (2.0, [0.0, 0.5, 0.0, 0.5])],
            false,
            &Parameters::default(),
        );

        assert_eq!(output.sample_count(), 1);
        assert!((output.alpha[0] - 0.75).abs() < 1e-6);

        // each color was unpremultiplied to 1.0, summed, and re-premultiplied by 0.75
        assert!((output.red[0] - 0.75).abs() < 1e-6);
        assert!((output.green[0] - 0.75).abs() < 1e-6);
        assert_eq!(output.blue[0], 0.0);
    }

    #[test]
    fn unpremultiplied_input_is_not_divided(){
        let parameters = Parameters {
            unpremultiplied_input: true,
            .. Parameters::default()
        };

        let output = run(&[(1.0, [1.0, 0.5, 0.25, 0.5])], false, &parameters);

        // the unpremultiplied color is only multiplied by alpha on the way out
        assert!((output.red[0] - 0.5).abs() < 1e-6);
        assert!((output.green[0] - 0.25).abs() < 1e-6);
        assert!((output.blue[0] - 0.125).abs() < 1e-6);
    }

    #[test]
    fn continuous_emits_front_and_back(){
        let output = run(
            &[(1.0, [0.5, 0.5, 0.5, 0.5]), (3.0, [0.5, 0.5, 0.5, 0.5])],
            true,
            &Parameters::default(),
        );

        assert_eq!(output.sample_count(), 2);
        assert_eq!(output.back[0], output.front[1]);
        assert!(output.back[1] > output.front[1]);

        for index in 0..output.sample_count() {
            assert!(output.back[index] >= output.front[index]);
        }
    }

    #[test]
    fn three_channel_sources_use_the_mean_as_alpha(){
        let mut raw = RawPixel::new();
        raw.clear(3);
        raw.push_sample(1.0, &[0.3, 0.6, 0.9]);

        let parameters = Parameters { unpremultiplied_input: true, .. Parameters::default() };
        let mut spans = Vec::new();
        let mut output = DeepOutputPixel::new();
        output.clear_and_reserve(1);
        discrete(&raw, &parameters, &mut spans, &mut output);

        assert_eq!(output.sample_count(), 1);
        assert!((output.alpha[0] - 0.6).abs() < 1e-6);
    }
}
