
//! Merge algorithms for single-channel sources
//! whose samples store ordinary, independent alpha values.

use crate::convert::density::{
    clamp_depth, clamp_unit, density_from_visibility, dz_from_visibility, next_float_up,
};
use crate::convert::pixel::DeepOutputPixel;
use crate::convert::span::Span;
use crate::convert::Parameters;
use crate::texture::RawPixel;


/// Decode the raw samples into sorted point spans.
fn decode(raw: &RawPixel, spans: &mut Vec<Span>) {
    spans.clear();

    for index in 0 .. raw.sample_count() {
        let depth = clamp_depth(raw.depth(index));
        let alpha = clamp_unit(raw.values(index)[0] as f64);
        spans.push(Span::new(depth, 1.0 - alpha, index));
    }

    spans.sort_unstable_by(|a, b| a.depth_ordering(b));
}

/// Merge groups of spans that share the identical front depth.
/// Each sample occludes independently, so visibilities multiply.
fn merge_coincident(spans: &mut Vec<Span>) {
    let length = spans.len();
    let mut write = 0;
    let mut read = 0;

    while read < length {
        let mut merged = spans[read];

        let mut next = read + 1;
        while next < length && spans[next].front == merged.front {
            merged.visibility *= spans[next].visibility;
            next += 1;
        }

        spans[write] = merged;
        write += 1;
        read = next;
    }

    spans.truncate(write);
}

/// Emit one point sample per surviving span.
pub fn discrete(raw: &RawPixel, parameters: &Parameters, spans: &mut Vec<Span>, output: &mut DeepOutputPixel) {
    decode(raw, spans);
    merge_coincident(spans);

    for span in spans.iter() {
        if parameters.discard_transparent && span.is_transparent() {
            continue;
        }

        output.push_alpha(span.front, span.alpha() as f32);
    }
}

/// Emit one interval sample per surviving span. Each span reaches forward to
/// its successor's front. The last span has no successor, so its extent is
/// solved from its visibility and the steepest density observed anywhere in
/// this pixel.
pub fn continuous(raw: &RawPixel, parameters: &Parameters, spans: &mut Vec<Span>, output: &mut DeepOutputPixel) {
    decode(raw, spans);
    merge_coincident(spans);

    let mut max_density = 0.0_f64;
    for index in 1 .. spans.len() {
        let gap = (spans[index].front - spans[index - 1].front) as f64;
        max_density = max_density.max(density_from_visibility(spans[index - 1].visibility, gap));
    }

    // chain each back edge to the successor's front edge, so spans tile without gaps
    for index in 1 .. spans.len() {
        spans[index - 1].back = spans[index].front;
    }

    if let Some(last) = spans.last_mut() {
        let dz = dz_from_visibility(last.visibility, max_density);
        let back = clamp_depth(last.front + dz as f32);
        last.back = if back > last.front { back } else { next_float_up(last.front) };
    }

    for span in spans.iter() {
        if parameters.discard_transparent && span.is_transparent() {
            continue;
        }

        output.push_alpha_span(span.front, span.back, span.alpha() as f32);
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::convert::density::MIN_DZ;

    fn raw_pixel(samples: &[(f32, f32)]) -> RawPixel {
        let mut raw = RawPixel::new();
        raw.clear(1);
        for &(depth, alpha) in samples {
            raw.push_sample(depth, &[alpha]);
        }
        raw
    }

    fn run(samples: &[(f32, f32)], continuous_mode: bool, parameters: &Parameters) -> DeepOutputPixel {
        let raw = raw_pixel(samples);
        let mut spans = Vec::new();
        let mut output = DeepOutputPixel::new();
        output.clear_and_reserve(raw.sample_count());

        if continuous_mode { continuous(&raw, parameters, &mut spans, &mut output); }
        else { discrete(&raw, parameters, &mut spans, &mut output); }

        output
    }

    fn alpha_parameters() -> Parameters {
        Parameters {
            representation: crate::convert::Representation::Alpha,
            .. Parameters::default()
        }
    }

    #[test]
    fn opaque_single_sample_passes_through(){
        let output = run(&[(5.0, 1.0)], false, &alpha_parameters());

        assert_eq!(output.sample_count(), 1);
        assert_eq!(output.front, vec![5.0]);
        assert_eq!(output.alpha, vec![1.0]);
    }

    #[test]
    fn coincident_samples_combine_visibility(){
        // two independent 0.5 alpha samples at the same depth
        let output = run(&[(2.0, 0.5), (2.0, 0.5)], false, &alpha_parameters());

        assert_eq!(output.sample_count(), 1);
        assert!((output.alpha[0] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn samples_are_sorted_by_depth(){
        let output = run(&[(3.0, 0.25), (1.0, 0.5), (2.0, 0.125)], false, &alpha_parameters());

        assert_eq!(output.front, vec![1.0, 2.0, 3.0]);
        for pair in output.front.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn merging_is_idempotent(){
        let mut spans = vec![
            Span::new(1.0, 0.5, 0),
            Span::new(2.0, 0.25, 1),
            Span::new(3.0, 0.75, 2),
        ];

        let before = spans.clone();
        merge_coincident(&mut spans);
        assert_eq!(spans, before);
    }

    #[test]
    fn transparent_samples_are_discarded_by_default(){
        let output = run(&[(1.0, 0.0), (2.0, 0.0)], false, &alpha_parameters());
        assert_eq!(output.sample_count(), 0);
    }

    #[test]
    fn transparent_samples_survive_keep_policy(){
        let parameters = Parameters {
            discard_transparent: false,
            .. alpha_parameters()
        };

        let output = run(&[(1.0, 0.0)], true, &parameters);

        assert_eq!(output.sample_count(), 1);
        assert_eq!(output.alpha, vec![0.0]);

        // a synthesized extent must have nonzero width
        assert!(output.back[0] > output.front[0]);
    }

    #[test]
    fn continuous_spans_tile_without_gaps(){
        let output = run(&[(1.0, 0.5), (2.0, 0.5), (4.0, 0.5)], true, &alpha_parameters());

        assert_eq!(output.sample_count(), 3);
        assert_eq!(output.back[0], output.front[1]);
        assert_eq!(output.back[1], output.front[2]);
        assert!(output.back[2] > output.front[2]);
    }

    #[test]
    fn last_span_extent_uses_the_steepest_gap(){
        // visibility 0.5 over a gap of 1 gives the maximum density,
        // so the last span with visibility 0.5 must also get an extent of 1
        let output = run(&[(1.0, 0.5), (2.0, 0.5)], true, &alpha_parameters());

        assert_eq!(output.sample_count(), 2);
        assert!((output.back[1] - 3.0).abs() < 1e-4);
    }

    #[test]
    fn opaque_last_span_gets_the_minimal_extent(){
        let output = run(&[(1.0, 0.5), (2.0, 1.0)], true, &alpha_parameters());

        assert_eq!(output.sample_count(), 2);
        assert!(((output.back[1] - output.front[1]) as f64 - MIN_DZ).abs() < 1e-6);
    }

    #[test]
    fn alphas_stay_in_unit_range(){
        let output = run(
            &[(1.0, 7.5), (2.0, -3.0), (3.0, f32::NAN), (f32::INFINITY, 0.5)],
            false,
            &alpha_parameters(),
        );

        for &alpha in &output.alpha {
            assert!((0.0..=1.0).contains(&alpha));
        }
    }
}
