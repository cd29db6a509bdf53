
//! Merge algorithms for single-channel sources whose samples store
//! deep opacity: the visibility accumulated from the near side of the
//! pixel up to and including each sample.

use crate::convert::density::{
    clamp_depth, clamp_unit, density_from_visibility, dz_from_visibility, next_float_down,
};
use crate::convert::pixel::DeepOutputPixel;
use crate::convert::span::OpacitySpan;
use crate::convert::Parameters;
use crate::texture::RawPixel;


/// Decode the raw samples into sorted point spans carrying accumulated visibility.
fn decode(raw: &RawPixel, spans: &mut Vec<OpacitySpan>) {
    spans.clear();

    for index in 0 .. raw.sample_count() {
        let depth = clamp_depth(raw.depth(index));
        let accumulated = clamp_unit(raw.values(index)[0] as f64);
        spans.push(OpacitySpan::new(depth, accumulated, index));
    }

    spans.sort_unstable_by(|a, b| a.span.depth_ordering(&b.span));
}

/// Merge groups of spans that share the identical front depth, then derive
/// each span's own visibility from the accumulated chain.
///
/// Accumulated visibility is monotonic, so within a coincident group the
/// smallest remaining visibility wins. After merging, each accumulated value
/// is clamped to its predecessor so the chain never increases with depth.
fn merge_coincident(spans: &mut Vec<OpacitySpan>) {
    let length = spans.len();
    let mut write = 0;
    let mut read = 0;

    while read < length {
        let mut merged = spans[read];

        let mut next = read + 1;
        while next < length && spans[next].span.front == merged.span.front {
            merged.accumulated_visibility = merged.accumulated_visibility
                .min(spans[next].accumulated_visibility);
            next += 1;
        }

        spans[write] = merged;
        write += 1;
        read = next;
    }

    spans.truncate(write);

    // enforce monotonicity, then derive per-span visibility
    let mut previous_accumulated = 1.0_f64;
    for span in spans.iter_mut() {
        span.accumulated_visibility = span.accumulated_visibility.min(previous_accumulated);

        span.span.visibility = if previous_accumulated <= 0.0 {
            0.0 // total occlusion was already reached in front of this span
        } else {
            clamp_unit(span.accumulated_visibility / previous_accumulated)
        };

        previous_accumulated = span.accumulated_visibility;
    }
}

/// Emit one point sample per surviving span.
pub fn discrete(raw: &RawPixel, parameters: &Parameters, spans: &mut Vec<OpacitySpan>, output: &mut DeepOutputPixel) {
    decode(raw, spans);
    merge_coincident(spans);

    for span in spans.iter() {
        if parameters.discard_transparent && span.span.is_transparent() {
            continue;
        }

        output.push_alpha(span.span.front, span.span.alpha() as f32);
    }
}

/// Emit one interval sample per surviving span. An accumulated value applies
/// up to and including its depth, so each span reaches backward to its
/// predecessor's depth. The first span has no predecessor, so its extent is
/// solved from its visibility and the steepest density observed anywhere in
/// this pixel.
pub fn continuous(raw: &RawPixel, parameters: &Parameters, spans: &mut Vec<OpacitySpan>, output: &mut DeepOutputPixel) {
    decode(raw, spans);
    merge_coincident(spans);

    let mut max_density = 0.0_f64;
    for index in 1 .. spans.len() {
        let gap = (spans[index].span.front - spans[index - 1].span.front) as f64;
        max_density = max_density.max(density_from_visibility(spans[index].span.visibility, gap));
    }

    // each span ends at its own depth and begins
    // at its predecessor's depth, tiling without gaps
    for index in (1 .. spans.len()).rev() {
        spans[index].span.back = spans[index].span.front;
        spans[index].span.front = spans[index - 1].span.front;
    }

    if let Some(first) = spans.first_mut() {
        first.span.back = first.span.front;

        let dz = dz_from_visibility(first.span.visibility, max_density);
        let front = clamp_depth(first.span.back - dz as f32);
        first.span.front = if front < first.span.back { front } else { next_float_down(first.span.back) };
    }

    for span in spans.iter() {
        if parameters.discard_transparent && span.span.is_transparent() {
            continue;
        }

        output.push_alpha_span(span.span.front, span.span.back, span.span.alpha() as f32);
    }
}


#[cfg(test)]
mod test {
    use super::*;

    fn raw_pixel(samples: &[(f32, f32)]) -> RawPixel {
        let mut raw = RawPixel::new();
        raw.clear(1);
        for &(depth, accumulated) in samples {
            raw.push_sample(depth, &[accumulated]);
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

    #[test]
    fn accumulated_chain_becomes_per_span_alpha(){
        // 50% remains after the first span, half of that after the second
        let output = run(&[(1.0, 0.5), (2.0, 0.25)], false, &Parameters::default());

        assert_eq!(output.sample_count(), 2);
        assert!((output.alpha[0] - 0.5).abs() < 1e-6);
        assert!((output.alpha[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn increasing_accumulated_visibility_is_clamped_down(){
        // the second value rises, which deep opacity forbids
        let output = run(&[(1.0, 0.5), (2.0, 0.8)], false, &Parameters::default());

        // clamped to the predecessor: fully transparent span, discarded
        assert_eq!(output.sample_count(), 1);
        assert!((output.alpha[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn coincident_depths_keep_the_smallest_visibility(){
        let output = run(&[(1.0, 0.5), (1.0, 0.25), (1.0, 0.75)], false, &Parameters::default());

        assert_eq!(output.sample_count(), 1);
        assert!((output.alpha[0] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn total_occlusion_forces_zero_visibility_behind(){
        let output = run(&[(1.0, 0.0), (2.0, 0.0)], false, &Parameters::default());

        assert_eq!(output.sample_count(), 2);
        assert_eq!(output.alpha[0], 1.0);
        assert_eq!(output.alpha[1], 1.0);
    }

    #[test]
    fn continuous_spans_tile_backward(){
        let output = run(&[(2.0, 0.5), (3.0, 0.25), (5.0, 0.125)], true, &Parameters::default());

        assert_eq!(output.sample_count(), 3);

        // every span ends at its own raw depth
        assert_eq!(output.back, vec![2.0, 3.0, 5.0]);

        // and begins where its predecessor ends
        assert_eq!(output.front[1], 2.0);
        assert_eq!(output.front[2], 3.0);

        // the first span's synthesized front lies in front of its back
        assert!(output.front[0] < output.back[0]);
    }

    #[test]
    fn first_span_extent_uses_the_steepest_gap(){
        // the second span halves visibility over a gap of 1,
        // and the first span also halves it, so its extent must be 1
        let output = run(&[(2.0, 0.5), (3.0, 0.25)], true, &Parameters::default());

        assert!((output.front[0] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn single_transparent_sample_keeps_a_nonzero_extent(){
        let parameters = Parameters {
            discard_transparent: false,
            .. Parameters::default()
        };

        let output = run(&[(4.0, 1.0)], true, &parameters);

        assert_eq!(output.sample_count(), 1);
        assert_eq!(output.alpha, vec![0.0]);
        assert!(output.front[0] < output.back[0]);
        assert_eq!(output.back[0], 4.0);
    }

    #[test]
    fn monotonicity_survives_random_input(){
        use rand::prelude::*;
        let mut random = rand::rngs::StdRng::seed_from_u64(42);

        for _ in 0..100 {
            let samples: Vec<(f32, f32)> = (0..20)
                .map(|_| (random.random_range(0.1_f32..10.0), random.random_range(-0.2_f32..1.2)))
                .collect();

            let raw = raw_pixel(&samples);
            let mut spans = Vec::new();
            decode(&raw, &mut spans);
            merge_coincident(&mut spans);

            let mut previous = 1.0_f64;
            for span in &spans {
                assert!(span.accumulated_visibility <= previous + 1e-12);
                assert!((0.0..=1.0).contains(&span.span.visibility));
                previous = span.accumulated_visibility;
            }
        }
    }
}
