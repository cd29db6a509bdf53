
//! Integration tests for the conversion pipeline:
//! in-memory deep texture -> conversion -> deep scanline bytes -> reloaded texture.

use deeptidy::prelude::*;
use deeptidy::texture::RawPixel;
use std::io::Cursor;


fn convert_to_bytes(texture: &DeepTexture, parameters: &Parameters) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    convert(texture, parameters, &mut buffer).unwrap();
    buffer.into_inner()
}

fn reload(bytes: Vec<u8>) -> DeepTexture {
    DeepTexture::read_from_buffered(Cursor::new(bytes)).unwrap()
}

fn pixel_of(texture: &DeepTexture, x: usize, y: usize) -> RawPixel {
    let mut pixel = RawPixel::new();
    texture.read_pixel(Vec2(x, y), &mut pixel).unwrap();
    pixel
}

/// A 1×1 texture with a single data channel.
fn single_pixel_texture(samples: &[(f32, f32)]) -> DeepTexture {
    let depths = samples.iter().map(|&(depth, _)| depth).collect();
    let values = samples.iter().map(|&(_, value)| value).collect();

    DeepTexture::from_samples(
        Vec2(1, 1),
        vec![samples.len() as u32],
        depths,
        vec![values],
    ).unwrap()
}

/// A 1×1 texture with four data channels.
fn single_pixel_rgba_texture(samples: &[(f32, [f32; 4])]) -> DeepTexture {
    let depths = samples.iter().map(|&(depth, _)| depth).collect();
    let channels = (0..4)
        .map(|channel| samples.iter().map(|&(_, values)| values[channel]).collect())
        .collect();

    DeepTexture::from_samples(Vec2(1, 1), vec![samples.len() as u32], depths, channels).unwrap()
}

fn alpha_parameters() -> Parameters {
    Parameters {
        representation: Representation::Alpha,
        .. Parameters::default()
    }
}


#[test]
fn trivial_opaque_sample_round_trips_exactly(){
    let texture = single_pixel_texture(&[(5.0, 1.0)]);
    let result = reload(convert_to_bytes(&texture, &alpha_parameters()));

    let pixel = pixel_of(&result, 0, 0);
    assert_eq!(pixel.sample_count(), 1);
    assert_eq!(pixel.depth(0), 5.0);
    assert_eq!(pixel.values(0), &[1.0]);
}

#[test]
fn coincident_rgba_samples_collapse(){
    // two independent 0.5 alpha samples at the identical depth
    let texture = single_pixel_rgba_texture(&[
        (2.0, [0.5, 0.0, 0.0, 0.5]),
        (2.0, [0.0, 0.5, 0.0, 0.5]),
    ]);

    let parameters = Parameters {
        full_precision: true,
        .. alpha_parameters()
    };

    let result = reload(convert_to_bytes(&texture, &parameters));
    let pixel = pixel_of(&result, 0, 0);

    assert_eq!(pixel.sample_count(), 1);

    let values = pixel.values(0);
    assert!((values[3] - 0.75).abs() < 1e-6); // combined alpha
    assert!((values[0] - 0.75).abs() < 1e-6); // re-premultiplied red
    assert!((values[1] - 0.75).abs() < 1e-6);
    assert_eq!(values[2], 0.0);
}

#[test]
fn all_transparent_pixel_is_discarded_by_default(){
    let texture = single_pixel_texture(&[(1.0, 0.0), (2.0, 0.0), (3.0, 0.0)]);
    let result = reload(convert_to_bytes(&texture, &alpha_parameters()));

    assert_eq!(pixel_of(&result, 0, 0).sample_count(), 0);
}

#[test]
fn all_transparent_single_sample_survives_keep_policy(){
    let texture = single_pixel_texture(&[(1.0, 0.0)]);

    let parameters = Parameters {
        discard_transparent: false,
        interpretation: Interpretation::Continuous,
        .. alpha_parameters()
    };

    let result = reload(convert_to_bytes(&texture, &parameters));
    let pixel = pixel_of(&result, 0, 0);

    assert_eq!(pixel.sample_count(), 1);
    assert_eq!(pixel.values(0), &[0.0]);
}

#[test]
fn output_depths_are_strictly_increasing(){
    let texture = single_pixel_texture(&[
        (3.0, 0.25), (1.0, 0.5), (3.0, 0.5), (2.0, 0.125), (1.0, 0.25),
    ]);

    let result = reload(convert_to_bytes(&texture, &alpha_parameters()));
    let pixel = pixel_of(&result, 0, 0);

    assert_eq!(pixel.sample_count(), 3);
    for index in 1 .. pixel.sample_count() {
        assert!(pixel.depth(index - 1) < pixel.depth(index));
    }
}

#[test]
fn emitted_alphas_stay_in_unit_range(){
    let texture = single_pixel_texture(&[
        (1.0, 7.5), (2.0, -3.0), (3.0, f32::NAN), (f32::INFINITY, 0.5), (4.0, 0.25),
    ]);

    let parameters = Parameters {
        discard_transparent: false,
        interpretation: Interpretation::Continuous,
        .. alpha_parameters()
    };

    let result = reload(convert_to_bytes(&texture, &parameters));
    let pixel = pixel_of(&result, 0, 0);

    assert!(pixel.sample_count() > 0);
    for index in 0 .. pixel.sample_count() {
        let alpha = pixel.values(index)[0];
        assert!((0.0..=1.0).contains(&alpha));
        assert!(pixel.depth(index).is_finite());
    }
}

#[test]
fn glow_sample_survives_conversion_unchanged(){
    let texture = single_pixel_rgba_texture(&[(1.0, [0.1, 0.2, 0.3, 0.0])]);

    let parameters = Parameters {
        discard_transparent: false,
        full_precision: true,
        .. alpha_parameters()
    };

    let result = reload(convert_to_bytes(&texture, &parameters));
    let pixel = pixel_of(&result, 0, 0);

    assert_eq!(pixel.sample_count(), 1);
    let values = pixel.values(0);
    assert!((values[0] - 0.1).abs() < 1e-6);
    assert!((values[1] - 0.2).abs() < 1e-6);
    assert!((values[2] - 0.3).abs() < 1e-6);
    assert_eq!(values[3], 0.0);
}

#[test]
fn premultiplied_color_round_trips_through_unpremultiply(){
    let texture = single_pixel_rgba_texture(&[(1.0, [0.25, 0.5, 0.75, 0.5])]);

    let parameters = Parameters {
        full_precision: true,
        .. alpha_parameters()
    };

    let result = reload(convert_to_bytes(&texture, &parameters));
    let values_pixel = pixel_of(&result, 0, 0);
    let values = values_pixel.values(0);

    assert!((values[0] - 0.25).abs() < 1e-6);
    assert!((values[1] - 0.5).abs() < 1e-6);
    assert!((values[2] - 0.75).abs() < 1e-6);
    assert!((values[3] - 0.5).abs() < 1e-6);
}

#[test]
fn deep_opacity_derives_per_span_alpha(){
    // accumulated visibility halves at every sample
    let texture = single_pixel_texture(&[(1.0, 0.5), (2.0, 0.25), (3.0, 0.125)]);
    let result = reload(convert_to_bytes(&texture, &Parameters::default()));

    let pixel = pixel_of(&result, 0, 0);
    assert_eq!(pixel.sample_count(), 3);
    for index in 0 .. 3 {
        assert!((pixel.values(index)[0] - 0.5).abs() < 1e-3); // f16 precision
    }
}

#[test]
fn unsupported_channel_count_fails_before_writing(){
    use deeptidy::texture::DeepSource;
    use deeptidy::error::UnitResult;

    struct TwoChannelSource;

    impl DeepSource for TwoChannelSource {
        fn resolution(&self) -> Vec2<usize> { Vec2(1, 1) }
        fn channel_count(&self) -> usize { 2 }
        fn read_pixel(&self, _: Vec2<usize>, _: &mut RawPixel) -> UnitResult { Ok(()) }
    }

    let mut buffer = Cursor::new(Vec::new());
    let result = convert(&TwoChannelSource, &Parameters::default(), &mut buffer);

    assert!(matches!(result, Err(Error::NotSupported(_))));

    // nothing may have been written before the failure
    assert!(buffer.into_inner().is_empty());

    // the storage type itself also rejects the channel count
    assert!(DeepTexture::from_samples(Vec2(1, 1), vec![0], vec![], vec![vec![], vec![]]).is_err());
}

#[test]
fn sideways_transposes_the_image(){
    // 2×1 source: left pixel has one sample, right pixel has two
    let texture = DeepTexture::from_samples(
        Vec2(2, 1),
        vec![1, 2],
        vec![1.0, 2.0, 3.0],
        vec![vec![0.5, 0.25, 0.5]],
    ).unwrap();

    let parameters = Parameters {
        sideways: true,
        .. alpha_parameters()
    };

    let result = reload(convert_to_bytes(&texture, &parameters));

    // the output is 1×2, with the source's right pixel at the bottom
    assert_eq!(result.resolution(), Vec2(1, 2));
    assert_eq!(pixel_of(&result, 0, 0).sample_count(), 1);
    assert_eq!(pixel_of(&result, 0, 1).sample_count(), 2);
    assert_eq!(pixel_of(&result, 0, 1).depth(0), 2.0);
}

#[test]
fn simplification_tolerance_collapses_similar_samples(){
    let texture = single_pixel_texture(&[
        (1.0, 0.500), (2.0, 0.501), (3.0, 0.499), (4.0, 0.9),
    ]);

    let parameters = Parameters {
        tolerance: 0.01,
        .. alpha_parameters()
    };

    let result = reload(convert_to_bytes(&texture, &parameters));
    assert_eq!(pixel_of(&result, 0, 0).sample_count(), 2);

    // without tolerance, every sample survives
    let exact = reload(convert_to_bytes(&texture, &alpha_parameters()));
    assert_eq!(pixel_of(&exact, 0, 0).sample_count(), 4);
}

#[test]
fn transform_matrices_are_carried_through(){
    let mut world_to_camera = [0.0_f32; 16];
    for (index, value) in world_to_camera.iter_mut().enumerate() { *value = index as f32; }

    let texture = single_pixel_texture(&[(1.0, 0.5)])
        .with_transforms(Some(world_to_camera), None);

    let result = reload(convert_to_bytes(&texture, &alpha_parameters()));

    use deeptidy::texture::DeepSource;
    assert_eq!(result.world_to_camera(), Some(world_to_camera));
    assert_eq!(result.world_to_normalized_device(), None);
}
