//! Template correlation plus L*a*b* histogram comparison.

use ::image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use iconmatch::image::BACKGROUND_COLOR;
use iconmatch::template::{composite_score, match_template_gray, CompositeWeights};
use iconmatch::{
    CanonicalSize, ImageNormalizer, NormalizeMode, NormalizedImage, TemplateColorConfig,
    TemplateColorMatcher,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn normalize(img: &RgbImage) -> NormalizedImage {
    ImageNormalizer::default()
        .normalize(
            &DynamicImage::ImageRgb8(img.clone()),
            CanonicalSize::default(),
            NormalizeMode::Color,
        )
        .unwrap()
}

fn color_texture(seed: u64, size: u32) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let block = 8;
    let cells = size.div_ceil(block);
    let values: Vec<[u8; 3]> = (0..cells * cells)
        .map(|_| [rng.random_range(0..=255u8), rng.random_range(0..=255u8), rng.random_range(0..=255u8)])
        .collect();
    RgbImage::from_fn(size, size, |x, y| Rgb(values[((y / block) * cells + x / block) as usize]))
}

fn gray_texture(seed: u64, width: u32, height: u32) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    GrayImage::from_fn(width, height, |_, _| Luma([rng.random_range(0..=255u8)]))
}

#[test]
fn red_and_blue_icons_do_not_match() {
    let red = normalize(&RgbImage::from_pixel(64, 64, Rgb([220, 30, 30])));
    let blue = normalize(&RgbImage::from_pixel(64, 64, Rgb([30, 30, 220])));
    let score = TemplateColorMatcher::default().compare(&red, &blue).unwrap();
    assert!(score.color_distance > 0.9, "distance {}", score.color_distance);
    let confidence = score.composite * 100.0;
    assert!(confidence < 90.0, "confidence {confidence}");
    assert!((confidence - 70.0).abs() < 1.0, "confidence {confidence}");
}

#[test]
fn identical_icons_score_near_full() {
    let icon = normalize(&color_texture(5, 96));
    let score = TemplateColorMatcher::default().compare(&icon, &icon).unwrap();
    assert!(score.template.score > 0.999);
    assert!(score.color_distance < 1e-6);
    assert!(score.composite > 0.999);
    assert_eq!((score.template.x, score.template.y), (0, 0));
}

#[test]
fn template_is_located_in_larger_target() {
    let target = gray_texture(9, 100, 90);
    let template = ::image::imageops::crop_imm(&target, 40, 25, 30, 20).to_image();
    let found = match_template_gray(&template, &target, None).unwrap();
    assert_eq!((found.x, found.y), (40, 25));
    assert!(found.score > 0.9999);
}

#[test]
fn masked_match_ignores_background() {
    let foreground = color_texture(13, 60);
    let mut base = RgbImage::from_pixel(116, 116, Rgb(BACKGROUND_COLOR));
    let mut target = RgbImage::from_pixel(116, 116, Rgb([0, 0, 0]));
    ::image::imageops::replace(&mut base, &foreground, 28, 28);
    ::image::imageops::replace(&mut target, &foreground, 28, 28);
    let (base, target) = (normalize(&base), normalize(&target));

    let masked = TemplateColorMatcher::new(TemplateColorConfig {
        use_mask: true,
        ..TemplateColorConfig::default()
    })
    .match_template(&base, &target)
    .unwrap();
    let unmasked = TemplateColorMatcher::default()
        .match_template(&base, &target)
        .unwrap();
    assert!(masked.score > 0.999, "masked {}", masked.score);
    assert!(masked.score >= unmasked.score);
}

#[test]
fn oversized_template_is_shrunk_to_fit() {
    let normalizer = ImageNormalizer::default();
    let big = normalizer
        .normalize(
            &DynamicImage::ImageRgb8(color_texture(2, 200)),
            CanonicalSize::new(150, 120),
            NormalizeMode::Color,
        )
        .unwrap();
    let small = normalize(&color_texture(2, 200));
    let found = TemplateColorMatcher::default()
        .match_template(&big, &small)
        .unwrap();
    assert!((0.0..=1.0).contains(&found.score));
}

#[test]
fn color_distance_is_bounded_and_symmetric() {
    let matcher = TemplateColorMatcher::default();
    let a = color_texture(21, 64);
    let b = color_texture(22, 64);
    let ab = matcher.color_distance(&a, &b);
    let ba = matcher.color_distance(&b, &a);
    assert!((0.0..=1.0).contains(&ab));
    assert!((ab - ba).abs() < 1e-12);
    assert!(matcher.color_distance(&a, &a) < 1e-6);
}

#[test]
fn composite_is_monotone_in_both_terms() {
    let w = CompositeWeights::default();
    assert!(composite_score(0.9, 0.2, w) > composite_score(0.8, 0.2, w));
    assert!(composite_score(0.9, 0.1, w) > composite_score(0.9, 0.2, w));
    assert!((composite_score(1.0, 0.0, w) - 1.0).abs() < 1e-12);
}

#[test]
fn masked_color_term_ignores_tile_background() {
    let base = normalize(&RgbImage::from_fn(116, 116, |x, y| {
        if (28..88).contains(&x) && (28..88).contains(&y) {
            Rgb([220, 30, 30])
        } else {
            Rgb(BACKGROUND_COLOR)
        }
    }));
    let target = normalize(&RgbImage::from_pixel(116, 116, Rgb([220, 30, 30])));

    let masked = TemplateColorMatcher::new(TemplateColorConfig {
        use_mask: true,
        ..TemplateColorConfig::default()
    })
    .compare(&base, &target)
    .unwrap();
    let unmasked = TemplateColorMatcher::default().compare(&base, &target).unwrap();

    assert!(masked.color_distance < 0.05, "masked {}", masked.color_distance);
    assert!(unmasked.color_distance > 0.5, "unmasked {}", unmasked.color_distance);
}
