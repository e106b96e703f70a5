//! Difference-hash behavior on synthetic gradients and noise.

use ::image::{DynamicImage, GrayImage, Luma};
use iconmatch::hash::{compute_hash, distance, similarity, HASH_BITS};
use iconmatch::{DHash, HashMatcher};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn gradient(width: u32, height: u32, rising: bool) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |x, _| {
        let v = (x * 255 / (width - 1)) as u8;
        Luma([if rising { v } else { 255 - v }])
    }))
}

fn noise(seed: u64, size: u32) -> DynamicImage {
    let mut rng = StdRng::seed_from_u64(seed);
    DynamicImage::ImageLuma8(GrayImage::from_fn(size, size, |_, _| {
        Luma([rng.random_range(0..=255u8)])
    }))
}

#[test]
fn identical_images_have_zero_distance() {
    let img = noise(3, 64);
    let a = compute_hash(&img);
    let b = compute_hash(&img.clone());
    assert_eq!(distance(a, b), 0);
    assert_eq!(similarity(a, b), 100.0);
}

#[test]
fn opposite_gradients_differ_in_every_bit() {
    let rising = compute_hash(&gradient(90, 40, true));
    let falling = compute_hash(&gradient(90, 40, false));
    assert_eq!(rising, DHash(0));
    assert_eq!(falling, DHash(u64::MAX));
    assert_eq!(distance(rising, falling), HASH_BITS);
    assert_eq!(similarity(rising, falling), 0.0);
}

fn blocks(seed: u64, size: u32, block: u32) -> DynamicImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let cells = size.div_ceil(block);
    let values: Vec<u8> = (0..cells * cells).map(|_| rng.random_range(0..=255u8)).collect();
    DynamicImage::ImageLuma8(GrayImage::from_fn(size, size, |x, y| {
        Luma([values[((y / block) * cells + x / block) as usize]])
    }))
}

#[test]
fn hash_is_scale_tolerant() {
    let big = blocks(11, 180, 20);
    let small = DynamicImage::ImageLuma8(::image::imageops::resize(
        &big.to_luma8(),
        90,
        90,
        ::image::imageops::FilterType::Triangle,
    ));
    let d = distance(compute_hash(&big), compute_hash(&small));
    assert!(d <= 12, "distance {d} too large for a rescaled copy");
}

#[test]
fn distance_is_symmetric() {
    let matcher = HashMatcher;
    let a = matcher.compute_hash(&noise(1, 48));
    let b = matcher.compute_hash(&noise(2, 48));
    assert_eq!(matcher.distance(a, b), matcher.distance(b, a));
    let s = matcher.similarity(a, b);
    assert!((0.0..=100.0).contains(&s));
    assert_eq!(s, 100.0 * (1.0 - f64::from(matcher.distance(a, b)) / 64.0));
}

#[test]
fn display_is_sixteen_hex_digits() {
    assert_eq!(DHash(0xab).to_string(), "00000000000000ab");
}

#[test]
fn identical_flat_icons_are_fully_similar() {
    let red = DynamicImage::ImageRgb8(::image::RgbImage::from_pixel(50, 50, ::image::Rgb([220, 20, 20])));
    let matcher = HashMatcher;
    let a = matcher.compute_hash(&red);
    let b = matcher.compute_hash(&red.clone());
    assert_eq!(a, b);
    assert_eq!(matcher.similarity(a, b), 100.0);
}
