//! 64-bit difference hash.
//!
//! The luma plane is area-downsampled to a 9x8 grid; in each row, bit
//! `row * 8 + i` is set when `pixel[i] > pixel[i + 1]`. Bits are packed
//! least-significant first.

use ::image::{imageops, DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::image::resize_area_gray;

const GRID_W: u32 = 9;
const GRID_H: u32 = 8;

/// Number of bits in a [`DHash`].
pub const HASH_BITS: u32 = 64;

/// Difference-hash fingerprint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DHash(pub u64);

impl DHash {
    /// Hashes an already-grayscale image of any size.
    pub fn from_gray(gray: &GrayImage) -> Self {
        let grid = resize_area_gray(gray, GRID_W, GRID_H);
        let mut bits = 0u64;
        for y in 0..GRID_H {
            for x in 0..GRID_W - 1 {
                let left = grid.get_pixel(x, y).0[0];
                let right = grid.get_pixel(x + 1, y).0[0];
                if left > right {
                    bits |= 1 << (y * (GRID_W - 1) + x);
                }
            }
        }
        Self(bits)
    }

    pub fn bits(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Hashes any decoded image (converted to luma first).
pub fn compute_hash(image: &DynamicImage) -> DHash {
    match image {
        DynamicImage::ImageLuma8(gray) => DHash::from_gray(gray),
        other => DHash::from_gray(&imageops::grayscale(other)),
    }
}

/// Hamming distance between two hashes.
pub fn distance(a: DHash, b: DHash) -> u32 {
    (a.0 ^ b.0).count_ones()
}

/// `100 * (1 - distance / 64)`.
pub fn similarity(a: DHash, b: DHash) -> f64 {
    100.0 * (1.0 - f64::from(distance(a, b)) / f64::from(HASH_BITS))
}

/// Stateless facade over the hash functions.
#[derive(Clone, Copy, Debug, Default)]
pub struct HashMatcher;

impl HashMatcher {
    pub fn compute_hash(&self, image: &DynamicImage) -> DHash {
        compute_hash(image)
    }

    pub fn distance(&self, a: DHash, b: DHash) -> u32 {
        distance(a, b)
    }

    pub fn similarity(&self, a: DHash, b: DHash) -> f64 {
        similarity(a, b)
    }
}
