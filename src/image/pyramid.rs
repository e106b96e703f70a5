//! Fractional-scale image pyramid for keypoint detection.
//!
//! Level `l` is the base area-resized by `1 / scale_factor^l`, so each level
//! is built from the base directly and no resampling error accumulates.

use ::image::GrayImage;

use crate::image::resize::resize_area_gray;

/// Owned grayscale pyramid; level 0 is the base resolution.
pub struct ScalePyramid {
    levels: Vec<GrayImage>,
    scales: Vec<f32>,
}

impl ScalePyramid {
    /// Builds up to `max_levels` levels, stopping before a level whose
    /// shorter side would fall below `min_side`.
    ///
    /// `max_levels` is clamped to at least 1 so the base level is always
    /// present.
    pub fn build(base: &GrayImage, scale_factor: f32, max_levels: usize, min_side: u32) -> Self {
        let max_levels = max_levels.max(1);
        let mut levels = vec![base.clone()];
        let mut scales = vec![1.0f32];
        let (bw, bh) = base.dimensions();

        for level in 1..max_levels {
            let scale = scale_factor.powi(level as i32);
            let w = (bw as f32 / scale).round() as u32;
            let h = (bh as f32 / scale).round() as u32;
            if w.min(h) < min_side.max(1) {
                break;
            }
            levels.push(resize_area_gray(base, w, h));
            scales.push(scale);
        }

        Self { levels, scales }
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Returns a level image, if present.
    pub fn level(&self, index: usize) -> Option<&GrayImage> {
        self.levels.get(index)
    }

    /// Iterates `(level image, scale relative to the base)`.
    pub fn iter(&self) -> impl Iterator<Item = (&GrayImage, f32)> + '_ {
        self.levels.iter().zip(self.scales.iter().copied())
    }
}
