//! Canonical-size normalization ahead of every matcher.
//!
//! [`ImageNormalizer`] optionally strips the inventory tile background, then
//! area-resizes to a [`CanonicalSize`] in grayscale, color or edge-enhanced
//! form.

use ::image::{imageops, DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::contrast::equalize_histogram;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use serde::{Deserialize, Serialize};

use crate::image::resize::{resize_area_gray, resize_area_rgb};
use crate::trace::trace_span;
use crate::util::{IconMatchError, IconMatchResult};

/// Tile background color of the game inventory grid (RGB).
pub const BACKGROUND_COLOR: [u8; 3] = [87, 47, 66];

const NEUTRAL_FILL: [u8; 3] = [200, 200, 200];

/// Fixed pixel dimensions every image is brought to before comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalSize {
    pub width: u32,
    pub height: u32,
}

impl CanonicalSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn square(side: u32) -> Self {
        Self::new(side, side)
    }

    pub(crate) fn validate(self) -> IconMatchResult<Self> {
        if self.width == 0 || self.height == 0 {
            return Err(IconMatchError::InvalidDimensions {
                width: self.width as usize,
                height: self.height as usize,
            });
        }
        Ok(self)
    }
}

impl Default for CanonicalSize {
    fn default() -> Self {
        Self::square(116)
    }
}

/// Color handling applied during normalization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeMode {
    /// Single luma plane.
    #[default]
    Grayscale,
    /// RGB plane kept alongside luma.
    Color,
    /// Equalized, blurred, Canny edge map; gives flat icons some texture.
    EdgeEnhanced,
}

/// Tunables for [`ImageNormalizer`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Replace the tile background color with neutral gray before resizing.
    pub strip_background: bool,
    /// Per-channel tolerance when matching the background color.
    pub background_tolerance: u8,
    /// Gaussian sigma for edge enhancement; 0 disables the blur.
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            strip_background: false,
            background_tolerance: 20,
            blur_sigma: 0.8,
            canny_low: 30.0,
            canny_high: 120.0,
        }
    }
}

/// Canonical-size image ready for the matchers.
#[derive(Clone, Debug)]
pub struct NormalizedImage {
    gray: GrayImage,
    color: Option<RgbImage>,
    mode: NormalizeMode,
    original: (u32, u32),
}

impl NormalizedImage {
    /// Luma plane (the edge map in `EdgeEnhanced` mode).
    pub fn gray(&self) -> &GrayImage {
        &self.gray
    }

    /// RGB plane, present only in `Color` mode.
    pub fn color(&self) -> Option<&RgbImage> {
        self.color.as_ref()
    }

    pub fn mode(&self) -> NormalizeMode {
        self.mode
    }

    /// Canonical `(width, height)`.
    pub fn size(&self) -> (u32, u32) {
        self.gray.dimensions()
    }

    /// `(width, height)` of the decoded source before resizing.
    pub fn original_shape(&self) -> (u32, u32) {
        self.original
    }
}

/// Turns decoded images into canonical-size matcher input.
#[derive(Clone, Debug, Default)]
pub struct ImageNormalizer {
    config: NormalizeConfig,
}

impl ImageNormalizer {
    pub fn new(config: NormalizeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizeConfig {
        &self.config
    }

    /// Brings `image` to `target` size in the requested mode.
    pub fn normalize(
        &self,
        image: &DynamicImage,
        target: CanonicalSize,
        mode: NormalizeMode,
    ) -> IconMatchResult<NormalizedImage> {
        let target = target.validate()?;
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(IconMatchError::invalid_image(format!(
                "zero-area image {width}x{height}"
            )));
        }
        let _span = trace_span!("normalize", width = width, height = height).entered();

        let mut rgb = image.to_rgb8();
        if self.config.strip_background {
            strip_background(&mut rgb, BACKGROUND_COLOR, self.config.background_tolerance);
        }

        let (gray, color) = match mode {
            NormalizeMode::Grayscale => {
                let gray = imageops::grayscale(&rgb);
                (resize_area_gray(&gray, target.width, target.height), None)
            }
            NormalizeMode::Color => {
                let color = resize_area_rgb(&rgb, target.width, target.height);
                (imageops::grayscale(&color), Some(color))
            }
            NormalizeMode::EdgeEnhanced => {
                let gray = imageops::grayscale(&rgb);
                let gray = resize_area_gray(&gray, target.width, target.height);
                (self.enhance_edges(&gray), None)
            }
        };

        Ok(NormalizedImage {
            gray,
            color,
            mode,
            original: (width, height),
        })
    }

    fn enhance_edges(&self, gray: &GrayImage) -> GrayImage {
        let equalized = equalize_histogram(gray);
        let blurred = if self.config.blur_sigma > 0.0 {
            gaussian_blur_f32(&equalized, self.config.blur_sigma)
        } else {
            equalized
        };
        canny(&blurred, self.config.canny_low, self.config.canny_high)
    }
}

/// Replaces pixels within `tolerance` of `background` (per channel) with a
/// neutral gray, in place.
pub fn strip_background(img: &mut RgbImage, background: [u8; 3], tolerance: u8) {
    for pixel in img.pixels_mut() {
        let near = pixel
            .0
            .iter()
            .zip(background.iter())
            .all(|(&p, &b)| p.abs_diff(b) < tolerance);
        if near {
            *pixel = Rgb(NEUTRAL_FILL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_background_only_touches_background() {
        let mut img = RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgb([90, 50, 60])
            } else {
                Rgb([10, 200, 10])
            }
        });
        strip_background(&mut img, BACKGROUND_COLOR, 20);
        assert_eq!(img.get_pixel(0, 0).0, NEUTRAL_FILL);
        assert_eq!(img.get_pixel(1, 0).0, [10, 200, 10]);
    }
}
