//! Foreground masks for masked template matching.

use ::image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, open};

/// Marks pixels whose color differs from `background` by more than
/// `tolerance` on any channel, then closes and opens the mask with a 3x3
/// square to drop speckle. Foreground is 255, background 0.
pub fn foreground_mask_rgb(img: &RgbImage, background: [u8; 3], tolerance: u8) -> GrayImage {
    let raw = GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let px = img.get_pixel(x, y).0;
        let fg = px
            .iter()
            .zip(background.iter())
            .any(|(&p, &b)| p.abs_diff(b) > tolerance);
        Luma([if fg { 255 } else { 0 }])
    });
    open(&close(&raw, Norm::LInf, 1), Norm::LInf, 1)
}

/// Marks pixels strictly brighter than `threshold`.
pub fn foreground_mask_gray(img: &GrayImage, threshold: u8) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        Luma([if img.get_pixel(x, y).0[0] > threshold { 255 } else { 0 }])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::image::Rgb;

    #[test]
    fn background_block_is_masked_out() {
        let img = RgbImage::from_fn(12, 12, |x, y| {
            if (3..9).contains(&x) && (3..9).contains(&y) {
                Rgb([220, 180, 40])
            } else {
                Rgb([87, 47, 66])
            }
        });
        let mask = foreground_mask_rgb(&img, [87, 47, 66], 30);
        assert_eq!(mask.get_pixel(5, 5).0[0], 255);
        assert_eq!(mask.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn gray_threshold_is_strict() {
        let img = GrayImage::from_fn(3, 1, |x, _| Luma([[199u8, 200, 201][x as usize]]));
        let mask = foreground_mask_gray(&img, 200);
        assert_eq!(mask.as_raw(), &vec![0, 0, 255]);
    }
}
