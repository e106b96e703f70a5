//! CIE L*a*b* conversion and histogram distance.

use ::image::RgbImage;

/// `(L, a, b)` ranges used for binning: L in [0, 100], a and b in [-128, 128).
const LAB_RANGES: [(f32, f32); 3] = [(0.0, 100.0), (-128.0, 128.0), (-128.0, 128.0)];

// D65 reference white.
const WHITE: [f32; 3] = [0.950_47, 1.0, 1.088_83];

#[inline]
fn srgb_to_linear(c: u8) -> f32 {
    let c = c as f32 / 255.0;
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

#[inline]
fn lab_f(t: f32) -> f32 {
    const DELTA: f32 = 6.0 / 29.0;
    if t > DELTA * DELTA * DELTA {
        t.cbrt()
    } else {
        t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
    }
}

/// Converts one sRGB pixel to CIE L*a*b* (D65).
pub fn rgb_to_lab(rgb: [u8; 3]) -> [f32; 3] {
    let r = srgb_to_linear(rgb[0]);
    let g = srgb_to_linear(rgb[1]);
    let b = srgb_to_linear(rgb[2]);

    let x = 0.412_456_4 * r + 0.357_576_1 * g + 0.180_437_5 * b;
    let y = 0.212_672_9 * r + 0.715_152_2 * g + 0.072_175 * b;
    let z = 0.019_333_9 * r + 0.119_192 * g + 0.950_304_1 * b;

    let fx = lab_f(x / WHITE[0]);
    let fy = lab_f(y / WHITE[1]);
    let fz = lab_f(z / WHITE[2]);

    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

/// Per-channel normalized L*a*b* histograms, `bins` entries each.
#[derive(Clone, Debug, PartialEq)]
pub struct LabHistogram {
    bins: usize,
    channels: [Vec<f64>; 3],
}

impl LabHistogram {
    /// Builds the histogram over pixels whose mask byte is nonzero (all
    /// pixels without a mask). Empty selections yield all-zero histograms.
    pub fn from_rgb(img: &RgbImage, bins: usize, mask: Option<&[u8]>) -> Self {
        let bins = bins.max(1);
        let mut channels = [vec![0.0f64; bins], vec![0.0f64; bins], vec![0.0f64; bins]];
        let mut total = 0usize;
        for (idx, pixel) in img.pixels().enumerate() {
            if mask.is_some_and(|m| m.get(idx).copied().unwrap_or(0) == 0) {
                continue;
            }
            let lab = rgb_to_lab(pixel.0);
            for (c, &value) in lab.iter().enumerate() {
                let (lo, hi) = LAB_RANGES[c];
                let t = ((value - lo) / (hi - lo)).clamp(0.0, 1.0);
                let bin = ((t * bins as f32) as usize).min(bins - 1);
                channels[c][bin] += 1.0;
            }
            total += 1;
        }
        if total > 0 {
            let inv = 1.0 / total as f64;
            for hist in channels.iter_mut() {
                hist.iter_mut().for_each(|v| *v *= inv);
            }
        }
        Self { bins, channels }
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Normalized histogram of channel `c` (0 = L, 1 = a, 2 = b).
    pub fn channel(&self, c: usize) -> &[f64] {
        &self.channels[c]
    }

    /// Mean per-channel Bhattacharyya distance in [0, 1].
    ///
    /// Histograms with different bin counts, or an empty side, are maximally
    /// distant.
    pub fn distance(&self, other: &Self) -> f64 {
        if self.bins != other.bins {
            return 1.0;
        }
        let sum: f64 = self
            .channels
            .iter()
            .zip(other.channels.iter())
            .map(|(p, q)| bhattacharyya(p, q))
            .sum();
        sum / 3.0
    }
}

/// `sqrt(1 - sum(sqrt(p*q)))` for normalized histograms.
pub fn bhattacharyya(p: &[f64], q: &[f64]) -> f64 {
    let coeff: f64 = p.iter().zip(q.iter()).map(|(a, b)| (a * b).sqrt()).sum();
    (1.0 - coeff).max(0.0).sqrt().min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::image::Rgb;

    #[test]
    fn lab_reference_points() {
        let white = rgb_to_lab([255, 255, 255]);
        assert!((white[0] - 100.0).abs() < 0.05);
        assert!(white[1].abs() < 0.05 && white[2].abs() < 0.05);

        let red = rgb_to_lab([255, 0, 0]);
        assert!((red[0] - 53.24).abs() < 0.1);
        assert!((red[1] - 80.09).abs() < 0.2);
        assert!((red[2] - 67.20).abs() < 0.2);
    }

    #[test]
    fn identical_histograms_have_zero_distance() {
        let img = RgbImage::from_fn(8, 8, |x, y| Rgb([(x * 30) as u8, (y * 30) as u8, 90]));
        let h = LabHistogram::from_rgb(&img, 32, None);
        assert!(h.distance(&h) < 1e-6);
    }

    #[test]
    fn disjoint_histograms_are_maximally_distant() {
        let p = [1.0, 0.0];
        let q = [0.0, 1.0];
        assert!((bhattacharyya(&p, &q) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn mask_restricts_pixels() {
        let img = RgbImage::from_fn(2, 1, |x, _| if x == 0 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) });
        let h = LabHistogram::from_rgb(&img, 4, Some(&[1, 0]));
        assert_eq!(h.channel(0), &[1.0, 0.0, 0.0, 0.0]);
    }
}
