//! Oriented FAST keypoints with rotated BRIEF descriptors.
//!
//! Per pyramid level: FAST-9 corners, 3x3 non-maximum suppression on the
//! FAST score, Harris ranking under a per-level budget, intensity-centroid
//! orientation, then a 256-bit descriptor sampled on a smoothed copy of the
//! level with a fixed pattern rotated to the keypoint angle.

use std::cmp::Ordering;
use std::sync::OnceLock;

use ::image::GrayImage;
use imageproc::corners::corners_fast9;
use imageproc::filter::gaussian_blur_f32;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::candidate::nms::nms_3x3;
use crate::candidate::topk::{Ranked, TopK};
use crate::feature::keypoint::{Descriptors, FeatureSet, KeyPoint, DESCRIPTOR_BYTES};
use crate::image::pyramid::ScalePyramid;
use crate::trace::{trace_event, trace_span};
use crate::util::math::{sin_cos_deg, wrap_deg_positive};
use crate::util::{IconMatchError, IconMatchResult};

const PATTERN_SEED: u64 = 0x0b1e_f00d_5eed_0256;
const HARRIS_K: f32 = 0.04;
const HARRIS_BLOCK: i32 = 7;
const DESCRIPTOR_BLUR_SIGMA: f32 = 2.0;

/// Keypoint detector parameters. Part of the feature cache key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    /// Requested keypoint count across all levels.
    pub n_features: usize,
    /// Downscale ratio between consecutive pyramid levels.
    pub scale_factor: f32,
    pub n_levels: usize,
    /// Keypoints closer than this to a level border are dropped.
    pub edge_threshold: u32,
    /// Side of the square patch the descriptor and orientation cover.
    pub patch_size: u32,
    /// FAST intensity threshold.
    pub fast_threshold: u8,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            n_features: 1000,
            scale_factor: 1.1,
            n_levels: 8,
            edge_threshold: 15,
            patch_size: 31,
            fast_threshold: 20,
        }
    }
}

impl DetectorParams {
    pub fn validate(&self) -> IconMatchResult<()> {
        if self.n_features == 0 {
            return Err(IconMatchError::InvalidConfig("n_features must be positive"));
        }
        if !(self.scale_factor.is_finite() && self.scale_factor > 1.0) {
            return Err(IconMatchError::InvalidConfig("scale_factor must exceed 1"));
        }
        if self.n_levels == 0 {
            return Err(IconMatchError::InvalidConfig("n_levels must be positive"));
        }
        if self.patch_size < 7 {
            return Err(IconMatchError::InvalidConfig("patch_size must be at least 7"));
        }
        Ok(())
    }

    fn half_patch(&self) -> u32 {
        self.patch_size / 2
    }

    fn border(&self) -> u32 {
        self.edge_threshold.max(self.half_patch())
    }

    /// Keypoint budget per level, geometric in `1 / scale_factor`; the last
    /// level takes the remainder.
    pub(crate) fn level_budgets(&self, levels: usize) -> Vec<usize> {
        if levels == 0 {
            return Vec::new();
        }
        let factor = 1.0 / f64::from(self.scale_factor);
        let mut desired = self.n_features as f64 * (1.0 - factor)
            / (1.0 - factor.powi(levels as i32));
        let mut budgets = Vec::with_capacity(levels);
        let mut assigned = 0usize;
        for _ in 0..levels - 1 {
            let n = desired.round() as usize;
            budgets.push(n);
            assigned += n;
            desired *= factor;
        }
        budgets.push(self.n_features.saturating_sub(assigned));
        budgets
    }
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    x: u32,
    y: u32,
    response: f32,
}

impl Ranked for Candidate {
    fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .response
            .total_cmp(&self.response)
            .then_with(|| self.y.cmp(&other.y))
            .then_with(|| self.x.cmp(&other.x))
    }
}

/// Fixed sampling pattern: 256 point pairs in the unit square, scaled to the
/// patch radius at use.
fn pattern() -> &'static [[f32; 4]] {
    static PATTERN: OnceLock<Vec<[f32; 4]>> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let mut rng = StdRng::seed_from_u64(PATTERN_SEED);
        (0..DESCRIPTOR_BYTES * 8)
            .map(|_| {
                [
                    rng.random_range(-1.0f32..=1.0),
                    rng.random_range(-1.0f32..=1.0),
                    rng.random_range(-1.0f32..=1.0),
                    rng.random_range(-1.0f32..=1.0),
                ]
            })
            .collect()
    })
}

/// ORB-class keypoint detector and descriptor extractor.
#[derive(Clone, Debug, Default)]
pub struct OrbExtractor {
    params: DetectorParams,
}

impl OrbExtractor {
    pub fn new(params: DetectorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    /// Detects and describes keypoints. Zero keypoints is a valid outcome.
    pub fn extract(&self, gray: &GrayImage) -> IconMatchResult<FeatureSet> {
        self.params.validate()?;
        let shape = gray.dimensions();
        let _span = trace_span!("orb_extract", width = shape.0, height = shape.1).entered();

        let border = self.params.border();
        let pyramid = ScalePyramid::build(
            gray,
            self.params.scale_factor,
            self.params.n_levels,
            2 * border + 2,
        );
        let budgets = self.params.level_budgets(pyramid.len());

        let mut keypoints = Vec::new();
        let mut rows: Vec<[u8; DESCRIPTOR_BYTES]> = Vec::new();
        for (level, (img, scale)) in pyramid.iter().enumerate() {
            let budget = budgets.get(level).copied().unwrap_or(0);
            if budget == 0 {
                continue;
            }
            let selected = self.detect_level(img, border, budget);
            if selected.is_empty() {
                continue;
            }
            let smoothed = gaussian_blur_f32(img, DESCRIPTOR_BLUR_SIGMA);
            for cand in selected {
                let half = self.params.half_patch();
                let angle = intensity_centroid_angle(img, cand.x, cand.y, half);
                rows.push(describe(&smoothed, cand.x, cand.y, angle, half));
                keypoints.push(KeyPoint {
                    x: cand.x as f32 * scale,
                    y: cand.y as f32 * scale,
                    size: self.params.patch_size as f32 * scale,
                    angle,
                    response: cand.response,
                    octave: level as i32,
                    class_id: -1,
                });
            }
        }

        trace_event!("orb_extracted", keypoints = keypoints.len());
        FeatureSet::new(keypoints, Descriptors::from_rows(&rows), shape)
    }

    fn detect_level(&self, img: &GrayImage, border: u32, budget: usize) -> Vec<Candidate> {
        let (w, h) = img.dimensions();
        let corners = corners_fast9(img, self.params.fast_threshold);
        if corners.is_empty() {
            return Vec::new();
        }
        let mut grid = vec![0.0f32; (w * h) as usize];
        for corner in &corners {
            grid[(corner.y * w + corner.x) as usize] = corner.score.max(f32::MIN_POSITIVE);
        }

        let mut topk = TopK::new(budget);
        for (x, y, _) in nms_3x3(&grid, w as usize, h as usize, border as usize) {
            let (x, y) = (x as u32, y as u32);
            topk.push(Candidate {
                x,
                y,
                response: harris_response(img, x, y),
            });
        }
        topk.into_sorted_desc()
    }
}

/// Harris corner measure over a `HARRIS_BLOCK` window of Sobel gradients.
pub(crate) fn harris_response(img: &GrayImage, x: u32, y: u32) -> f32 {
    let (w, h) = img.dimensions();
    let at = |px: i32, py: i32| -> f32 {
        let px = px.clamp(0, w as i32 - 1) as u32;
        let py = py.clamp(0, h as i32 - 1) as u32;
        img.get_pixel(px, py).0[0] as f32
    };
    let half = HARRIS_BLOCK / 2;
    let scale = 1.0 / (4.0 * HARRIS_BLOCK as f32 * 255.0);
    let (mut a, mut b, mut c) = (0.0f32, 0.0f32, 0.0f32);
    for dy in -half..=half {
        for dx in -half..=half {
            let (cx, cy) = (x as i32 + dx, y as i32 + dy);
            let gx = (at(cx + 1, cy - 1) + 2.0 * at(cx + 1, cy) + at(cx + 1, cy + 1)
                - at(cx - 1, cy - 1)
                - 2.0 * at(cx - 1, cy)
                - at(cx - 1, cy + 1))
                * scale;
            let gy = (at(cx - 1, cy + 1) + 2.0 * at(cx, cy + 1) + at(cx + 1, cy + 1)
                - at(cx - 1, cy - 1)
                - 2.0 * at(cx, cy - 1)
                - at(cx + 1, cy - 1))
                * scale;
            a += gx * gx;
            b += gy * gy;
            c += gx * gy;
        }
    }
    a * b - c * c - HARRIS_K * (a + b) * (a + b)
}

/// Orientation of the intensity centroid within a disc of `radius`, in
/// degrees [0, 360).
pub(crate) fn intensity_centroid_angle(img: &GrayImage, x: u32, y: u32, radius: u32) -> f32 {
    let (w, h) = img.dimensions();
    let r = radius as i32;
    let (mut m01, mut m10) = (0.0f32, 0.0f32);
    for dy in -r..=r {
        let py = y as i32 + dy;
        if py < 0 || py >= h as i32 {
            continue;
        }
        for dx in -r..=r {
            let px = x as i32 + dx;
            if px < 0 || px >= w as i32 || dx * dx + dy * dy > r * r {
                continue;
            }
            let v = img.get_pixel(px as u32, py as u32).0[0] as f32;
            m10 += dx as f32 * v;
            m01 += dy as f32 * v;
        }
    }
    wrap_deg_positive(m01.atan2(m10).to_degrees())
}

fn describe(
    smoothed: &GrayImage,
    x: u32,
    y: u32,
    angle_deg: f32,
    half_patch: u32,
) -> [u8; DESCRIPTOR_BYTES] {
    let (w, h) = smoothed.dimensions();
    let radius = half_patch.saturating_sub(2).max(1) as f32;
    let (sin, cos) = sin_cos_deg(angle_deg);
    let sample = |u: f32, v: f32| -> u8 {
        let (u, v) = (u * radius, v * radius);
        let px = (x as f32 + u * cos - v * sin).round().clamp(0.0, (w - 1) as f32) as u32;
        let py = (y as f32 + u * sin + v * cos).round().clamp(0.0, (h - 1) as f32) as u32;
        smoothed.get_pixel(px, py).0[0]
    };

    let mut desc = [0u8; DESCRIPTOR_BYTES];
    for (i, p) in pattern().iter().enumerate() {
        if sample(p[0], p[1]) < sample(p[2], p[3]) {
            desc[i / 8] |= 1 << (i % 8);
        }
    }
    desc
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::image::Luma;

    #[test]
    fn budgets_sum_to_request() {
        let params = DetectorParams::default();
        let budgets = params.level_budgets(8);
        assert_eq!(budgets.iter().sum::<usize>(), 1000);
        assert!(budgets.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn flat_image_has_no_keypoints() {
        let img = GrayImage::from_pixel(116, 116, Luma([255]));
        let set = OrbExtractor::default().extract(&img).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.descriptors().rows(), 0);
        assert_eq!(set.image_shape(), (116, 116));
    }

    #[test]
    fn centroid_points_toward_bright_side() {
        let img = GrayImage::from_fn(41, 41, |x, _| Luma([if x > 20 { 255 } else { 0 }]));
        let angle = intensity_centroid_angle(&img, 20, 20, 15);
        assert!(angle < 1.0 || angle > 359.0, "angle {angle}");
    }

    #[test]
    fn pattern_is_stable() {
        assert_eq!(pattern().len(), 256);
        assert_eq!(pattern()[0], pattern()[0]);
        assert!(pattern().iter().flatten().all(|v| (-1.0..=1.0).contains(v)));
    }
}
