//! Robust homography estimation (RANSAC over a normalized DLT).

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;

const SAMPLE: usize = 4;
const COLLINEAR_EPS: f64 = 1e-6;

/// RANSAC settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RansacParams {
    /// Maximum reprojection error (pixels) for an inlier.
    pub reproj_threshold: f64,
    pub max_iters: usize,
    /// Desired probability of drawing at least one all-inlier sample.
    pub confidence: f64,
    pub seed: u64,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            reproj_threshold: 5.0,
            max_iters: 2000,
            confidence: 0.995,
            seed: 0x5eed,
        }
    }
}

/// Accepted model with its inlier mask over the input correspondences.
#[derive(Clone, Debug, PartialEq)]
pub struct HomographyFit {
    pub matrix: Matrix3<f64>,
    pub inlier_mask: Vec<bool>,
    pub inliers: usize,
}

type Point = (f64, f64);

/// Maps `p` through `h`; `None` at the line at infinity.
pub fn project(h: &Matrix3<f64>, p: Point) -> Option<Point> {
    let v = h * Vector3::new(p.0, p.1, 1.0);
    if v.z.abs() < 1e-12 {
        return None;
    }
    Some((v.x / v.z, v.y / v.z))
}

/// Similarity transform moving the centroid to the origin with mean
/// distance `sqrt(2)`.
fn normalizer(points: &[Point]) -> Matrix3<f64> {
    let n = points.len() as f64;
    let (cx, cy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.0, sy + p.1));
    let (cx, cy) = (cx / n, cy / n);
    let mean_dist = points
        .iter()
        .map(|p| ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let s = if mean_dist > 1e-12 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

fn apply(t: &Matrix3<f64>, p: Point) -> Point {
    (t[(0, 0)] * p.0 + t[(0, 2)], t[(1, 1)] * p.1 + t[(1, 2)])
}

/// Least-squares DLT with `h33 = 1` on Hartley-normalized points.
/// Exact for four points in general position.
pub fn fit_dlt(src: &[Point], dst: &[Point]) -> Option<Matrix3<f64>> {
    if src.len() < SAMPLE || src.len() != dst.len() {
        return None;
    }
    let ts = normalizer(src);
    let td = normalizer(dst);

    let mut ata = SMatrix::<f64, 8, 8>::zeros();
    let mut atb = SVector::<f64, 8>::zeros();
    for (&s, &d) in src.iter().zip(dst.iter()) {
        let (x, y) = apply(&ts, s);
        let (u, v) = apply(&td, d);
        let rows = [
            (
                SVector::<f64, 8>::from_column_slice(&[x, y, 1.0, 0.0, 0.0, 0.0, -x * u, -y * u]),
                u,
            ),
            (
                SVector::<f64, 8>::from_column_slice(&[0.0, 0.0, 0.0, x, y, 1.0, -x * v, -y * v]),
                v,
            ),
        ];
        for (a, b) in rows {
            ata += a * a.transpose();
            atb += a * b;
        }
    }

    let h = ata.lu().solve(&atb)?;
    if h.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let hn = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
    let td_inv = td.try_inverse()?;
    let mut out = td_inv * hn * ts;
    let z = out[(2, 2)];
    if z.abs() > 1e-12 {
        out /= z;
    }
    Some(out)
}

fn collinear(a: Point, b: Point, c: Point) -> bool {
    let cross = (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0);
    cross.abs() < COLLINEAR_EPS
}

fn degenerate(points: &[Point; SAMPLE]) -> bool {
    let [a, b, c, d] = *points;
    collinear(a, b, c) || collinear(a, b, d) || collinear(a, c, d) || collinear(b, c, d)
}

fn score(h: &Matrix3<f64>, src: &[Point], dst: &[Point], threshold: f64) -> (Vec<bool>, usize) {
    let thr2 = threshold * threshold;
    let mask: Vec<bool> = src
        .iter()
        .zip(dst.iter())
        .map(|(&s, &d)| {
            project(h, s).is_some_and(|p| (p.0 - d.0).powi(2) + (p.1 - d.1).powi(2) <= thr2)
        })
        .collect();
    let count = mask.iter().filter(|&&m| m).count();
    (mask, count)
}

fn required_iters(inlier_ratio: f64, confidence: f64, cap: usize) -> usize {
    let good = inlier_ratio.powi(SAMPLE as i32);
    if good <= f64::EPSILON {
        return cap;
    }
    if good >= 1.0 - f64::EPSILON {
        return 1;
    }
    let n = (1.0 - confidence).ln() / (1.0 - good).ln();
    if n.is_finite() {
        (n.ceil() as usize).clamp(1, cap)
    } else {
        cap
    }
}

/// Estimates `dst ~ H * src` robustly. `None` with fewer than four
/// correspondences or when no non-degenerate sample yields a model.
pub fn find_homography(src: &[Point], dst: &[Point], params: &RansacParams) -> Option<HomographyFit> {
    let n = src.len();
    if n < SAMPLE || n != dst.len() {
        return None;
    }
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut best: Option<(Matrix3<f64>, Vec<bool>, usize)> = None;
    let mut iters = params.max_iters.max(1);
    let mut i = 0;

    while i < iters {
        i += 1;
        let idx = rand::seq::index::sample(&mut rng, n, SAMPLE);
        let s = [src[idx.index(0)], src[idx.index(1)], src[idx.index(2)], src[idx.index(3)]];
        let d = [dst[idx.index(0)], dst[idx.index(1)], dst[idx.index(2)], dst[idx.index(3)]];
        if degenerate(&s) || degenerate(&d) {
            continue;
        }
        let Some(h) = fit_dlt(&s, &d) else {
            continue;
        };
        let (mask, count) = score(&h, src, dst, params.reproj_threshold);
        if best.as_ref().map_or(true, |(_, _, c)| count > *c) {
            iters = iters.min(required_iters(
                count as f64 / n as f64,
                params.confidence,
                params.max_iters.max(1),
            ));
            best = Some((h, mask, count));
        }
    }

    let (mut matrix, mut mask, mut count) = best?;
    if count >= SAMPLE {
        let (in_src, in_dst): (Vec<Point>, Vec<Point>) = src
            .iter()
            .zip(dst.iter())
            .zip(mask.iter())
            .filter(|(_, &m)| m)
            .map(|((&s, &d), _)| (s, d))
            .unzip();
        if let Some(refined) = fit_dlt(&in_src, &in_dst) {
            let (rmask, rcount) = score(&refined, src, dst, params.reproj_threshold);
            if rcount >= count {
                matrix = refined;
                mask = rmask;
                count = rcount;
            }
        }
    }

    Some(HomographyFit {
        matrix,
        inlier_mask: mask,
        inliers: count,
    })
}
