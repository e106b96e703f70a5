//! Correlation kernel implementations.

use crate::candidate::topk::Peak;
use crate::template::CorrPlan;
use crate::util::{IconMatchError, IconMatchResult};
use crate::ImageView;

/// Scan configuration for kernel evaluations.
#[derive(Clone, Copy, Debug)]
pub struct ScanParams {
    /// Maximum number of peaks to retain.
    pub topk: usize,
    /// Minimum score threshold (discard below this value).
    pub min_score: f32,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            topk: 1,
            min_score: f32::NEG_INFINITY,
        }
    }
}

/// Kernel trait for scoring and scan operations.
pub trait Kernel {
    /// Computes the score at a single placement (top-left coordinates).
    ///
    /// Out-of-range placements score `f32::NEG_INFINITY`.
    fn score_at(image: ImageView<'_, u8>, plan: &CorrPlan, x: usize, y: usize) -> f32;

    /// Scans the full valid placement range and returns top-K peaks.
    fn scan_full(
        image: ImageView<'_, u8>,
        plan: &CorrPlan,
        params: ScanParams,
    ) -> IconMatchResult<Vec<Peak>>;
}

/// Returns the last valid placement `(max_x, max_y)`.
pub(crate) fn placement_range(
    image: ImageView<'_, u8>,
    plan: &CorrPlan,
) -> IconMatchResult<(usize, usize)> {
    if image.width() < plan.width() || image.height() < plan.height() {
        return Err(IconMatchError::InvalidDimensions {
            width: plan.width(),
            height: plan.height(),
        });
    }
    Ok((image.width() - plan.width(), image.height() - plan.height()))
}

pub mod scalar;

#[cfg(feature = "simd")]
pub mod simd;

#[cfg(feature = "rayon")]
pub mod rayon;

/// Default kernel for the enabled feature set.
#[cfg(feature = "simd")]
pub type DefaultKernel = simd::CorrSimd;

/// Default kernel for the enabled feature set.
#[cfg(not(feature = "simd"))]
pub type DefaultKernel = scalar::CorrScalar;
