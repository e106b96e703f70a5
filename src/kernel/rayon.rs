//! Rayon-parallel correlation scan (feature-gated).
//!
//! Parallelizes over placement rows; each worker scores every x position of
//! its rows with the default kernel and the results merge into one Top-K.

use crate::candidate::topk::{Peak, TopK};
use crate::kernel::{placement_range, ScanParams};
use crate::template::CorrPlan;
use crate::util::IconMatchResult;
use crate::ImageView;
use rayon::prelude::*;

#[cfg(feature = "simd")]
use crate::kernel::simd::CorrSimd as RowKernel;
#[cfg(not(feature = "simd"))]
use crate::kernel::scalar::CorrScalar as RowKernel;

/// Row-parallel full scan.
pub fn corr_scan_full_par(
    image: ImageView<'_, u8>,
    plan: &CorrPlan,
    params: ScanParams,
) -> IconMatchResult<Vec<Peak>> {
    let (max_x, max_y) = placement_range(image, plan)?;
    if params.topk == 0 {
        return Ok(Vec::new());
    }

    let row_results: Vec<Vec<Peak>> = (0..=max_y)
        .into_par_iter()
        .map(|y| {
            (0..=max_x)
                .filter_map(|x| {
                    let score = RowKernel::score_unchecked(image, plan, x, y);
                    (score >= params.min_score).then_some(Peak { x, y, score })
                })
                .collect()
        })
        .collect();

    let mut topk = TopK::new(params.topk);
    topk.extend(row_results.into_iter().flatten());
    Ok(topk.into_sorted_desc())
}
