//! Scalar reference kernel for normalized cross-correlation.

use crate::candidate::topk::{Peak, TopK};
use crate::kernel::{placement_range, Kernel, ScanParams};
use crate::template::plan::finish_score;
use crate::template::CorrPlan;
use crate::util::IconMatchResult;
use crate::ImageView;

/// Scalar NCC kernel (masked and unmasked plans alike).
pub struct CorrScalar;

impl CorrScalar {
    #[inline]
    pub(crate) fn score_unchecked(
        image: ImageView<'_, u8>,
        plan: &CorrPlan,
        x: usize,
        y: usize,
    ) -> f32 {
        let tpl_width = plan.width();
        let weighted = plan.weighted();
        let weights = plan.weights();

        let mut dot = 0.0f32;
        let mut energy_i = 0.0f32;
        for ty in 0..plan.height() {
            let Some(img_row) = image.row(y + ty) else {
                return f32::NEG_INFINITY;
            };
            let base = ty * tpl_width;
            let window = &img_row[x..x + tpl_width];
            for (tx, &pixel) in window.iter().enumerate() {
                let value = pixel as f32;
                dot += weighted[base + tx] * value;
                energy_i += weights[base + tx] * value * value;
            }
        }
        finish_score(dot, plan.energy_t(), energy_i)
    }
}

impl Kernel for CorrScalar {
    fn score_at(image: ImageView<'_, u8>, plan: &CorrPlan, x: usize, y: usize) -> f32 {
        match placement_range(image, plan) {
            Ok((max_x, max_y)) if x <= max_x && y <= max_y => {
                Self::score_unchecked(image, plan, x, y)
            }
            _ => f32::NEG_INFINITY,
        }
    }

    fn scan_full(
        image: ImageView<'_, u8>,
        plan: &CorrPlan,
        params: ScanParams,
    ) -> IconMatchResult<Vec<Peak>> {
        let (max_x, max_y) = placement_range(image, plan)?;
        if params.topk == 0 {
            return Ok(Vec::new());
        }

        let mut topk = TopK::new(params.topk);
        for y in 0..=max_y {
            for x in 0..=max_x {
                let score = Self::score_unchecked(image, plan, x, y);
                if score >= params.min_score {
                    topk.push(Peak { x, y, score });
                }
            }
        }
        Ok(topk.into_sorted_desc())
    }
}
