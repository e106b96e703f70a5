//! SIMD-accelerated correlation kernel using the `wide` crate.
//!
//! The inner template row loop is vectorized to process 8 pixels at a time
//! using `f32x8`; the tail runs scalar.

use crate::candidate::topk::{Peak, TopK};
use crate::kernel::{placement_range, Kernel, ScanParams};
use crate::template::plan::finish_score;
use crate::template::CorrPlan;
use crate::util::IconMatchResult;
use crate::ImageView;
use wide::f32x8;

const LANES: usize = 8;

/// Load 8 u8 values and convert to f32x8.
#[inline]
fn load_u8x8_as_f32x8(slice: &[u8]) -> f32x8 {
    f32x8::from([
        slice[0] as f32,
        slice[1] as f32,
        slice[2] as f32,
        slice[3] as f32,
        slice[4] as f32,
        slice[5] as f32,
        slice[6] as f32,
        slice[7] as f32,
    ])
}

#[inline]
fn load_f32x8(slice: &[f32]) -> f32x8 {
    f32x8::from([
        slice[0], slice[1], slice[2], slice[3], slice[4], slice[5], slice[6], slice[7],
    ])
}

#[inline]
fn hsum(v: f32x8) -> f32 {
    v.to_array().iter().sum()
}

/// SIMD NCC kernel.
pub struct CorrSimd;

impl CorrSimd {
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
        let simd_end = tpl_width / LANES * LANES;

        let mut dot_vec = f32x8::ZERO;
        let mut energy_vec = f32x8::ZERO;
        let mut dot_s = 0.0f32;
        let mut energy_s = 0.0f32;

        for ty in 0..plan.height() {
            let Some(img_row) = image.row(y + ty) else {
                return f32::NEG_INFINITY;
            };
            let base = ty * tpl_width;

            let mut tx = 0;
            while tx < simd_end {
                let img_vals = load_u8x8_as_f32x8(&img_row[x + tx..]);
                let tpl_vals = load_f32x8(&weighted[base + tx..]);
                let w_vals = load_f32x8(&weights[base + tx..]);
                dot_vec += tpl_vals * img_vals;
                energy_vec += w_vals * img_vals * img_vals;
                tx += LANES;
            }

            while tx < tpl_width {
                let value = img_row[x + tx] as f32;
                dot_s += weighted[base + tx] * value;
                energy_s += weights[base + tx] * value * value;
                tx += 1;
            }
        }

        let dot = hsum(dot_vec) + dot_s;
        let energy_i = hsum(energy_vec) + energy_s;
        finish_score(dot, plan.energy_t(), energy_i)
    }
}

impl Kernel for CorrSimd {
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
