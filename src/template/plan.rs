//! Template plan precomputation for normalized cross-correlation.

use crate::image::ImageView;
use crate::util::{IconMatchError, IconMatchResult};

/// Precomputed weighted template buffer for normalized cross-correlation.
///
/// The score at a placement is `sum(w*T*I) / sqrt(sum(w*T^2) * sum(w*I^2))`
/// where `w` is 1 for foreground and 0 for masked-out pixels. Without a mask
/// every weight is 1.
#[derive(Clone, Debug)]
pub struct CorrPlan {
    width: usize,
    height: usize,
    weighted: Vec<f32>,
    weights: Vec<f32>,
    energy_t: f32,
    active: usize,
}

impl CorrPlan {
    /// Builds an unmasked plan from a template view.
    pub fn from_view(tpl: ImageView<'_, u8>) -> IconMatchResult<Self> {
        Self::build(tpl, None)
    }

    /// Builds a masked plan; nonzero mask bytes mark foreground pixels.
    ///
    /// An all-zero mask falls back to the unmasked plan.
    pub fn from_view_masked(tpl: ImageView<'_, u8>, mask: &[u8]) -> IconMatchResult<Self> {
        let count = tpl.width() * tpl.height();
        if mask.len() != count {
            return Err(IconMatchError::BufferTooSmall {
                needed: count,
                got: mask.len(),
            });
        }
        if mask.iter().all(|&m| m == 0) {
            return Self::build(tpl, None);
        }
        Self::build(tpl, Some(mask))
    }

    fn build(tpl: ImageView<'_, u8>, mask: Option<&[u8]>) -> IconMatchResult<Self> {
        let width = tpl.width();
        let height = tpl.height();
        let count = width
            .checked_mul(height)
            .ok_or(IconMatchError::InvalidDimensions { width, height })?;

        let mut weighted = Vec::with_capacity(count);
        let mut weights = Vec::with_capacity(count);
        let mut energy = 0.0f64;
        let mut active = 0usize;
        for y in 0..height {
            let row = tpl.row(y).ok_or(IconMatchError::BufferTooSmall {
                needed: (y + 1) * tpl.stride(),
                got: tpl.as_slice().len(),
            })?;
            for (x, &value) in row.iter().enumerate() {
                let on = mask.map_or(true, |m| m[y * width + x] != 0);
                let w = if on { 1.0f32 } else { 0.0 };
                let v = value as f32 * w;
                weighted.push(v);
                weights.push(w);
                energy += f64::from(v) * f64::from(v);
                active += usize::from(on);
            }
        }

        Ok(Self {
            width,
            height,
            weighted,
            weights,
            energy_t: energy as f32,
            active,
        })
    }

    /// Returns the template width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the template height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns `w*T` in row-major order.
    pub fn weighted(&self) -> &[f32] {
        &self.weighted
    }

    /// Returns the per-pixel weights in row-major order.
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Returns `sum(w*T^2)`.
    pub fn energy_t(&self) -> f32 {
        self.energy_t
    }

    /// Number of pixels that participate in the score.
    pub fn active_pixels(&self) -> usize {
        self.active
    }

    /// Returns true when a mask excluded at least one pixel.
    pub fn is_masked(&self) -> bool {
        self.active < self.width * self.height
    }
}

const ENERGY_EPS: f32 = 1e-6;

/// Final normalization shared by every kernel.
///
/// Two all-black windows are identical (1.0); one black against one
/// non-black window shares nothing (0.0).
#[inline]
pub(crate) fn finish_score(dot: f32, energy_t: f32, energy_i: f32) -> f32 {
    let t_flat = energy_t <= ENERGY_EPS;
    let i_flat = energy_i <= ENERGY_EPS;
    if t_flat && i_flat {
        return 1.0;
    }
    if t_flat || i_flat {
        return 0.0;
    }
    let score = dot / (energy_t * energy_i).sqrt();
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
