//! Template correlation plus color-histogram matching.
//!
//! [`TemplateColorMatcher`] scores a pair of canonical images two ways: a
//! normalized cross-correlation template scan over the luma planes and a
//! Bhattacharyya distance between L*a*b* histograms of the color planes.
//! The two are blended by [`composite_score`].

use ::image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::candidate::topk::Peak;
use crate::image::{resize_area_gray, resize_area_rgb, ImageView, NormalizedImage, BACKGROUND_COLOR};
use crate::kernel::ScanParams;
use crate::trace::{trace_event, trace_span};
use crate::util::{IconMatchError, IconMatchResult};

pub mod color;
pub mod mask;
pub(crate) mod plan;

pub use color::{rgb_to_lab, LabHistogram};
pub use plan::CorrPlan;

/// Relative weights of the template and color terms.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeWeights {
    pub template: f64,
    pub color: f64,
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self {
            template: 0.7,
            color: 0.3,
        }
    }
}

/// Tunables for [`TemplateColorMatcher`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateColorConfig {
    pub weights: CompositeWeights,
    /// Histogram bins per L*a*b* channel.
    pub hist_bins: usize,
    /// Restrict the correlation and the template color histogram to
    /// template foreground pixels.
    pub use_mask: bool,
    /// Background color for color-derived masks.
    pub mask_background: [u8; 3],
    /// Per-channel difference above which a pixel counts as foreground.
    pub mask_tolerance: u8,
    /// Luma above which a pixel counts as foreground when no color plane
    /// is available.
    pub gray_mask_threshold: u8,
}

impl Default for TemplateColorConfig {
    fn default() -> Self {
        Self {
            weights: CompositeWeights::default(),
            hist_bins: 32,
            use_mask: false,
            mask_background: BACKGROUND_COLOR,
            mask_tolerance: 30,
            gray_mask_threshold: 200,
        }
    }
}

impl TemplateColorConfig {
    pub fn validate(&self) -> IconMatchResult<()> {
        let CompositeWeights { template, color } = self.weights;
        if !(template.is_finite() && color.is_finite()) || template < 0.0 || color < 0.0 {
            return Err(IconMatchError::InvalidConfig(
                "composite weights must be finite and non-negative",
            ));
        }
        if template + color <= 0.0 {
            return Err(IconMatchError::InvalidConfig("composite weights sum to zero"));
        }
        if self.hist_bins == 0 {
            return Err(IconMatchError::InvalidConfig("hist_bins must be positive"));
        }
        Ok(())
    }
}

/// Best template placement.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemplateMatch {
    /// Normalized cross-correlation in [0, 1].
    pub score: f64,
    /// Top-left x of the best placement in the target.
    pub x: usize,
    /// Top-left y of the best placement in the target.
    pub y: usize,
}

/// Full outcome of a template+color comparison.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemplateColorScore {
    pub template: TemplateMatch,
    pub color_distance: f64,
    /// Composite in [0, 1].
    pub composite: f64,
}

/// Weighted blend of `template_score` and `1 - color_distance`, normalized
/// by the weight sum and clamped to [0, 1].
pub fn composite_score(template_score: f64, color_distance: f64, weights: CompositeWeights) -> f64 {
    let total = weights.template + weights.color;
    if total.is_nan() || total <= 0.0 {
        return 0.0;
    }
    let color_similarity = 1.0 - color_distance.clamp(0.0, 1.0);
    let blended = weights.template * template_score.clamp(0.0, 1.0) + weights.color * color_similarity;
    (blended / total).clamp(0.0, 1.0)
}

/// Template correlation and color histogram matcher.
#[derive(Clone, Debug, Default)]
pub struct TemplateColorMatcher {
    config: TemplateColorConfig,
}

impl TemplateColorMatcher {
    pub fn new(config: TemplateColorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TemplateColorConfig {
        &self.config
    }

    /// Slides `template` over `target` and returns the best placement.
    ///
    /// A template larger than the target is first shrunk, aspect preserved,
    /// to fit inside it.
    pub fn match_template(
        &self,
        template: &NormalizedImage,
        target: &NormalizedImage,
    ) -> IconMatchResult<TemplateMatch> {
        let (tw, th) = template.size();
        let (iw, ih) = target.size();
        let (fw, fh) = fit_inside(tw, th, iw, ih);

        let tpl_gray = resize_area_gray(template.gray(), fw, fh);
        let mask = if self.config.use_mask {
            let color = template.color().map(|color| resize_area_rgb(color, fw, fh));
            Some(self.foreground_mask(&tpl_gray, color.as_ref()))
        } else {
            None
        };
        match_template_gray(&tpl_gray, target.gray(), mask.as_ref())
    }

    /// Template foreground: color distance from the mask background when a
    /// color plane exists, a luma threshold otherwise.
    fn foreground_mask(&self, gray: &GrayImage, color: Option<&RgbImage>) -> GrayImage {
        match color {
            Some(color) => mask::foreground_mask_rgb(
                color,
                self.config.mask_background,
                self.config.mask_tolerance,
            ),
            None => mask::foreground_mask_gray(gray, self.config.gray_mask_threshold),
        }
    }

    /// Mean Bhattacharyya distance between L*a*b* histograms, in [0, 1].
    pub fn color_distance(&self, a: &RgbImage, b: &RgbImage) -> f64 {
        let bins = self.config.hist_bins;
        LabHistogram::from_rgb(a, bins, None).distance(&LabHistogram::from_rgb(b, bins, None))
    }

    /// Runs both measures and blends them with the configured weights.
    ///
    /// Images normalized without a color plane are compared on their luma
    /// replicated to RGB.
    pub fn compare(
        &self,
        base: &NormalizedImage,
        target: &NormalizedImage,
    ) -> IconMatchResult<TemplateColorScore> {
        let _span = trace_span!("template_color_compare").entered();
        let template = self.match_template(base, target)?;

        let base_rgb = color_plane(base);
        let target_rgb = color_plane(target);
        // With masking on, only the template foreground feeds its histogram.
        // An all-background mask falls back to every pixel.
        let base_mask = if self.config.use_mask {
            Some(self.foreground_mask(base.gray(), base.color()))
                .filter(|m| m.as_raw().iter().any(|&v| v != 0))
        } else {
            None
        };
        let bins = self.config.hist_bins;
        let base_hist = LabHistogram::from_rgb(
            &base_rgb,
            bins,
            base_mask.as_ref().map(|m| m.as_raw().as_slice()),
        );
        let color_distance = base_hist.distance(&LabHistogram::from_rgb(&target_rgb, bins, None));
        let composite = composite_score(template.score, color_distance, self.config.weights);
        trace_event!(
            "template_color_scored",
            template = template.score,
            color_distance = color_distance,
            composite = composite
        );
        Ok(TemplateColorScore {
            template,
            color_distance,
            composite,
        })
    }
}

/// Scans a grayscale template (optionally masked, nonzero = foreground) over
/// a grayscale target of at least the template's size.
pub fn match_template_gray(
    template: &GrayImage,
    target: &GrayImage,
    mask: Option<&GrayImage>,
) -> IconMatchResult<TemplateMatch> {
    let tpl_view = ImageView::from_gray(template)?;
    let plan = match mask {
        Some(mask) => CorrPlan::from_view_masked(tpl_view, mask.as_raw())?,
        None => CorrPlan::from_view(tpl_view)?,
    };
    let image = ImageView::from_gray(target)?;
    let peaks = scan(image, &plan)?;
    let best = peaks.first().copied().unwrap_or(Peak {
        x: 0,
        y: 0,
        score: 0.0,
    });
    Ok(TemplateMatch {
        score: f64::from(best.score),
        x: best.x,
        y: best.y,
    })
}

#[cfg(feature = "rayon")]
fn scan(image: ImageView<'_, u8>, plan: &CorrPlan) -> IconMatchResult<Vec<Peak>> {
    crate::kernel::rayon::corr_scan_full_par(image, plan, ScanParams::default())
}

#[cfg(not(feature = "rayon"))]
fn scan(image: ImageView<'_, u8>, plan: &CorrPlan) -> IconMatchResult<Vec<Peak>> {
    use crate::kernel::{DefaultKernel, Kernel};
    DefaultKernel::scan_full(image, plan, ScanParams::default())
}

fn fit_inside(tw: u32, th: u32, iw: u32, ih: u32) -> (u32, u32) {
    if tw <= iw && th <= ih {
        return (tw, th);
    }
    let (tw, th, iw, ih) = (u64::from(tw), u64::from(th), u64::from(iw), u64::from(ih));
    // Width limits when iw/tw <= ih/th; the other side is rounded to nearest.
    let (w, h) = if iw * th <= ih * tw {
        (iw, (th * iw + tw / 2) / tw)
    } else {
        ((tw * ih + th / 2) / th, ih)
    };
    (w.clamp(1, iw) as u32, h.clamp(1, ih) as u32)
}

fn color_plane(img: &NormalizedImage) -> RgbImage {
    match img.color() {
        Some(color) => color.clone(),
        None => RgbImage::from_fn(img.gray().width(), img.gray().height(), |x, y| {
            let v = img.gray().get_pixel(x, y).0[0];
            ::image::Rgb([v, v, v])
        }),
    }
}
