//! Keypoint feature matching.
//!
//! [`FeatureMatcher`] runs one recognition attempt as a fixed sequence:
//! extract (ORB-class keypoints and 256-bit descriptors), match (2-NN ratio
//! test with fallbacks), verify (RANSAC homography) and score. A side with
//! no keypoints short-circuits to a zero-confidence outcome; that is data,
//! not an error.

use ::image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::trace::{trace_event, trace_span};
use crate::util::math::clamp_unit;
use crate::util::{IconMatchError, IconMatchResult};

pub mod homography;
pub mod keypoint;
pub mod matching;
pub mod orb;

pub use homography::{find_homography, HomographyFit, RansacParams};
pub use keypoint::{Descriptors, FeatureSet, KeyPoint, DESCRIPTOR_BYTES};
pub use matching::{match_descriptors, DMatch, LadderParams, MatchStage};
pub use orb::{DetectorParams, OrbExtractor};

/// Relative weights of the confidence terms.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    /// Good matches over target keypoints.
    pub ratio: f64,
    /// Homography inliers over good matches.
    pub inliers: f64,
    /// Absolute good-match count, saturating at `count_saturation`.
    pub count: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            ratio: 0.4,
            inliers: 0.4,
            count: 0.2,
        }
    }
}

/// Matching, verification and scoring thresholds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureMatchConfig {
    pub ratio_threshold: f32,
    /// Retry ratio when too few matches survive; `None` disables.
    pub relaxed_ratio: Option<f32>,
    /// Cap on the mutual-best fallback; `None` disables.
    pub cross_check_limit: Option<usize>,
    /// Good matches needed before a homography is attempted.
    pub min_match_count: usize,
    /// Inliers needed for a geometrically consistent match.
    pub min_homography_inliers: usize,
    pub reproj_threshold: f64,
    pub ransac_max_iters: usize,
    pub ransac_confidence: f64,
    pub ransac_seed: u64,
    pub weights: ScoreWeights,
    pub count_saturation: usize,
}

impl Default for FeatureMatchConfig {
    fn default() -> Self {
        let min_match_count = 8;
        Self {
            ratio_threshold: 0.75,
            relaxed_ratio: Some(0.9),
            cross_check_limit: Some(50),
            min_match_count,
            min_homography_inliers: (min_match_count / 2).max(6),
            reproj_threshold: 5.0,
            ransac_max_iters: 2000,
            ransac_confidence: 0.995,
            ransac_seed: 0x5eed,
            weights: ScoreWeights::default(),
            count_saturation: 50,
        }
    }
}

impl FeatureMatchConfig {
    pub fn validate(&self) -> IconMatchResult<()> {
        let ratio_ok = |r: f32| r.is_finite() && r > 0.0 && r <= 1.0;
        if !ratio_ok(self.ratio_threshold) || !self.relaxed_ratio.map_or(true, ratio_ok) {
            return Err(IconMatchError::InvalidConfig("ratio thresholds must lie in (0, 1]"));
        }
        if self.min_match_count < 4 {
            return Err(IconMatchError::InvalidConfig(
                "min_match_count must be at least 4 for a homography",
            ));
        }
        if !(self.reproj_threshold.is_finite() && self.reproj_threshold > 0.0) {
            return Err(IconMatchError::InvalidConfig("reproj_threshold must be positive"));
        }
        if !(self.ransac_confidence > 0.0 && self.ransac_confidence < 1.0) {
            return Err(IconMatchError::InvalidConfig("ransac_confidence must lie in (0, 1)"));
        }
        let ScoreWeights {
            ratio,
            inliers,
            count,
        } = self.weights;
        if [ratio, inliers, count]
            .iter()
            .any(|w| !w.is_finite() || *w < 0.0)
            || ratio + inliers + count <= 0.0
        {
            return Err(IconMatchError::InvalidConfig(
                "score weights must be non-negative with a positive sum",
            ));
        }
        if self.count_saturation == 0 {
            return Err(IconMatchError::InvalidConfig("count_saturation must be positive"));
        }
        Ok(())
    }

    fn ladder(&self) -> LadderParams {
        LadderParams {
            ratio: self.ratio_threshold,
            relaxed_ratio: self.relaxed_ratio,
            cross_check_limit: self.cross_check_limit,
            min_matches: self.min_match_count,
        }
    }

    fn ransac(&self) -> RansacParams {
        RansacParams {
            reproj_threshold: self.reproj_threshold,
            max_iters: self.ransac_max_iters,
            confidence: self.ransac_confidence,
            seed: self.ransac_seed,
        }
    }
}

/// Result of one feature comparison.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatchOutcome {
    pub target_keypoints: usize,
    pub base_keypoints: usize,
    pub good_matches: usize,
    pub inliers: usize,
    pub stage: MatchStage,
    pub match_ratio: f64,
    /// Confidence in [0, 100].
    pub confidence: f64,
    /// Enough homography inliers were found.
    pub geometrically_consistent: bool,
}

impl FeatureMatchOutcome {
    /// Outcome when either side yielded no keypoints.
    pub fn no_features(target_keypoints: usize, base_keypoints: usize) -> Self {
        Self {
            target_keypoints,
            base_keypoints,
            good_matches: 0,
            inliers: 0,
            stage: MatchStage::Skipped,
            match_ratio: 0.0,
            confidence: 0.0,
            geometrically_consistent: false,
        }
    }

    pub fn is_valid_match(&self) -> bool {
        self.geometrically_consistent
    }
}

/// Weighted confidence in [0, 100]; non-decreasing in `match_ratio` and in
/// `inliers` for a fixed `good` count.
pub fn feature_confidence(
    match_ratio: f64,
    inliers: usize,
    good: usize,
    weights: ScoreWeights,
    count_saturation: usize,
) -> f64 {
    let total = weights.ratio + weights.inliers + weights.count;
    if total.is_nan() || total <= 0.0 {
        return 0.0;
    }
    let ratio_term = clamp_unit(match_ratio);
    let inlier_term = clamp_unit(inliers as f64 / good.max(1) as f64);
    let count_term = clamp_unit(good as f64 / count_saturation.max(1) as f64);
    let blended =
        weights.ratio * ratio_term + weights.inliers * inlier_term + weights.count * count_term;
    100.0 * clamp_unit(blended / total)
}

/// Extraction plus match/verify/score.
#[derive(Clone, Debug, Default)]
pub struct FeatureMatcher {
    extractor: OrbExtractor,
    config: FeatureMatchConfig,
}

impl FeatureMatcher {
    pub fn new(detector: DetectorParams, config: FeatureMatchConfig) -> Self {
        Self {
            extractor: OrbExtractor::new(detector),
            config,
        }
    }

    pub fn config(&self) -> &FeatureMatchConfig {
        &self.config
    }

    pub fn detector(&self) -> &DetectorParams {
        self.extractor.params()
    }

    /// Extracts keypoints and descriptors from a canonical luma plane.
    pub fn extract(&self, gray: &GrayImage) -> IconMatchResult<FeatureSet> {
        self.extractor.extract(gray)
    }

    /// Extracts both sides, then matches.
    pub fn compare(&self, base: &GrayImage, target: &GrayImage) -> IconMatchResult<FeatureMatchOutcome> {
        let base = self.extract(base)?;
        let target = self.extract(target)?;
        Ok(self.match_features(&base, &target))
    }

    /// Matches target descriptors against base descriptors, verifies with a
    /// homography and scores.
    pub fn match_features(&self, base: &FeatureSet, target: &FeatureSet) -> FeatureMatchOutcome {
        let _span = trace_span!(
            "feature_match",
            base_keypoints = base.len(),
            target_keypoints = target.len()
        )
        .entered();
        if base.is_empty() || target.is_empty() {
            return FeatureMatchOutcome::no_features(target.len(), base.len());
        }

        let (matches, stage) =
            match_descriptors(target.descriptors(), base.descriptors(), &self.config.ladder());
        let good = matches.len();

        let inliers = if good >= self.config.min_match_count {
            let (src, dst): (Vec<(f64, f64)>, Vec<(f64, f64)>) = matches
                .iter()
                .map(|m| {
                    let t = &target.keypoints()[m.query];
                    let b = &base.keypoints()[m.train];
                    ((f64::from(t.x), f64::from(t.y)), (f64::from(b.x), f64::from(b.y)))
                })
                .unzip();
            find_homography(&src, &dst, &self.config.ransac()).map_or(0, |fit| fit.inliers)
        } else {
            0
        };

        let match_ratio = good as f64 / target.len().max(1) as f64;
        let confidence = feature_confidence(
            match_ratio,
            inliers,
            good,
            self.config.weights,
            self.config.count_saturation,
        );
        let geometrically_consistent = inliers >= self.config.min_homography_inliers;
        trace_event!(
            "feature_scored",
            good_matches = good,
            inliers = inliers,
            confidence = confidence
        );

        FeatureMatchOutcome {
            target_keypoints: target.len(),
            base_keypoints: base.len(),
            good_matches: good,
            inliers,
            stage,
            match_ratio,
            confidence,
            geometrically_consistent,
        }
    }
}
