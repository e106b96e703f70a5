//! Algorithm selection, cache-or-extract logic and thresholding.
//!
//! A [`Recognizer`] is configured once and then compares targets against
//! base images named by id (through a [`BaseLibrary`] or a [`FeatureCache`])
//! or by path. Every algorithm reports a confidence in [0, 100]; the match
//! decision is `confidence >= threshold`, and the feature modes additionally
//! require a geometrically consistent homography.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use ::image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::cache::{BaseLibrary, CacheParams, FeatureCache};
use crate::feature::{DetectorParams, FeatureMatchConfig, FeatureMatcher, FeatureSet};
use crate::hash::{self, DHash};
use crate::image::io::load_image;
use crate::image::{CanonicalSize, ImageNormalizer, NormalizeConfig, NormalizeMode, NormalizedImage};
use crate::template::{TemplateColorConfig, TemplateColorMatcher};
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::{IconMatchError, IconMatchResult};

pub mod batch;
pub mod result;

pub use batch::Target;
pub use result::{MatchResult, RawScores};

/// Confidence a result needs to count as a match unless overridden.
pub const DEFAULT_THRESHOLD: f64 = 80.0;

/// Recognition algorithm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmMode {
    /// Difference-hash similarity.
    Hash,
    /// Correlation template match blended with a color histogram distance.
    TemplateColor,
    /// Keypoint matching with on-demand base extraction.
    Feature,
    /// Keypoint matching against precomputed base features, extracting on
    /// demand when the cache cannot serve a base.
    #[default]
    CachedFeature,
}

impl AlgorithmMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hash => "hash",
            Self::TemplateColor => "template_color",
            Self::Feature => "feature",
            Self::CachedFeature => "cached_feature",
        }
    }

    pub fn uses_features(self) -> bool {
        matches!(self, Self::Feature | Self::CachedFeature)
    }
}

/// Where callers keep the feature cache file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub path: Option<PathBuf>,
    /// Rebuild a missing, stale or out-of-date cache instead of falling
    /// back to extraction.
    pub rebuild_if_stale: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            rebuild_if_stale: true,
        }
    }
}

/// Every tunable of a recognition run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub mode: AlgorithmMode,
    /// Default match threshold in [0, 100].
    pub threshold: f64,
    pub canonical_size: CanonicalSize,
    /// Normalization used for feature extraction.
    pub normalize_mode: NormalizeMode,
    pub normalize: NormalizeConfig,
    pub template: TemplateColorConfig,
    pub feature: FeatureMatchConfig,
    pub detector: DetectorParams,
    pub cache: CacheConfig,
    /// Minimum hash similarity a base needs before [`Recognizer::identify`]
    /// runs the configured algorithm on it; `None` disables the filter.
    pub hash_prefilter: Option<f64>,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            mode: AlgorithmMode::default(),
            threshold: DEFAULT_THRESHOLD,
            canonical_size: CanonicalSize::default(),
            normalize_mode: NormalizeMode::default(),
            normalize: NormalizeConfig::default(),
            template: TemplateColorConfig::default(),
            feature: FeatureMatchConfig::default(),
            detector: DetectorParams::default(),
            cache: CacheConfig::default(),
            hash_prefilter: None,
        }
    }
}

impl RecognitionConfig {
    pub fn validate(&self) -> IconMatchResult<()> {
        check_threshold(self.threshold)?;
        if let Some(floor) = self.hash_prefilter {
            if !(0.0..=100.0).contains(&floor) {
                return Err(IconMatchError::InvalidConfig(
                    "hash_prefilter must lie in [0, 100]",
                ));
            }
        }
        self.canonical_size.validate()?;
        self.template.validate()?;
        self.feature.validate()?;
        self.detector.validate()
    }

    /// Parameters a feature cache must have been built with to be usable
    /// under this configuration.
    pub fn cache_params(&self) -> CacheParams {
        CacheParams {
            canonical_size: self.canonical_size,
            normalize_mode: self.normalize_mode,
            normalize: self.normalize.clone(),
            detector: self.detector.clone(),
        }
    }
}

fn check_threshold(threshold: f64) -> IconMatchResult<f64> {
    if (0.0..=100.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(IconMatchError::InvalidConfig("threshold must lie in [0, 100]"))
    }
}

/// Names a base image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BaseRef<'b> {
    /// Id in the attached library or cache.
    Id(&'b str),
    /// Image file on disk, never served from the cache.
    Path(&'b Path),
}

impl BaseRef<'_> {
    /// Id reported in results: the id itself, or the file stem of a path.
    pub fn label(&self) -> String {
        match self {
            Self::Id(id) => (*id).to_owned(),
            Self::Path(path) => path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        }
    }
}

impl<'b> From<&'b str> for BaseRef<'b> {
    fn from(id: &'b str) -> Self {
        Self::Id(id)
    }
}

impl<'b> From<&'b Path> for BaseRef<'b> {
    fn from(path: &'b Path) -> Self {
        Self::Path(path)
    }
}

/// Target side, computed once per target.
enum PreparedTarget {
    Hash(DHash),
    TemplateColor(NormalizedImage),
    Feature(FeatureSet),
}

/// Base side, computed once per base.
enum PreparedBase<'a> {
    Hash(DHash),
    TemplateColor(NormalizedImage),
    Feature {
        features: Cow<'a, FeatureSet>,
        from_cache: bool,
    },
}

/// Recognition engine bound to an optional library and an optional cache.
#[derive(Clone, Debug)]
pub struct Recognizer<'a> {
    config: RecognitionConfig,
    library: Option<&'a BaseLibrary>,
    cache: Option<&'a FeatureCache>,
    cache_usable: bool,
    normalizer: ImageNormalizer,
    template: TemplateColorMatcher,
    features: FeatureMatcher,
}

impl<'a> Recognizer<'a> {
    pub fn new(config: RecognitionConfig) -> IconMatchResult<Self> {
        config.validate()?;
        Ok(Self {
            normalizer: ImageNormalizer::new(config.normalize.clone()),
            template: TemplateColorMatcher::new(config.template.clone()),
            features: FeatureMatcher::new(config.detector.clone(), config.feature.clone()),
            library: None,
            cache: None,
            cache_usable: false,
            config,
        })
    }

    pub fn with_library(mut self, library: &'a BaseLibrary) -> Self {
        self.library = Some(library);
        self
    }

    /// Attaches a cache. A cache built under other parameters stays attached
    /// (its ids remain candidates for [`Recognizer::identify`]) but its
    /// features are never used.
    pub fn with_cache(mut self, cache: &'a FeatureCache) -> Self {
        self.cache_usable = cache.is_valid(&self.config.cache_params());
        if !self.cache_usable {
            trace_warn!("cache_ignored", reason = "stale", entries = cache.len());
        }
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &RecognitionConfig {
        &self.config
    }

    /// True when cached features will be served in `CachedFeature` mode.
    pub fn cache_in_use(&self) -> bool {
        self.cache_usable
    }

    /// Compares `target` with `base` at the configured threshold.
    pub fn recognize(&self, base: BaseRef<'_>, target: &DynamicImage) -> IconMatchResult<MatchResult> {
        self.recognize_with_threshold(base, target, self.config.threshold)
    }

    /// Compares `target` with `base`, deciding the match at `threshold`.
    pub fn recognize_with_threshold(
        &self,
        base: BaseRef<'_>,
        target: &DynamicImage,
        threshold: f64,
    ) -> IconMatchResult<MatchResult> {
        let threshold = check_threshold(threshold)?;
        let base_id = base.label();
        let _span = trace_span!(
            "recognize",
            base = base_id.as_str(),
            mode = self.config.mode.as_str()
        )
        .entered();
        let prepared_base = self.prepare_base(base)?;
        let prepared_target = self.prepare_target(target)?;
        self.compare(base_id, &prepared_base, &prepared_target, threshold)
    }

    /// Runs the configured algorithm against every known base id and
    /// returns the best result: matches rank above non-matches, then by
    /// confidence, ties going to the lower id.
    ///
    /// Candidates come from the library, or from the cache when no library
    /// is attached. Bases that fail to load are skipped. `None` when no base
    /// could be compared.
    pub fn identify(&self, target: &DynamicImage) -> IconMatchResult<Option<MatchResult>> {
        let ids: Vec<&str> = match (self.library, self.cache) {
            (Some(library), _) => library.ids().collect(),
            (None, Some(cache)) => cache.ids(),
            (None, None) => Vec::new(),
        };
        let _span = trace_span!("identify", candidates = ids.len()).entered();
        let prepared_target = self.prepare_target(target)?;
        let target_hash = match self.config.hash_prefilter {
            Some(floor) => Some((floor, self.normalized_hash(target)?)),
            None => None,
        };

        let mut best: Option<MatchResult> = None;
        let mut filtered = 0usize;
        for id in ids {
            if let (Some((floor, target_hash)), Some(library)) = (target_hash, self.library) {
                match library.load(id).and_then(|base| self.normalized_hash(&base)) {
                    Ok(base_hash) => {
                        if hash::similarity(base_hash, target_hash) < floor {
                            filtered += 1;
                            continue;
                        }
                    }
                    Err(err) => {
                        trace_warn!("identify_skip", id = id, reason = err.to_string().as_str());
                        continue;
                    }
                }
            }

            let scored = self
                .prepare_base(BaseRef::Id(id))
                .and_then(|base| self.compare(id.to_owned(), &base, &prepared_target, self.config.threshold));
            match scored {
                Ok(result) => {
                    let better = best.as_ref().map_or(true, |b| {
                        (result.is_match, result.confidence) > (b.is_match, b.confidence)
                    });
                    if better {
                        best = Some(result);
                    }
                }
                Err(err) => {
                    trace_warn!("identify_skip", id = id, reason = err.to_string().as_str());
                }
            }
        }
        trace_event!(
            "identified",
            filtered = filtered,
            confidence = best.as_ref().map_or(0.0, |b| b.confidence)
        );
        Ok(best)
    }

    fn load_base(&self, base: BaseRef<'_>) -> IconMatchResult<DynamicImage> {
        match base {
            BaseRef::Id(id) => match self.library {
                Some(library) => library.load(id),
                None => Err(IconMatchError::UnknownBaseImage { id: id.to_owned() }),
            },
            BaseRef::Path(path) => load_image(path),
        }
    }

    fn normalize(&self, image: &DynamicImage, mode: NormalizeMode) -> IconMatchResult<NormalizedImage> {
        self.normalizer
            .normalize(image, self.config.canonical_size, mode)
    }

    fn cached_features(&self, base: BaseRef<'_>) -> Option<&'a FeatureSet> {
        if !self.cache_usable {
            return None;
        }
        match base {
            BaseRef::Id(id) => self.cache?.get(id).map(|entry| &entry.features),
            BaseRef::Path(_) => None,
        }
    }

    /// dHash of the canonical grayscale plane, shared by Hash mode and the
    /// identify prefilter.
    fn normalized_hash(&self, image: &DynamicImage) -> IconMatchResult<DHash> {
        let normalized = self.normalize(image, NormalizeMode::Grayscale)?;
        Ok(DHash::from_gray(normalized.gray()))
    }

    fn prepare_base(&self, base: BaseRef<'_>) -> IconMatchResult<PreparedBase<'a>> {
        match self.config.mode {
            AlgorithmMode::Hash => {
                let image = self.load_base(base)?;
                Ok(PreparedBase::Hash(self.normalized_hash(&image)?))
            }
            AlgorithmMode::TemplateColor => {
                let image = self.load_base(base)?;
                Ok(PreparedBase::TemplateColor(
                    self.normalize(&image, NormalizeMode::Color)?,
                ))
            }
            AlgorithmMode::Feature => self.extract_base(base),
            AlgorithmMode::CachedFeature => match self.cached_features(base) {
                Some(features) => Ok(PreparedBase::Feature {
                    features: Cow::Borrowed(features),
                    from_cache: true,
                }),
                None => {
                    trace_event!("cache_miss", base = base.label().as_str());
                    self.extract_base(base)
                }
            },
        }
    }

    fn extract_base(&self, base: BaseRef<'_>) -> IconMatchResult<PreparedBase<'a>> {
        let image = self.load_base(base)?;
        let normalized = self.normalize(&image, self.config.normalize_mode)?;
        Ok(PreparedBase::Feature {
            features: Cow::Owned(self.features.extract(normalized.gray())?),
            from_cache: false,
        })
    }

    fn prepare_target(&self, target: &DynamicImage) -> IconMatchResult<PreparedTarget> {
        match self.config.mode {
            AlgorithmMode::Hash => Ok(PreparedTarget::Hash(self.normalized_hash(target)?)),
            AlgorithmMode::TemplateColor => Ok(PreparedTarget::TemplateColor(
                self.normalize(target, NormalizeMode::Color)?,
            )),
            AlgorithmMode::Feature | AlgorithmMode::CachedFeature => {
                let normalized = self.normalize(target, self.config.normalize_mode)?;
                Ok(PreparedTarget::Feature(self.features.extract(normalized.gray())?))
            }
        }
    }

    fn compare(
        &self,
        base_id: String,
        base: &PreparedBase<'_>,
        target: &PreparedTarget,
        threshold: f64,
    ) -> IconMatchResult<MatchResult> {
        let result = match (base, target) {
            (PreparedBase::Hash(base), PreparedTarget::Hash(target)) => {
                let confidence = hash::similarity(*base, *target);
                MatchResult::scored(
                    base_id,
                    AlgorithmMode::Hash,
                    RawScores {
                        hash_distance: Some(hash::distance(*base, *target)),
                        ..RawScores::default()
                    },
                    confidence,
                    confidence >= threshold,
                )
            }
            (PreparedBase::TemplateColor(base), PreparedTarget::TemplateColor(target)) => {
                let score = self.template.compare(base, target)?;
                let confidence = score.composite * 100.0;
                MatchResult::scored(
                    base_id,
                    AlgorithmMode::TemplateColor,
                    RawScores {
                        template_score: Some(score.template.score),
                        histogram_distance: Some(score.color_distance),
                        ..RawScores::default()
                    },
                    confidence,
                    confidence >= threshold,
                )
            }
            (
                PreparedBase::Feature {
                    features,
                    from_cache,
                },
                PreparedTarget::Feature(target),
            ) => {
                let outcome = self.features.match_features(features, target);
                let matched_by = if *from_cache {
                    AlgorithmMode::CachedFeature
                } else {
                    AlgorithmMode::Feature
                };
                MatchResult::scored(
                    base_id,
                    matched_by,
                    RawScores {
                        good_matches: Some(outcome.good_matches),
                        inlier_count: Some(outcome.inliers),
                        target_keypoints: Some(outcome.target_keypoints),
                        base_keypoints: Some(outcome.base_keypoints),
                        ..RawScores::default()
                    },
                    outcome.confidence,
                    outcome.is_valid_match() && outcome.confidence >= threshold,
                )
            }
            _ => {
                return Err(IconMatchError::InvalidConfig(
                    "base and target prepared for different algorithms",
                ))
            }
        };
        trace_event!(
            "recognized",
            base = result.base_id.as_str(),
            confidence = result.confidence,
            is_match = result.is_match
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_ref_labels() {
        assert_eq!(BaseRef::Id("sword_01").label(), "sword_01");
        assert_eq!(BaseRef::Path(Path::new("/icons/shield_02.png")).label(), "shield_02");
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let config = RecognitionConfig {
            threshold: 120.0,
            ..RecognitionConfig::default()
        };
        assert!(matches!(
            Recognizer::new(config),
            Err(IconMatchError::InvalidConfig(_))
        ));
        assert!(check_threshold(f64::NAN).is_err());
        assert_eq!(check_threshold(0.0), Ok(0.0));
    }

    #[test]
    fn unknown_id_without_library() {
        let recognizer = Recognizer::new(RecognitionConfig {
            mode: AlgorithmMode::Hash,
            ..RecognitionConfig::default()
        })
        .unwrap();
        let target = DynamicImage::new_rgb8(16, 16);
        let err = recognizer
            .recognize(BaseRef::Id("missing"), &target)
            .unwrap_err();
        assert_eq!(
            err,
            IconMatchError::UnknownBaseImage {
                id: "missing".to_owned()
            }
        );
    }

    #[test]
    fn cache_params_follow_config() {
        let config = RecognitionConfig {
            canonical_size: CanonicalSize::square(64),
            normalize_mode: NormalizeMode::EdgeEnhanced,
            ..RecognitionConfig::default()
        };
        let params = config.cache_params();
        assert_eq!(params.canonical_size, CanonicalSize::square(64));
        assert_eq!(params.normalize_mode, NormalizeMode::EdgeEnhanced);
    }
}
