//! Recognition outcomes.

use serde::{Deserialize, Serialize};

use crate::recognize::AlgorithmMode;
use crate::util::{ErrorTag, IconMatchError};

/// Algorithm-native measurements behind a confidence value. Only the fields
/// the producing algorithm measures are set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawScores {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_distance: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub histogram_distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub good_matches: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inlier_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_keypoints: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_keypoints: Option<usize>,
}

/// Outcome of comparing one target against one base image.
///
/// "No match" is `is_match == false`, never an error. Failed batch entries
/// carry `error` and zero confidence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Display name of the target, when it came from a named source.
    pub candidate_name: Option<String>,
    pub base_id: String,
    /// Algorithm that produced the scores (a cached-feature request that
    /// fell back to extraction reports `Feature`).
    pub matched_by: AlgorithmMode,
    pub raw_scores: RawScores,
    /// Unified confidence in [0, 100].
    pub confidence: f64,
    pub is_match: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl MatchResult {
    pub(crate) fn scored(
        base_id: String,
        matched_by: AlgorithmMode,
        raw_scores: RawScores,
        confidence: f64,
        is_match: bool,
    ) -> Self {
        Self {
            candidate_name: None,
            base_id,
            matched_by,
            raw_scores,
            confidence: confidence.clamp(0.0, 100.0),
            is_match,
            error: None,
            error_message: None,
        }
    }

    /// Zero-confidence placeholder for a target that could not be processed.
    pub fn failed(base_id: String, matched_by: AlgorithmMode, err: &IconMatchError) -> Self {
        Self {
            candidate_name: None,
            base_id,
            matched_by,
            raw_scores: RawScores::default(),
            confidence: 0.0,
            is_match: false,
            error: Some(err.tag()),
            error_message: Some(err.to_string()),
        }
    }

    pub fn with_candidate_name(mut self, name: Option<String>) -> Self {
        self.candidate_name = name;
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
