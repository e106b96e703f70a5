//! Configuration defaults, partial JSON and validation.

use iconmatch::recognize::MatchResult;
use iconmatch::{AlgorithmMode, CanonicalSize, IconMatchError, NormalizeMode, RecognitionConfig};

#[test]
fn partial_json_fills_defaults() {
    let config: RecognitionConfig = serde_json::from_str(
        r#"{ "mode": "template_color", "threshold": 90, "feature": { "ratio_threshold": 0.7 } }"#,
    )
    .unwrap();
    assert_eq!(config.mode, AlgorithmMode::TemplateColor);
    assert_eq!(config.threshold, 90.0);
    assert_eq!(config.feature.ratio_threshold, 0.7);
    assert_eq!(config.feature.min_match_count, 8);
    assert_eq!(config.canonical_size, CanonicalSize::square(116));
    assert_eq!(config.normalize_mode, NormalizeMode::Grayscale);
    assert_eq!(config.template.hist_bins, 32);
    assert!(config.cache.rebuild_if_stale);
    assert!(config.validate().is_ok());
}

#[test]
fn empty_json_is_the_default() {
    let config: RecognitionConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config, RecognitionConfig::default());
}

#[test]
fn json_round_trip() {
    let mut config = RecognitionConfig::default();
    config.mode = AlgorithmMode::Hash;
    config.hash_prefilter = Some(75.0);
    config.normalize.strip_background = true;
    let json = serde_json::to_string_pretty(&config).unwrap();
    let back: RecognitionConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
}

#[test]
fn validation_rejects_out_of_range_values() {
    let zero_size = RecognitionConfig {
        canonical_size: CanonicalSize::new(0, 116),
        ..RecognitionConfig::default()
    };
    assert!(matches!(
        zero_size.validate(),
        Err(IconMatchError::InvalidDimensions { width: 0, height: 116 })
    ));

    let bad_filter = RecognitionConfig {
        hash_prefilter: Some(-1.0),
        ..RecognitionConfig::default()
    };
    assert!(matches!(
        bad_filter.validate(),
        Err(IconMatchError::InvalidConfig(_))
    ));

    let mut bad_detector = RecognitionConfig::default();
    bad_detector.detector.scale_factor = 1.0;
    assert!(bad_detector.validate().is_err());
}

#[test]
fn match_result_serializes_only_measured_scores() {
    let json = r#"{
        "candidate_name": null,
        "base_id": "helm",
        "matched_by": "hash",
        "raw_scores": { "hash_distance": 3 },
        "confidence": 95.3125,
        "is_match": true
    }"#;
    let result: MatchResult = serde_json::from_str(json).unwrap();
    assert_eq!(result.raw_scores.hash_distance, Some(3));
    let value = serde_json::to_value(&result).unwrap();
    assert!(value["raw_scores"].get("inlier_count").is_none());
    assert!(value.get("error").is_none());
    assert_eq!(value["matched_by"], "hash");
}
