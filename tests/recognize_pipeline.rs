//! End-to-end recognition: algorithm modes, cache use, thresholds, batches.

use ::image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use iconmatch::recognize::DEFAULT_THRESHOLD;
use iconmatch::{
    AlgorithmMode, BaseLibrary, BaseRef, ErrorTag, FeatureCache, IconMatchError,
    RecognitionConfig, Recognizer, Target,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Cursor;

fn block_texture(seed: u64, size: u32, block: u32) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let cells = size.div_ceil(block);
    let values: Vec<u8> = (0..cells * cells).map(|_| rng.random_range(0..=255u8)).collect();
    GrayImage::from_fn(size, size, |x, y| {
        Luma([values[((y / block) * cells + x / block) as usize]])
    })
}

fn png(img: &DynamicImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn icon(seed: u64) -> DynamicImage {
    DynamicImage::ImageLuma8(block_texture(seed, 116, 6))
}

fn library() -> BaseLibrary {
    let mut lib = BaseLibrary::new();
    for (id, seed) in [("amulet", 11), ("boots", 22), ("crown", 33)] {
        lib.insert_bytes(id, png(&icon(seed)));
    }
    lib
}

fn config(mode: AlgorithmMode) -> RecognitionConfig {
    RecognitionConfig {
        mode,
        ..RecognitionConfig::default()
    }
}

#[test]
fn default_threshold_is_eighty() {
    assert_eq!(RecognitionConfig::default().threshold, 80.0);
    assert_eq!(DEFAULT_THRESHOLD, 80.0);
    assert_eq!(RecognitionConfig::default().mode, AlgorithmMode::CachedFeature);
}

#[test]
fn every_mode_accepts_the_base_itself() {
    let lib = library();
    let target = icon(22);
    for mode in [
        AlgorithmMode::Hash,
        AlgorithmMode::TemplateColor,
        AlgorithmMode::Feature,
        AlgorithmMode::CachedFeature,
    ] {
        let recognizer = Recognizer::new(config(mode)).unwrap().with_library(&lib);
        let result = recognizer.recognize(BaseRef::Id("boots"), &target).unwrap();
        assert!(result.is_match, "{mode:?}: {result:?}");
        assert!(result.confidence >= 80.0 && result.confidence <= 100.0);
        assert_eq!(result.base_id, "boots");
        assert!(result.error.is_none());
    }
}

#[test]
fn cached_mode_uses_valid_cache_and_reports_it() {
    let lib = library();
    let settings = config(AlgorithmMode::CachedFeature);
    let cache = FeatureCache::build(&lib, &settings.cache_params()).unwrap();
    let recognizer = Recognizer::new(settings).unwrap().with_cache(&cache);
    assert!(recognizer.cache_in_use());

    // No library attached: the base can only come from the cache.
    let result = recognizer.recognize(BaseRef::Id("crown"), &icon(33)).unwrap();
    assert_eq!(result.matched_by, AlgorithmMode::CachedFeature);
    assert!(result.is_match);
    assert!(result.raw_scores.inlier_count.unwrap_or(0) >= 6);
}

#[test]
fn stale_cache_falls_back_to_extraction() {
    let lib = library();
    let mut other = config(AlgorithmMode::CachedFeature);
    other.detector.n_features = 300;
    let stale = FeatureCache::build(&lib, &other.cache_params()).unwrap();

    let recognizer = Recognizer::new(config(AlgorithmMode::CachedFeature))
        .unwrap()
        .with_library(&lib)
        .with_cache(&stale);
    assert!(!recognizer.cache_in_use());
    let result = recognizer.recognize(BaseRef::Id("amulet"), &icon(11)).unwrap();
    assert_eq!(result.matched_by, AlgorithmMode::Feature);
    assert!(result.is_match);
}

#[test]
fn cached_and_extracted_features_agree() {
    let lib = library();
    let settings = config(AlgorithmMode::CachedFeature);
    let cache = FeatureCache::build(&lib, &settings.cache_params()).unwrap();
    let cached = Recognizer::new(settings.clone())
        .unwrap()
        .with_library(&lib)
        .with_cache(&cache);
    let extracted = Recognizer::new(config(AlgorithmMode::Feature))
        .unwrap()
        .with_library(&lib);

    let target = icon(11);
    let a = cached.recognize(BaseRef::Id("amulet"), &target).unwrap();
    let b = extracted.recognize(BaseRef::Id("amulet"), &target).unwrap();
    assert_eq!(a.raw_scores, b.raw_scores);
    assert_eq!(a.confidence, b.confidence);
}

#[test]
fn unrelated_target_is_not_a_match() {
    let lib = library();
    let recognizer = Recognizer::new(config(AlgorithmMode::Feature))
        .unwrap()
        .with_library(&lib);
    let result = recognizer.recognize(BaseRef::Id("amulet"), &icon(999)).unwrap();
    assert!(!result.is_match);
    assert!(result.error.is_none());
}

#[test]
fn red_icon_does_not_match_blue_base() {
    let mut lib = BaseLibrary::new();
    let blue = DynamicImage::ImageRgb8(RgbImage::from_pixel(80, 80, Rgb([30, 30, 220])));
    lib.insert_bytes("blue", png(&blue));
    let red = DynamicImage::ImageRgb8(RgbImage::from_pixel(80, 80, Rgb([220, 30, 30])));

    let mut settings = config(AlgorithmMode::TemplateColor);
    settings.threshold = 90.0;
    let recognizer = Recognizer::new(settings).unwrap().with_library(&lib);
    let result = recognizer.recognize(BaseRef::Id("blue"), &red).unwrap();
    assert!(!result.is_match);
    assert!(result.confidence < 90.0);
    assert!(result.raw_scores.histogram_distance.unwrap() > 0.9);
}

#[test]
fn raising_the_threshold_never_creates_matches() {
    let lib = library();
    let target = icon(22);
    for mode in [AlgorithmMode::Hash, AlgorithmMode::TemplateColor, AlgorithmMode::Feature] {
        let recognizer = Recognizer::new(config(mode)).unwrap().with_library(&lib);
        let mut previous = true;
        for threshold in [0.0, 25.0, 50.0, 80.0, 95.0, 100.0] {
            let result = recognizer
                .recognize_with_threshold(BaseRef::Id("boots"), &target, threshold)
                .unwrap();
            assert!(previous || !result.is_match, "{mode:?} at {threshold}");
            previous = result.is_match;
        }
    }
}

#[test]
fn invalid_threshold_is_rejected() {
    let lib = library();
    let recognizer = Recognizer::new(config(AlgorithmMode::Hash))
        .unwrap()
        .with_library(&lib);
    assert!(matches!(
        recognizer.recognize_with_threshold(BaseRef::Id("boots"), &icon(22), 101.0),
        Err(IconMatchError::InvalidConfig(_))
    ));
}

#[test]
fn unknown_base_id_is_an_error() {
    let lib = library();
    let recognizer = Recognizer::new(config(AlgorithmMode::Feature))
        .unwrap()
        .with_library(&lib);
    let err = recognizer
        .recognize(BaseRef::Id("gauntlet"), &icon(1))
        .unwrap_err();
    assert_eq!(err.tag(), ErrorTag::UnknownBase);
}

#[test]
fn base_can_be_given_by_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ring.png");
    icon(44).save(&path).unwrap();
    let recognizer = Recognizer::new(config(AlgorithmMode::Hash)).unwrap();
    let result = recognizer.recognize(BaseRef::Path(&path), &icon(44)).unwrap();
    assert_eq!(result.base_id, "ring");
    assert_eq!(result.raw_scores.hash_distance, Some(0));
    assert_eq!(result.confidence, 100.0);
}

#[test]
fn batch_preserves_order_and_isolates_failures() {
    let lib = library();
    let recognizer = Recognizer::new(config(AlgorithmMode::Hash))
        .unwrap()
        .with_library(&lib);
    let same = icon(22);
    let other = icon(5);
    let encoded = png(&same);
    let garbage = b"not an image".to_vec();
    let empty: Vec<u8> = Vec::new();
    let targets = [
        Target::Image(&same),
        Target::Bytes(&garbage),
        Target::Image(&other),
        Target::Bytes(&encoded),
        Target::Bytes(&empty),
    ];

    let results = recognizer.batch_recognize(BaseRef::Id("boots"), &targets);
    assert_eq!(results.len(), targets.len());

    assert_eq!(results[0].confidence, 100.0);
    assert!(results[0].error.is_none());

    assert_eq!(results[1].error, Some(ErrorTag::InvalidImage));
    assert_eq!(results[1].confidence, 0.0);
    assert!(!results[1].is_match);

    assert!(results[2].error.is_none());
    assert!(results[2].confidence < 100.0);

    assert_eq!(results[3].confidence, 100.0);
    assert_eq!(results[4].error, Some(ErrorTag::InvalidImage));

    for result in &results {
        assert_eq!(result.base_id, "boots");
    }
}

#[test]
fn batch_with_unknown_base_fails_every_entry() {
    let lib = library();
    let recognizer = Recognizer::new(config(AlgorithmMode::Feature))
        .unwrap()
        .with_library(&lib);
    let target = icon(1);
    let results = recognizer.batch_recognize(
        BaseRef::Id("missing"),
        &[Target::Image(&target), Target::Image(&target)],
    );
    assert_eq!(results.len(), 2);
    assert!(results
        .iter()
        .all(|r| r.error == Some(ErrorTag::UnknownBase) && r.confidence == 0.0));
}

#[test]
fn batch_names_path_targets() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tile_03.png");
    icon(33).save(&path).unwrap();
    let lib = library();
    let recognizer = Recognizer::new(config(AlgorithmMode::Hash))
        .unwrap()
        .with_library(&lib);
    let results = recognizer.batch_recognize(BaseRef::Id("crown"), &[Target::Path(&path)]);
    assert_eq!(results[0].candidate_name.as_deref(), Some("tile_03.png"));
    assert!(results[0].is_match);
}

#[test]
fn identify_picks_the_right_base() {
    let lib = library();
    for mode in [AlgorithmMode::Hash, AlgorithmMode::TemplateColor, AlgorithmMode::Feature] {
        let recognizer = Recognizer::new(config(mode)).unwrap().with_library(&lib);
        let best = recognizer.identify(&icon(33)).unwrap().unwrap();
        assert_eq!(best.base_id, "crown", "{mode:?}");
        assert!(best.is_match);
    }
}

#[test]
fn identify_with_hash_prefilter() {
    let lib = library();
    let mut settings = config(AlgorithmMode::Feature);
    settings.hash_prefilter = Some(90.0);
    let recognizer = Recognizer::new(settings).unwrap().with_library(&lib);
    let best = recognizer.identify(&icon(11)).unwrap().unwrap();
    assert_eq!(best.base_id, "amulet");
}

fn split_tile(left: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(116, 116, |x, _| {
        if x < 58 {
            Rgb(left)
        } else {
            Rgb([120, 120, 120])
        }
    }))
}

#[test]
fn hash_prefilter_sees_normalized_images() {
    // Left half is tile background on the base and neutral gray on the
    // target; identical once the background is stripped.
    let base = split_tile([87, 47, 66]);
    let target = split_tile([200, 200, 200]);
    let raw = iconmatch::hash::similarity(
        iconmatch::hash::compute_hash(&base),
        iconmatch::hash::compute_hash(&target),
    );
    assert!(raw < 95.0, "raw similarity {raw}");

    let mut lib = BaseLibrary::new();
    lib.insert_bytes("cloak", png(&base));

    let mut hash_settings = config(AlgorithmMode::Hash);
    hash_settings.normalize.strip_background = true;
    let by_hash = Recognizer::new(hash_settings)
        .unwrap()
        .with_library(&lib)
        .recognize(BaseRef::Id("cloak"), &target)
        .unwrap();
    assert_eq!(by_hash.confidence, 100.0);

    let mut settings = config(AlgorithmMode::TemplateColor);
    settings.normalize.strip_background = true;
    settings.hash_prefilter = Some(95.0);
    let recognizer = Recognizer::new(settings).unwrap().with_library(&lib);
    let best = recognizer.identify(&target).unwrap();
    assert_eq!(best.map(|b| b.base_id), Some("cloak".to_owned()));
}

#[test]
fn identify_against_cache_only() {
    let lib = library();
    let settings = config(AlgorithmMode::CachedFeature);
    let cache = FeatureCache::build(&lib, &settings.cache_params()).unwrap();
    let recognizer = Recognizer::new(settings).unwrap().with_cache(&cache);
    let best = recognizer.identify(&icon(22)).unwrap().unwrap();
    assert_eq!(best.base_id, "boots");
    assert_eq!(best.matched_by, AlgorithmMode::CachedFeature);
}

#[test]
fn identify_with_nothing_attached_finds_nothing() {
    let recognizer = Recognizer::new(config(AlgorithmMode::Hash)).unwrap();
    assert!(recognizer.identify(&icon(1)).unwrap().is_none());
}
