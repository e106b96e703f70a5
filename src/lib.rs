//! iconmatch recognizes equipment icons cropped from game screenshots by
//! comparing them with a library of reference icons.
//!
//! Three interchangeable algorithms are provided: a 64-bit difference hash,
//! a correlation template match blended with a CIE L*a*b* histogram
//! distance, and ORB-class keypoint matching verified by a RANSAC
//! homography. Base-image features can be precomputed into a versioned
//! binary [`FeatureCache`]. [`Recognizer`] selects the algorithm, decides
//! between cached and on-demand features, and maps every algorithm onto one
//! confidence scale in [0, 100].
//!
//! Batches and cache builds run in parallel with the `rayon` feature; the
//! correlation kernel uses `wide` with the `simd` feature.

pub mod cache;
mod candidate;
pub mod feature;
pub mod hash;
pub mod image;
pub mod kernel;
pub mod lowlevel;
pub mod recognize;
pub mod template;
mod trace;
pub mod util;

pub use cache::{BaseLibrary, CacheEntry, CacheParams, CacheState, FeatureCache};
pub use feature::{DetectorParams, FeatureMatchConfig, FeatureMatcher, FeatureSet, KeyPoint};
pub use hash::{DHash, HashMatcher};
pub use image::io::{decode_image, load_image};
pub use image::{CanonicalSize, ImageNormalizer, ImageView, NormalizeMode, NormalizedImage};
pub use recognize::{
    AlgorithmMode, BaseRef, MatchResult, RawScores, RecognitionConfig, Recognizer, Target,
};
pub use template::{TemplateColorConfig, TemplateColorMatcher};
pub use util::{ErrorTag, IconMatchError, IconMatchResult};
