//! On-disk layout of the feature cache.
//!
//! ```text
//! magic (8 bytes) | format version (u32 LE) | bincode(CacheHeader) | bincode(entries)
//! ```
//!
//! The version is read before anything else; a file written by another
//! format version is reported as stale and its payload is never decoded.
//! Any structural change to [`CacheHeader`] or [`CacheEntry`] must bump
//! [`CACHE_FORMAT_VERSION`].

use std::collections::HashMap;
use std::io::{Read, Write};

use bincode::Options;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::feature::{DetectorParams, FeatureSet};
use crate::image::{CanonicalSize, NormalizeConfig, NormalizeMode};
use crate::util::{IconMatchError, IconMatchResult};

pub const CACHE_MAGIC: [u8; 8] = *b"ICONFEAT";
pub const CACHE_FORMAT_VERSION: u32 = 1;
/// Detector family the descriptors came from.
pub const CACHE_ALGORITHM: &str = "orb-brief256";

/// Parameters a cache was built under. Any difference invalidates it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheParams {
    pub canonical_size: CanonicalSize,
    pub normalize_mode: NormalizeMode,
    pub normalize: NormalizeConfig,
    pub detector: DetectorParams,
}

/// Metadata stored ahead of the entries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheHeader {
    pub version: u32,
    pub algorithm: String,
    pub params: CacheParams,
    pub created_at: DateTime<Utc>,
    pub entry_count: u64,
}

/// Precomputed features of one base image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub base_image_id: String,
    pub features: FeatureSet,
    pub canonical_size: CanonicalSize,
    /// `(width, height)` of the source before normalization.
    pub original_shape: (u32, u32),
    /// BLAKE3 hex digest of the encoded source.
    pub source_digest: String,
    pub created_at: DateTime<Utc>,
}

/// Decoded file contents.
pub(crate) enum Decoded {
    Current {
        header: CacheHeader,
        entries: HashMap<String, CacheEntry>,
    },
    Foreign {
        version: u32,
    },
}

fn options(limit: u64) -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(limit)
}

pub(crate) fn write_cache<W: Write>(
    mut writer: W,
    header: &CacheHeader,
    entries: &HashMap<String, CacheEntry>,
) -> IconMatchResult<()> {
    writer.write_all(&CACHE_MAGIC).map_err(IconMatchError::io)?;
    writer
        .write_all(&header.version.to_le_bytes())
        .map_err(IconMatchError::io)?;
    options(u64::MAX)
        .serialize_into(&mut writer, header)
        .map_err(IconMatchError::io)?;
    options(u64::MAX)
        .serialize_into(&mut writer, entries)
        .map_err(IconMatchError::io)?;
    writer.flush().map_err(IconMatchError::io)
}

pub(crate) fn read_cache(bytes: &[u8]) -> IconMatchResult<Decoded> {
    let limit = bytes.len() as u64;
    let mut reader = bytes;

    let mut magic = [0u8; 8];
    reader
        .read_exact(&mut magic)
        .map_err(|_| IconMatchError::corrupt("file shorter than magic"))?;
    if magic != CACHE_MAGIC {
        return Err(IconMatchError::corrupt("bad magic"));
    }
    let mut version = [0u8; 4];
    reader
        .read_exact(&mut version)
        .map_err(|_| IconMatchError::corrupt("missing format version"))?;
    let version = u32::from_le_bytes(version);
    if version != CACHE_FORMAT_VERSION {
        return Ok(Decoded::Foreign { version });
    }

    let header: CacheHeader = options(limit)
        .deserialize_from(&mut reader)
        .map_err(|err| IconMatchError::corrupt(format!("header: {err}")))?;
    if header.version != version {
        return Err(IconMatchError::corrupt("header version disagrees with prefix"));
    }
    let entries: HashMap<String, CacheEntry> = options(limit)
        .deserialize_from(&mut reader)
        .map_err(|err| IconMatchError::corrupt(format!("entries: {err}")))?;

    if entries.len() as u64 != header.entry_count {
        return Err(IconMatchError::corrupt(format!(
            "header lists {} entries, found {}",
            header.entry_count,
            entries.len()
        )));
    }
    if let Some((key, _)) = entries.iter().find(|(key, e)| **key != e.base_image_id) {
        return Err(IconMatchError::corrupt(format!("entry key {key} mismatches its id")));
    }
    Ok(Decoded::Current { header, entries })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreign_version_skips_payload() {
        let mut bytes = CACHE_MAGIC.to_vec();
        bytes.extend_from_slice(&(CACHE_FORMAT_VERSION + 1).to_le_bytes());
        bytes.extend_from_slice(b"not bincode at all");
        match read_cache(&bytes).unwrap() {
            Decoded::Foreign { version } => assert_eq!(version, CACHE_FORMAT_VERSION + 1),
            Decoded::Current { .. } => panic!("foreign version decoded"),
        }
    }

    #[test]
    fn bad_magic_is_corrupt() {
        let err = read_cache(b"PNG\0\0\0\0\0\x01\0\0\0").err().unwrap();
        assert!(matches!(err, IconMatchError::CacheCorrupt { .. }));
    }

    #[derive(Serialize)]
    struct RaggedFeatures {
        keypoints: Vec<crate::feature::KeyPoint>,
        descriptors: Vec<u8>,
        image_shape: (u32, u32),
    }

    #[derive(Serialize)]
    struct RaggedEntry {
        base_image_id: String,
        features: RaggedFeatures,
        canonical_size: CanonicalSize,
        original_shape: (u32, u32),
        source_digest: String,
        created_at: DateTime<Utc>,
    }

    #[test]
    fn ragged_descriptor_buffer_is_corrupt() {
        let now = Utc::now();
        let header = CacheHeader {
            version: CACHE_FORMAT_VERSION,
            algorithm: CACHE_ALGORITHM.to_owned(),
            params: CacheParams::default(),
            created_at: now,
            entry_count: 1,
        };
        let kp = crate::feature::KeyPoint {
            x: 4.0,
            y: 4.0,
            size: 31.0,
            angle: 0.0,
            response: 1.0,
            octave: 0,
            class_id: -1,
        };
        let mut entries = HashMap::new();
        entries.insert(
            "sword".to_owned(),
            RaggedEntry {
                base_image_id: "sword".to_owned(),
                features: RaggedFeatures {
                    keypoints: vec![kp],
                    descriptors: vec![0u8; 37],
                    image_shape: (8, 8),
                },
                canonical_size: CanonicalSize::square(8),
                original_shape: (8, 8),
                source_digest: String::new(),
                created_at: now,
            },
        );

        let mut bytes = CACHE_MAGIC.to_vec();
        bytes.extend_from_slice(&CACHE_FORMAT_VERSION.to_le_bytes());
        options(u64::MAX).serialize_into(&mut bytes, &header).unwrap();
        options(u64::MAX).serialize_into(&mut bytes, &entries).unwrap();

        assert!(matches!(
            read_cache(&bytes),
            Err(IconMatchError::CacheCorrupt { .. })
        ));
    }

    #[test]
    fn truncated_payload_is_corrupt() {
        let mut bytes = CACHE_MAGIC.to_vec();
        bytes.extend_from_slice(&CACHE_FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3]);
        assert!(matches!(
            read_cache(&bytes),
            Err(IconMatchError::CacheCorrupt { .. })
        ));
    }
}
