//! Persistent cache of precomputed base-image features.
//!
//! A [`FeatureCache`] is built from a [`BaseLibrary`] in one exclusive pass,
//! saved atomically, and afterwards only read. Loaded caches are immutable
//! and `Sync`; recognizers borrow them.
//!
//! Staleness is data, not an error: [`FeatureCache::is_valid`] compares the
//! stored build parameters with the caller's, and
//! [`FeatureCache::library_changes`] compares stored source digests with the
//! library on disk.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::feature::{FeatureSet, OrbExtractor};
use crate::image::ImageNormalizer;
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::{IconMatchError, IconMatchResult};

pub mod format;
mod library;

pub use format::{
    CacheEntry, CacheHeader, CacheParams, CACHE_ALGORITHM, CACHE_FORMAT_VERSION, CACHE_MAGIC,
};
pub use library::{BaseLibrary, BaseSource};

use format::Decoded;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Base image left out of a build.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkippedBase {
    pub id: String,
    pub reason: String,
}

/// Summary of a build pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    pub built: usize,
    /// Entries stored with zero keypoints.
    pub empty: usize,
    pub skipped: Vec<SkippedBase>,
}

/// Aggregate statistics of a cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheInfo {
    pub version: u32,
    pub algorithm: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub entries: usize,
    pub empty_entries: usize,
    pub total_keypoints: usize,
    pub avg_keypoints: f64,
    pub min_keypoints: usize,
    pub max_keypoints: usize,
}

/// Difference between cached entries and a library.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
}

impl LibraryDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Outcome of opening a cache file against the caller's parameters.
#[derive(Debug)]
pub enum CacheState {
    /// Loaded and built under the same parameters.
    Ready(FeatureCache),
    /// Loaded but built under other parameters or another format version.
    Stale(FeatureCache),
    Missing,
    Corrupt(IconMatchError),
}

/// In-memory feature cache.
#[derive(Clone, Debug)]
pub struct FeatureCache {
    version: u32,
    header: Option<CacheHeader>,
    entries: HashMap<String, CacheEntry>,
}

impl FeatureCache {
    /// Extracts features for every base image in `library`.
    pub fn build(library: &BaseLibrary, params: &CacheParams) -> IconMatchResult<Self> {
        Self::build_with_report(library, params).map(|(cache, _)| cache)
    }

    /// Like [`FeatureCache::build`], also reporting skipped and empty bases.
    ///
    /// Undecodable base images are skipped; images without keypoints are
    /// stored with an empty feature set.
    pub fn build_with_report(
        library: &BaseLibrary,
        params: &CacheParams,
    ) -> IconMatchResult<(Self, BuildReport)> {
        params.canonical_size.validate()?;
        params.detector.validate()?;
        let _span = trace_span!("cache_build", bases = library.len()).entered();

        let normalizer = ImageNormalizer::new(params.normalize.clone());
        let extractor = OrbExtractor::new(params.detector.clone());
        let ids: Vec<&str> = library.ids().collect();

        #[cfg(feature = "rayon")]
        let results: Vec<(String, IconMatchResult<CacheEntry>)> = ids
            .par_iter()
            .map(|id| {
                let entry = build_entry(library, id, params, &normalizer, &extractor);
                ((*id).to_owned(), entry)
            })
            .collect();

        #[cfg(not(feature = "rayon"))]
        let results: Vec<(String, IconMatchResult<CacheEntry>)> = ids
            .iter()
            .map(|id| {
                let entry = build_entry(library, id, params, &normalizer, &extractor);
                ((*id).to_owned(), entry)
            })
            .collect();

        let mut entries = HashMap::with_capacity(results.len());
        let mut report = BuildReport::default();
        for (id, result) in results {
            match result {
                Ok(entry) => {
                    report.built += 1;
                    if entry.features.is_empty() {
                        report.empty += 1;
                    }
                    entries.insert(id, entry);
                }
                Err(err) => {
                    trace_warn!(
                        "cache_skip_base",
                        id = id.as_str(),
                        reason = err.to_string().as_str()
                    );
                    report.skipped.push(SkippedBase {
                        id,
                        reason: err.to_string(),
                    });
                }
            }
        }

        let header = CacheHeader {
            version: CACHE_FORMAT_VERSION,
            algorithm: CACHE_ALGORITHM.to_owned(),
            params: params.clone(),
            created_at: Utc::now(),
            entry_count: entries.len() as u64,
        };
        trace_event!(
            "cache_built",
            built = report.built,
            empty = report.empty,
            skipped = report.skipped.len()
        );
        Ok((
            Self {
                version: CACHE_FORMAT_VERSION,
                header: Some(header),
                entries,
            },
            report,
        ))
    }

    /// Writes the cache to `path` through a sibling temp file and a rename,
    /// so readers never observe a partial file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> IconMatchResult<()> {
        let path = path.as_ref();
        let Some(header) = self.header.as_ref() else {
            return Err(IconMatchError::InvalidConfig(
                "cannot save a cache from another format version",
            ));
        };
        let _span = trace_span!("cache_save", entries = self.entries.len()).entered();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|err| IconMatchError::io(format!("{}: {err}", parent.display())))?;
        }

        let tmp = temp_path(path);
        let write = || -> IconMatchResult<()> {
            let file = fs::File::create(&tmp)
                .map_err(|err| IconMatchError::io(format!("{}: {err}", tmp.display())))?;
            format::write_cache(BufWriter::new(file), header, &self.entries)
        };
        if let Err(err) = write() {
            let _ = fs::remove_file(&tmp);
            return Err(err);
        }
        fs::rename(&tmp, path).map_err(|err| {
            let _ = fs::remove_file(&tmp);
            IconMatchError::io(format!("{}: {err}", path.display()))
        })
    }

    /// Reads a cache file. A file from another format version loads as an
    /// entry-less stale cache; structural damage is `CacheCorrupt`.
    pub fn load<P: AsRef<Path>>(path: P) -> IconMatchResult<Self> {
        let path = path.as_ref();
        let _span = trace_span!("cache_load").entered();
        let bytes = fs::read(path)
            .map_err(|err| IconMatchError::io(format!("{}: {err}", path.display())))?;
        Self::from_bytes(&bytes)
    }

    /// Decodes a cache from an in-memory file image.
    pub fn from_bytes(bytes: &[u8]) -> IconMatchResult<Self> {
        match format::read_cache(bytes)? {
            Decoded::Current { header, entries } => {
                trace_event!("cache_loaded", entries = entries.len());
                Ok(Self {
                    version: header.version,
                    header: Some(header),
                    entries,
                })
            }
            Decoded::Foreign { version } => {
                trace_warn!(
                    "cache_foreign_version",
                    found = version,
                    expected = CACHE_FORMAT_VERSION
                );
                Ok(Self {
                    version,
                    header: None,
                    entries: HashMap::new(),
                })
            }
        }
    }

    /// Loads `path` and classifies it against `params`.
    pub fn open<P: AsRef<Path>>(path: P, params: &CacheParams) -> CacheState {
        let path = path.as_ref();
        if !path.exists() {
            return CacheState::Missing;
        }
        match Self::load(path) {
            Ok(cache) if cache.is_valid(params) => CacheState::Ready(cache),
            Ok(cache) => CacheState::Stale(cache),
            Err(err) => CacheState::Corrupt(err),
        }
    }

    /// Returns a cache valid for `params` and current with `library`,
    /// rebuilding and saving it when the file is missing, stale, corrupt or
    /// out of date.
    pub fn ensure<P: AsRef<Path>>(
        path: P,
        library: &BaseLibrary,
        params: &CacheParams,
    ) -> IconMatchResult<Self> {
        let path = path.as_ref();
        match Self::open(path, params) {
            CacheState::Ready(cache) => {
                let diff = cache.library_changes(library)?;
                if diff.is_empty() {
                    return Ok(cache);
                }
                trace_warn!(
                    "cache_out_of_date",
                    added = diff.added.len(),
                    removed = diff.removed.len(),
                    modified = diff.modified.len()
                );
            }
            CacheState::Stale(_) => trace_warn!("cache_rebuild", reason = "stale"),
            CacheState::Missing => trace_event!("cache_rebuild", reason = "missing"),
            CacheState::Corrupt(err) => {
                trace_warn!("cache_rebuild", reason = err.to_string().as_str())
            }
        }
        let cache = Self::build(library, params)?;
        cache.save(path)?;
        Ok(cache)
    }

    /// True only if the format version, algorithm and every build parameter
    /// match.
    pub fn is_valid(&self, params: &CacheParams) -> bool {
        self.version == CACHE_FORMAT_VERSION
            && self
                .header
                .as_ref()
                .is_some_and(|h| h.algorithm == CACHE_ALGORITHM && h.params == *params)
    }

    pub fn get(&self, id: &str) -> Option<&CacheEntry> {
        self.entries.get(id)
    }

    /// Cached ids in sorted order.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Header, absent for foreign-version files.
    pub fn header(&self) -> Option<&CacheHeader> {
        self.header.as_ref()
    }

    pub fn info(&self) -> CacheInfo {
        let counts: Vec<usize> = self.entries.values().map(|e| e.features.len()).collect();
        let total: usize = counts.iter().sum();
        CacheInfo {
            version: self.version,
            algorithm: self.header.as_ref().map(|h| h.algorithm.clone()),
            created_at: self.header.as_ref().map(|h| h.created_at),
            entries: counts.len(),
            empty_entries: counts.iter().filter(|&&c| c == 0).count(),
            total_keypoints: total,
            avg_keypoints: if counts.is_empty() {
                0.0
            } else {
                total as f64 / counts.len() as f64
            },
            min_keypoints: counts.iter().copied().min().unwrap_or(0),
            max_keypoints: counts.iter().copied().max().unwrap_or(0),
        }
    }

    /// Compares stored digests with the library's current sources.
    pub fn library_changes(&self, library: &BaseLibrary) -> IconMatchResult<LibraryDiff> {
        let mut diff = LibraryDiff::default();
        let mut seen = HashSet::with_capacity(library.len());
        for id in library.ids() {
            seen.insert(id);
            match self.entries.get(id) {
                None => diff.added.push(id.to_owned()),
                Some(entry) => {
                    if library.digest(id)? != entry.source_digest {
                        diff.modified.push(id.to_owned());
                    }
                }
            }
        }
        diff.removed = self
            .entries
            .keys()
            .filter(|id| !seen.contains(id.as_str()))
            .cloned()
            .collect();
        diff.removed.sort_unstable();
        Ok(diff)
    }
}

fn build_entry(
    library: &BaseLibrary,
    id: &str,
    params: &CacheParams,
    normalizer: &ImageNormalizer,
    extractor: &OrbExtractor,
) -> IconMatchResult<CacheEntry> {
    let bytes = library.read_bytes(id)?;
    let image = crate::image::io::decode_image(&bytes)?;
    let normalized = normalizer.normalize(&image, params.canonical_size, params.normalize_mode)?;
    let features: FeatureSet = extractor.extract(normalized.gray())?;
    Ok(CacheEntry {
        base_image_id: id.to_owned(),
        features,
        canonical_size: params.canonical_size,
        original_shape: normalized.original_shape(),
        source_digest: blake3::hash(&bytes).to_hex().to_string(),
        created_at: Utc::now(),
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cache".to_owned());
    path.with_file_name(format!(".{name}.tmp"))
}
