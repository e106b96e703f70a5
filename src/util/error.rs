//! Error types for iconmatch.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias for iconmatch operations.
pub type IconMatchResult<T> = std::result::Result<T, IconMatchError>;

/// Errors that can surface from the recognition engine.
///
/// Only structural failures are represented here. "No features", "no match"
/// and a stale cache are ordinary outcomes and are reported as data.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IconMatchError {
    /// The image buffer could not be decoded or is degenerate.
    #[error("invalid image: {reason}")]
    InvalidImage { reason: String },
    /// Width or height is zero, or their product overflows.
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    /// A pixel buffer is shorter than its dimensions require.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// The persisted feature cache failed structural decoding.
    #[error("feature cache corrupt: {reason}")]
    CacheCorrupt { reason: String },
    /// Reading or writing the cache or the base library failed.
    #[error("cache i/o: {reason}")]
    CacheIo { reason: String },
    /// The requested base image id is not part of the library.
    #[error("unknown base image: {id}")]
    UnknownBaseImage { id: String },
    /// A configuration value was rejected by validation.
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

impl IconMatchError {
    pub(crate) fn invalid_image(reason: impl Into<String>) -> Self {
        Self::InvalidImage {
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt(reason: impl ToString) -> Self {
        Self::CacheCorrupt {
            reason: reason.to_string(),
        }
    }

    pub(crate) fn io(reason: impl ToString) -> Self {
        Self::CacheIo {
            reason: reason.to_string(),
        }
    }

    /// Classifies the error for attaching to a batch result.
    pub fn tag(&self) -> ErrorTag {
        match self {
            Self::InvalidImage { .. }
            | Self::InvalidDimensions { .. }
            | Self::BufferTooSmall { .. } => ErrorTag::InvalidImage,
            Self::CacheCorrupt { .. } => ErrorTag::CacheCorrupt,
            Self::CacheIo { .. } => ErrorTag::Io,
            Self::UnknownBaseImage { .. } => ErrorTag::UnknownBase,
            Self::InvalidConfig(_) => ErrorTag::InvalidConfig,
        }
    }
}

/// Serializable error classification carried by failed batch entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorTag {
    InvalidImage,
    CacheCorrupt,
    Io,
    UnknownBase,
    InvalidConfig,
}
