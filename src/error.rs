//! Error taxonomy for the scanning, versioning and export pipeline.
//!
//! Only the base-path check, version conversion and packaging are fatal.
//! Everything below the base path (unreadable subdirectories, unreadable
//! files, headers without fields) is absorbed and logged instead.

use std::path::PathBuf;

/// Library-level errors
#[derive(Debug, thiserror::Error)]
pub enum KbError {
    /// Scan root is missing, not a directory, or not readable
    #[error("base path not readable: {}", path.display())]
    NotReadable { path: PathBuf },

    /// No direct or chained conversion between two versions
    #[error("no conversion path from version {from} to {to}")]
    UnsupportedConversion { from: String, to: String },

    /// A configured or user-supplied regex failed to compile
    #[error("invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A configured exclusion glob failed to compile
    #[error("invalid glob `{pattern}`: {reason}")]
    InvalidGlob { pattern: String, reason: String },

    /// Relative path rejected by the path validator
    #[error("unsafe path `{path}`: {reason}")]
    UnsafePath { path: String, reason: String },

    /// Every selected file was skipped
    #[error("no valid files to export")]
    NothingToExport,

    /// Package staging or finalize failed
    #[error("packaging failed at {}: {source}", path.display())]
    Package {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest could not be rendered or parsed
    #[error("serialization error: {0}")]
    Serialize(String),
}

pub type Result<T> = std::result::Result<T, KbError>;

impl KbError {
    pub(crate) fn pattern(
        pattern: &str,
        source: regex::Error,
    ) -> Self {
        KbError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        }
    }

    pub(crate) fn package(
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        KbError::Package {
            path: path.into(),
            source,
        }
    }
}
