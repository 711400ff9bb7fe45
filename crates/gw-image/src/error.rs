//! Error types for image operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while writing or reading an image.
#[derive(Error, Debug)]
pub enum ImageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error on a specific path
    #[error("I/O error at '{}': {source}", path.display())]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// ZIP archive error
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Not a readable image
    #[error("'{}' is not a valid image: {reason}", path.display())]
    InvalidImage { path: PathBuf, reason: String },

    /// Entry would extract outside the extraction directory
    #[error("unsafe entry name in image: {0}")]
    UnsafeEntry(String),

    /// Missing required file in the staging area or image
    #[error("missing required file: {0}")]
    MissingFile(String),

    /// Version marker names a release older than 5.0
    #[error("unsupported image version: {0}")]
    UnsupportedVersion(String),

    /// Image name cannot be split or made unique
    #[error("invalid image name: {0}")]
    InvalidName(String),

    /// Target image already exists
    #[error("image '{}' already exists", path.display())]
    TargetExists { path: PathBuf },

    /// Extracted directory was used after release
    #[error("image extraction directory has been released")]
    Released,
}

impl ImageError {
    pub(crate) fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ImageError::IoAt {
            path: path.into(),
            source,
        }
    }
}

impl From<ImageError> for gw_common::Error {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::Io(e) => gw_common::Error::Io(e),
            ImageError::IoAt { path, source } => gw_common::Error::IoAt { path, source },
            ImageError::InvalidName(msg) => gw_common::Error::InvalidArgument(msg),
            ImageError::TargetExists { path } => gw_common::Error::TargetExists { path },
            ImageError::UnsupportedVersion(version) => {
                gw_common::Error::UnsupportedVersion { version }
            }
            other => gw_common::Error::Archive(other.to_string()),
        }
    }
}

/// Result type alias for image operations.
pub type Result<T> = std::result::Result<T, ImageError>;
