//! Image file naming.
//!
//! Image names may carry a unix (`/`) or windows (`\`) directory part, since
//! FTP destinations are named by the remote side's convention. The last `/`
//! wins; `\` is only considered when no `/` is present.

use chrono::{Local, NaiveDateTime};
use std::path::PathBuf;

use crate::{ImageError, Result};

/// Timestamp token format used for unique names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

fn last_separator(name: &str) -> Option<usize> {
    name.rfind('/').or_else(|| name.rfind('\\'))
}

/// Directory part of an image name, without the trailing separator.
///
/// Returns `None` when the name has no directory part. `"/"` is its own
/// directory part.
pub fn dir_part(name: &str) -> Result<Option<&str>> {
    if name.trim().is_empty() {
        return Err(ImageError::InvalidName("image name cannot be empty".to_string()));
    }
    if name == "/" {
        return Ok(Some(name));
    }
    if name == "\\" {
        return Err(ImageError::InvalidName("\\ is not a valid image name".to_string()));
    }
    Ok(last_separator(name).map(|idx| &name[..idx]))
}

/// File part of an image name. The whole name when there is no directory
/// part; empty when the name ends with a separator.
pub fn file_part(name: &str) -> Result<&str> {
    if name.trim().is_empty() {
        return Err(ImageError::InvalidName("image name cannot be empty".to_string()));
    }
    if name == "/" || name == "\\" {
        return Err(ImageError::InvalidName(format!(
            "{} is not a valid image name",
            name
        )));
    }
    Ok(match last_separator(name) {
        Some(idx) => &name[idx + 1..],
        None => name,
    })
}

/// Where the image will finally live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageTarget {
    Local,
    Ftp,
}

/// Turns a requested image name into the name actually written.
#[derive(Debug, Clone)]
pub struct NamingPolicy {
    unique: bool,
    target: ImageTarget,
    default_dir: Option<PathBuf>,
}

impl NamingPolicy {
    /// Local target. `default_dir` is used for bare file names; it is set
    /// only for post-five-o environments.
    pub fn local(default_dir: Option<PathBuf>) -> Self {
        Self {
            unique: true,
            target: ImageTarget::Local,
            default_dir,
        }
    }

    /// FTP target. No directory is ever invented.
    pub fn ftp() -> Self {
        Self {
            unique: true,
            target: ImageTarget::Ftp,
            default_dir: None,
        }
    }

    /// Disable unique naming; names pass through unchanged.
    pub fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn target(&self) -> ImageTarget {
        self.target
    }

    /// Resolve `requested` using the current local time.
    pub fn image_name(&self, requested: &str) -> Result<String> {
        self.image_name_at(requested, Local::now().naive_local())
    }

    /// Resolve `requested` with an explicit timestamp.
    ///
    /// The timestamp is prefixed to the file part, so the result always ends
    /// with the requested file name. A directory part is kept verbatim,
    /// including its separator.
    pub fn image_name_at(&self, requested: &str, now: NaiveDateTime) -> Result<String> {
        let file = file_part(requested)?;
        if file.is_empty() {
            return Err(ImageError::InvalidName(format!(
                "'{}' has no file name",
                requested
            )));
        }
        if !self.unique {
            return Ok(requested.to_string());
        }

        let unique_file = format!("{}_{}", now.format(TIMESTAMP_FORMAT), file);
        let name = match dir_part(requested)? {
            Some(dir) => {
                let sep = &requested[dir.len()..dir.len() + 1];
                format!("{}{}{}", dir, sep, unique_file)
            }
            None => match (self.target, &self.default_dir) {
                (ImageTarget::Local, Some(default_dir)) => default_dir
                    .join(&unique_file)
                    .to_string_lossy()
                    .into_owned(),
                _ => unique_file,
            },
        };
        Ok(name)
    }
}
