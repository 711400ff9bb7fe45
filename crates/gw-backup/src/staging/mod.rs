//! Staging areas and the per-component copy strategies.
//!
//! Export assembles an image in a [`StagingArea`] through a
//! [`StagingBackup`]; import copies out of an opened image through a
//! [`StagingRestore`]. Both are obtained from a
//! [`Strategy`](crate::strategy::Strategy) so layout differences between
//! product eras stay in one table.

pub mod backup;
pub mod restore;

pub use backup::StagingBackup;
pub use restore::StagingRestore;

use gw_common::{ComponentType, Error, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Prefix of staging directories.
pub const STAGING_PREFIX: &str = "gw-staging-";

/// Private directory an export is assembled in.
///
/// Released explicitly on every exit path; dropping an unreleased area also
/// removes the directory.
#[derive(Debug)]
pub struct StagingArea {
    dir: Option<TempDir>,
    written: BTreeSet<ComponentType>,
}

impl StagingArea {
    /// Create a fresh staging directory under the system temp dir.
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir()
            .map_err(Error::Io)?;
        debug!(path = %dir.path().display(), "staging area created");
        Ok(Self {
            dir: Some(dir),
            written: BTreeSet::new(),
        })
    }

    /// Staging root. Fails once released.
    pub fn root(&self) -> Result<&Path> {
        self.dir
            .as_ref()
            .map(|d| d.path())
            .ok_or_else(|| Error::Archive("staging area has been released".to_string()))
    }

    /// Record a component as captured.
    pub fn mark_written(&mut self, component: ComponentType) {
        self.written.insert(component);
    }

    pub fn components_written(&self) -> &BTreeSet<ComponentType> {
        &self.written
    }

    /// Delete the staging directory. Safe to call more than once.
    pub fn release(&mut self) -> Result<()> {
        if let Some(dir) = self.dir.take() {
            let path: PathBuf = dir.path().to_path_buf();
            dir.close().map_err(|e| Error::io_at(&path, e))?;
            debug!(path = %path.display(), "staging area released");
        }
        Ok(())
    }

    pub fn is_released(&self) -> bool {
        self.dir.is_none()
    }
}
