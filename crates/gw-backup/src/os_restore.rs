//! Deferred OS file restore.
//!
//! OS files cannot be replaced while the gateway depends on them, so an
//! import only stages them. The staged set is persisted under the var
//! directory and applied by the next process start:
//!
//! ```text
//!   (none) --stage_from_image--> Staged --apply_pending_os_restore--> Applied
//!                                  ^                                     |
//!                                  +---------- stage_from_image ---------+
//! ```
//!
//! Applied is terminal for a staged set: applying again is a no-op.
//!
//! Each staged set gets its own payload directory. The state file is only
//! switched to a new set once that set is fully copied, so a failed
//! re-stage leaves the previous set applicable.

use crate::fsutil;
use chrono::{DateTime, Utc};
use gw_common::{ComponentType, EngineConfig, Error, Result};
use gw_image::Image;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Persisted state file, under the var directory.
pub const STATE_FILE: &str = "pending_os_restore.json";

/// Prefix of staged payload directories, under the var directory.
pub const STAGED_DIR: &str = "os_staged";

/// One staged file and where it goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedFile {
    /// Path relative to the staged payload directory.
    pub source: PathBuf,
    /// Original absolute path on the live system.
    pub destination: PathBuf,
    pub sha256: String,
    pub bytes: u64,
}

/// Persisted pending restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOsRestore {
    pub created_at: DateTime<Utc>,
    pub applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
    /// Payload directory name, under the var directory.
    #[serde(default = "default_payload_dir")]
    pub payload_dir: String,
    pub files: Vec<StagedFile>,
}

fn default_payload_dir() -> String {
    STAGED_DIR.to_string()
}

/// State reported by [`DeferredFileApplier::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreState {
    /// Nothing was ever staged.
    None,
    Staged,
    Applied,
}

impl std::fmt::Display for RestoreState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestoreState::None => write!(f, "none"),
            RestoreState::Staged => write!(f, "staged"),
            RestoreState::Applied => write!(f, "applied"),
        }
    }
}

/// Summary of the pending restore, for the `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct OsRestoreStatus {
    pub state: RestoreState,
    pub file_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
    pub files: Vec<PathBuf>,
}

/// What [`DeferredFileApplier::apply_pending_os_restore`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApplyOutcome {
    NothingPending,
    AlreadyApplied,
    Applied { files: usize },
}

/// Stages OS files from an image and applies them later.
#[derive(Debug, Clone)]
pub struct DeferredFileApplier {
    var_dir: PathBuf,
    os_root: PathBuf,
}

impl DeferredFileApplier {
    /// `os_root` is the root destinations are resolved against.
    pub fn new(var_dir: impl Into<PathBuf>, os_root: impl Into<PathBuf>) -> Self {
        Self {
            var_dir: var_dir.into(),
            os_root: os_root.into(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(&config.var_dir, &config.os_root)
    }

    pub fn state_path(&self) -> PathBuf {
        self.var_dir.join(STATE_FILE)
    }

    /// Payload directory of the current staged set, if one is pending.
    pub fn staged_dir(&self) -> Result<Option<PathBuf>> {
        Ok(self
            .read_state()?
            .filter(|state| !state.applied)
            .map(|state| self.payload_path(&state)))
    }

    fn payload_path(&self, state: &PendingOsRestore) -> PathBuf {
        fsutil::under_root(&self.var_dir, Path::new(&state.payload_dir))
    }

    /// Copy the image's OS entries into the staged payload directory and
    /// persist the mapping. Never touches a destination. Replaces any
    /// previously staged set.
    pub fn stage_from_image(&self, image: &Image) -> Result<usize> {
        let os_dir = image
            .component_dir(ComponentType::Os)?
            .ok_or_else(|| Error::unavailable(ComponentType::Os, "not present in image"))?;
        let files = image.files_under(ComponentType::Os)?;
        if files.is_empty() {
            return Err(Error::unavailable(ComponentType::Os, "image has no OS files"));
        }

        let payload_dir = format!("{}-{}", STAGED_DIR, Uuid::new_v4().simple());
        let staged_dir = self.var_dir.join(&payload_dir);
        let committed = copy_payload(&os_dir, files, &staged_dir).and_then(|staged| {
            let state = PendingOsRestore {
                created_at: Utc::now(),
                applied: false,
                applied_at: None,
                payload_dir: payload_dir.clone(),
                files: staged,
            };
            self.write_state(&state)?;
            Ok(state)
        });
        let state = match committed {
            Ok(state) => state,
            Err(err) => {
                if let Err(cleanup) = fsutil::remove_tree(&staged_dir) {
                    warn!(
                        target: "os_restore.stage",
                        path = %staged_dir.display(),
                        error = %cleanup,
                        "could not remove incomplete payload"
                    );
                }
                return Err(err);
            }
        };
        self.remove_stale_payloads(&payload_dir);
        info!(
            target: "os_restore.stage",
            files = state.files.len(),
            state = %self.state_path().display(),
            "os restore staged for next start"
        );
        Ok(state.files.len())
    }

    /// Copy every staged file to its destination under the OS root, then
    /// mark the set applied.
    ///
    /// All checksums are verified before anything is overwritten; a
    /// mismatch leaves the state Staged.
    pub fn apply_pending_os_restore(&self) -> Result<ApplyOutcome> {
        let mut state = match self.read_state()? {
            None => {
                debug!(target: "os_restore.apply", "no pending os restore");
                return Ok(ApplyOutcome::NothingPending);
            }
            Some(state) if state.applied => {
                debug!(target: "os_restore.apply", "os restore already applied");
                return Ok(ApplyOutcome::AlreadyApplied);
            }
            Some(state) => state,
        };

        let staged_dir = self.payload_path(&state);
        for file in &state.files {
            let source = staged_dir.join(&file.source);
            if !source.is_file() || sha256_file(&source)? != file.sha256 {
                warn!(
                    target: "os_restore.apply",
                    path = %source.display(),
                    "staged file failed verification"
                );
                return Err(Error::StagedFileChanged { path: source });
            }
        }

        for file in &state.files {
            let dest = fsutil::under_root(&self.os_root, &file.destination);
            fsutil::copy_file(&staged_dir.join(&file.source), &dest)?;
            info!(
                target: "os_restore.apply",
                destination = %dest.display(),
                bytes = file.bytes,
                "restored os file"
            );
        }

        state.applied = true;
        state.applied_at = Some(Utc::now());
        self.write_state(&state)?;
        fsutil::remove_tree(&staged_dir)?;

        Ok(ApplyOutcome::Applied {
            files: state.files.len(),
        })
    }

    /// Current state of the pending restore.
    pub fn status(&self) -> Result<OsRestoreStatus> {
        Ok(match self.read_state()? {
            None => OsRestoreStatus {
                state: RestoreState::None,
                file_count: 0,
                created_at: None,
                applied_at: None,
                files: Vec::new(),
            },
            Some(state) => OsRestoreStatus {
                state: if state.applied {
                    RestoreState::Applied
                } else {
                    RestoreState::Staged
                },
                file_count: state.files.len(),
                created_at: Some(state.created_at),
                applied_at: state.applied_at,
                files: state.files.into_iter().map(|f| f.destination).collect(),
            },
        })
    }

    /// Remove payload directories other than `current`. The new state is
    /// already committed, so failures here only leave garbage behind.
    fn remove_stale_payloads(&self, current: &str) {
        let entries = match fs::read_dir(&self.var_dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == current || !name.starts_with(STAGED_DIR) {
                continue;
            }
            if let Err(err) = fsutil::remove_tree(&entry.path()) {
                warn!(
                    target: "os_restore.stage",
                    path = %entry.path().display(),
                    error = %err,
                    "could not remove stale payload"
                );
            }
        }
    }

    fn read_state(&self) -> Result<Option<PendingOsRestore>> {
        let path = self.state_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read(&path).map_err(|e| Error::io_at(&path, e))?;
        Ok(Some(serde_json::from_slice(&content)?))
    }

    fn write_state(&self, state: &PendingOsRestore) -> Result<()> {
        fs::create_dir_all(&self.var_dir).map_err(|e| Error::io_at(&self.var_dir, e))?;
        let path = self.state_path();
        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(state)?;
        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .map_err(|e| Error::io_at(&tmp_path, e))?;
            file.write_all(&json)
                .and_then(|()| file.sync_all())
                .map_err(|e| Error::io_at(&tmp_path, e))?;
        }
        fs::rename(&tmp_path, &path).map_err(|e| Error::io_at(&path, e))?;
        Ok(())
    }
}

/// Copy `files` (relative to `os_dir`) into `staged_dir`, hashing each copy.
fn copy_payload(os_dir: &Path, files: Vec<PathBuf>, staged_dir: &Path) -> Result<Vec<StagedFile>> {
    let mut staged = Vec::with_capacity(files.len());
    for rel in files {
        let dest = staged_dir.join(&rel);
        let bytes = fsutil::copy_file(&os_dir.join(&rel), &dest)?;
        let destination = Path::new("/").join(&rel);
        debug!(
            target: "os_restore.stage",
            destination = %destination.display(),
            bytes,
            "staged os file"
        );
        staged.push(StagedFile {
            sha256: sha256_file(&dest)?,
            source: rel,
            destination,
            bytes,
        });
    }
    Ok(staged)
}

fn sha256_file(path: &Path) -> Result<String> {
    let content = fs::read(path).map_err(|e| Error::io_at(path, e))?;
    Ok(hex::encode(Sha256::digest(&content)))
}
