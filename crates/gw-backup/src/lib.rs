//! Gateway backup and restore engine.
//!
//! This library drives the image layer from `gw-image`:
//! - Option-map parsing for export, import and migrate
//! - Staging strategies per layout era
//! - Deferred OS file restore
//! - The database bridge and FTP seam
//! - Exit codes and logging for the binary
//!
//! The binary entry point is in `main.rs`.
//!
//! # Example
//!
//! ```no_run
//! use gw_backup::db::UnavailableDatabase;
//! use gw_backup::ftp::UnavailableFtp;
//! use gw_backup::options::{OptionMap, IMAGE};
//! use gw_backup::Exporter;
//! use gw_common::{EngineConfig, ProductVersion};
//!
//! let config = EngineConfig::new("/opt/SecureSpan", ProductVersion::new(5, 1, 0));
//! let exporter = Exporter::new(&config, &UnavailableDatabase, &UnavailableFtp)?;
//! let result = exporter.export(&OptionMap::new().value(IMAGE, "node1.zip").flag("-config"));
//! println!("{}", result.status());
//! # Ok::<(), gw_common::Error>(())
//! ```

pub mod db;
pub mod exit_codes;
pub mod exporter;
pub mod fsutil;
pub mod ftp;
pub mod importer;
pub mod logging;
pub mod options;
pub mod os_restore;
pub mod staging;
pub mod strategy;

pub use db::{apply_dump, fix_dump_escaping, DatabaseClient, DatabaseConfig, LoadOptions};
pub use exit_codes::ExitCode;
pub use exporter::Exporter;
pub use ftp::FtpTransport;
pub use importer::Importer;
pub use options::{ComponentSelection, OptionMap};
pub use os_restore::{ApplyOutcome, DeferredFileApplier, RestoreState};
pub use staging::{StagingArea, StagingBackup, StagingRestore};
pub use strategy::{ImageLayout, Strategy};
