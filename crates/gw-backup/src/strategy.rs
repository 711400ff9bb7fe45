//! Version strategy selection.
//!
//! Layout differences between product eras live in [`ImageLayout`] tables.
//! Orchestration code asks [`Strategy::select`] for the era of the running
//! gateway (export) or of the opened image (import) and never branches on
//! versions itself.

use crate::staging::{StagingBackup, StagingRestore};
use gw_common::layout::{AUDIT_DB_DUMP, MAIN_DB_DUMP};
use gw_common::{EngineConfig, ImageVersion};
use gw_image::Image;
use serde::Serialize;
use std::path::Path;

/// Where an era keeps the entries that moved between layouts, relative to
/// the image root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageLayout {
    /// Folder holding custom assertion `*.properties` files.
    pub ca_properties_dir: &'static str,
    /// Main database dump.
    pub main_db_dump: &'static str,
    /// Audit database dump.
    pub audit_db_dump: &'static str,
}

const FIVE_O_LAYOUT: ImageLayout = ImageLayout {
    ca_properties_dir: "config",
    main_db_dump: MAIN_DB_DUMP,
    audit_db_dump: "audits/audit_backup.sql",
};

const POST_FIVE_O_LAYOUT: ImageLayout = ImageLayout {
    ca_properties_dir: "ca",
    main_db_dump: "maindb/main_backup.sql",
    audit_db_dump: "audits/audit_backup.sql",
};

/// Backup/restore behavior for one layout era.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    FiveO,
    PostFiveO,
}

impl Strategy {
    /// Strategy for an era. Pure.
    pub fn select(version: ImageVersion) -> Self {
        match version {
            ImageVersion::FiveO => Strategy::FiveO,
            ImageVersion::AfterFiveO => Strategy::PostFiveO,
        }
    }

    pub fn layout(&self) -> &'static ImageLayout {
        match self {
            Strategy::FiveO => &FIVE_O_LAYOUT,
            Strategy::PostFiveO => &POST_FIVE_O_LAYOUT,
        }
    }

    /// Export side, writing into `staging_root`.
    pub fn backup<'a>(&self, config: &'a EngineConfig, staging_root: &'a Path) -> StagingBackup<'a> {
        StagingBackup::new(config, staging_root, self.layout())
    }

    /// Import side, reading from `image`.
    pub fn restore<'a>(&self, config: &'a EngineConfig, image: &'a Image) -> StagingRestore<'a> {
        StagingRestore::new(config, image, self.layout())
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::FiveO => write!(f, "five_o"),
            Strategy::PostFiveO => write!(f, "post_five_o"),
        }
    }
}
