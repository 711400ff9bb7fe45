//! Export side: copy live gateway state into a staging directory.
//!
//! Every method writes to a fixed destination under the staging root, so
//! calling it again overwrites rather than adds.

use crate::db::{DatabaseClient, DatabaseConfig};
use crate::fsutil;
use crate::strategy::ImageLayout;
use gw_common::layout::{
    CA_JAR_DIR, CONFIG_FILES, ESM_DIRS, LIB_EXT_DIR, MA_AAR_DIR, VERSION_FILE,
};
use gw_common::{ComponentType, EngineConfig, Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Folder of the main database component; my.cnf is kept here.
const MAIN_DB_FOLDER: &str = "maindb";
const MY_CNF_NAME: &str = "my.cnf";

pub(crate) fn is_ca_properties(name: &str) -> bool {
    name.ends_with(".properties") && !CONFIG_FILES.contains(&name)
}

/// Writes components into a staging root.
#[derive(Debug)]
pub struct StagingBackup<'a> {
    config: &'a EngineConfig,
    root: &'a Path,
    layout: &'static ImageLayout,
}

impl<'a> StagingBackup<'a> {
    pub fn new(config: &'a EngineConfig, root: &'a Path, layout: &'static ImageLayout) -> Self {
        Self {
            config,
            root,
            layout,
        }
    }

    pub fn root(&self) -> &Path {
        self.root
    }

    fn folder(&self, component: ComponentType) -> PathBuf {
        match component.folder() {
            Some(folder) => self.root.join(folder),
            None => self.root.to_path_buf(),
        }
    }

    /// Write the `version` marker with the running gateway's build version.
    pub fn backup_version(&self) -> Result<()> {
        let path = self.root.join(VERSION_FILE);
        fs::write(&path, self.config.build_version.to_string())
            .map_err(|e| Error::io_at(&path, e))?;
        debug!(version = %self.config.build_version, "version marker staged");
        Ok(())
    }

    /// Copy the node configuration files that exist.
    pub fn backup_config(&self) -> Result<usize> {
        let conf_dir = self.config.conf_dir();
        if !conf_dir.is_dir() {
            return Err(Error::unavailable(
                ComponentType::Config,
                format!("{} does not exist", conf_dir.display()),
            ));
        }
        let copied = fsutil::replace_files(&conf_dir, &self.folder(ComponentType::Config), |name| {
            CONFIG_FILES.contains(&name)
        })?;
        Ok(copied.len())
    }

    /// Copy the files listed in the OS backup manifest, keeping their
    /// absolute paths beneath the `os/` folder.
    ///
    /// An absent or empty manifest captures nothing and is not an error.
    pub fn backup_os(&self) -> Result<usize> {
        if !self.config.appliance_dir.is_dir() {
            return Err(Error::unavailable(
                ComponentType::Os,
                format!(
                    "no appliance layer at {}",
                    self.config.appliance_dir.display()
                ),
            ));
        }
        let manifest = self.config.os_manifest();
        let entries = gw_image::read_list_file(&manifest)?;
        if entries.is_empty() {
            info!(manifest = %manifest.display(), "os backup manifest is empty");
            return Ok(0);
        }

        let os_folder = self.folder(ComponentType::Os);
        fsutil::remove_tree(&os_folder)?;
        let mut count = 0;
        for entry in &entries {
            let source = fsutil::under_root(&self.config.os_root, Path::new(entry));
            let dest = fsutil::under_root(&os_folder, Path::new(entry));
            if source.is_file() {
                fsutil::copy_file(&source, &dest)?;
                count += 1;
            } else if source.is_dir() {
                count += fsutil::copy_tree(&source, &dest)?;
            } else {
                warn!(path = %source.display(), "os manifest entry does not exist, skipping");
            }
        }
        Ok(count)
    }

    /// Copy custom assertion jars and their property files.
    pub fn backup_ca(&self) -> Result<usize> {
        let props = fsutil::replace_files(
            &self.config.conf_dir(),
            &self.root.join(self.layout.ca_properties_dir),
            is_ca_properties,
        )?;
        let jars = fsutil::replace_files(
            &self.config.gateway_home.join(CA_JAR_DIR),
            &self.folder(ComponentType::Ca),
            |name| name.ends_with(".jar"),
        )?;
        Ok(props.len() + jars.len())
    }

    /// Copy modular assertion archives.
    pub fn backup_ma(&self) -> Result<usize> {
        let copied = fsutil::replace_files(
            &self.config.gateway_home.join(MA_AAR_DIR),
            &self.folder(ComponentType::Ma),
            |name| name.ends_with(".aar"),
        )?;
        Ok(copied.len())
    }

    /// Copy extension libraries (files only, not recursive).
    pub fn backup_ext(&self) -> Result<usize> {
        let copied = fsutil::replace_files(
            &self.config.gateway_home.join(LIB_EXT_DIR),
            &self.folder(ComponentType::Ext),
            |_| true,
        )?;
        Ok(copied.len())
    }

    /// Copy the Enterprise Service Manager data trees.
    pub fn backup_esm(&self) -> Result<usize> {
        let esm_home = self.config.esm_home();
        if !esm_home.is_dir() {
            return Err(Error::unavailable(
                ComponentType::Esm,
                format!("{} does not exist", esm_home.display()),
            ));
        }
        let folder = self.folder(ComponentType::Esm);
        fsutil::remove_tree(&folder)?;
        let mut count = 0;
        for dir in ESM_DIRS {
            let source = esm_home.join(dir);
            if source.is_dir() {
                count += fsutil::copy_tree(&source, &folder.join(dir))?;
            }
        }
        Ok(count)
    }

    /// Have the database client dump the main database, and keep my.cnf
    /// next to it.
    pub fn backup_main_db(&self, client: &dyn DatabaseClient, db: &DatabaseConfig) -> Result<()> {
        check_client(ComponentType::MainDb, client, db)?;
        let dest = self.root.join(self.layout.main_db_dump);
        let my_cnf_dest = self.root.join(MAIN_DB_FOLDER).join(MY_CNF_NAME);
        fsutil::remove_file(&dest)?;
        fsutil::remove_file(&my_cnf_dest)?;
        ensure_parent(&dest)?;
        client
            .dump_main(db, &dest)
            .map_err(|e| Error::unavailable(ComponentType::MainDb, e.to_string()))?;

        let my_cnf = &self.config.my_cnf;
        if my_cnf.is_file() {
            fsutil::copy_file(my_cnf, &my_cnf_dest)?;
        } else {
            debug!(path = %my_cnf.display(), "no my.cnf to capture");
        }
        Ok(())
    }

    /// Have the database client dump the audit tables.
    pub fn backup_audits(&self, client: &dyn DatabaseClient, db: &DatabaseConfig) -> Result<()> {
        check_client(ComponentType::Audits, client, db)?;
        let dest = self.root.join(self.layout.audit_db_dump);
        fsutil::remove_file(&dest)?;
        ensure_parent(&dest)?;
        client
            .dump_audits(db, &dest)
            .map_err(|e| Error::unavailable(ComponentType::Audits, e.to_string()))
    }
}

fn check_client(
    component: ComponentType,
    client: &dyn DatabaseClient,
    db: &DatabaseConfig,
) -> Result<()> {
    if !client.is_available() {
        return Err(Error::unavailable(component, "no database client is available"));
    }
    if !db.is_local() {
        return Err(Error::unavailable(
            component,
            format!("database host {} is not local", db.host),
        ));
    }
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io_at(parent, e))?;
    }
    Ok(())
}
