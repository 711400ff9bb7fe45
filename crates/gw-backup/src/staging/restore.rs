//! Import side: copy components out of an opened image into the live
//! environment.
//!
//! Paths that moved between layout eras are looked up in the
//! [`ImageLayout`] of the image's strategy.

use super::backup::is_ca_properties;
use crate::db::{apply_dump, DatabaseClient, DatabaseConfig, LoadOptions, NodeProperties};
use crate::fsutil;
use crate::strategy::ImageLayout;
use gw_common::layout::{
    CA_JAR_DIR, CONFIG_FILES, ESM_DIRS, LIB_EXT_DIR, MA_AAR_DIR, NODE_IDENTITY_FILES,
    NODE_PROPERTIES, OMP_DAT,
};
use gw_common::{ComponentType, EngineConfig, Error, Result};
use gw_image::Image;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// Restores components from an image.
#[derive(Debug)]
pub struct StagingRestore<'a> {
    config: &'a EngineConfig,
    image: &'a Image,
    layout: &'static ImageLayout,
}

impl<'a> StagingRestore<'a> {
    pub fn new(config: &'a EngineConfig, image: &'a Image, layout: &'static ImageLayout) -> Self {
        Self {
            config,
            image,
            layout,
        }
    }

    fn require_dir(&self, component: ComponentType) -> Result<PathBuf> {
        self.image
            .component_dir(component)?
            .ok_or_else(|| Error::unavailable(component, "not present in image"))
    }

    /// Restore node configuration files.
    ///
    /// A migrate first deletes the destination's non-identity config files.
    /// With `exclude_identity`, node.properties and omp.dat are never copied.
    pub fn restore_config(&self, is_migrate: bool, exclude_identity: bool) -> Result<usize> {
        let source = self.require_dir(ComponentType::Config)?;
        let conf_dir = self.config.conf_dir();

        if is_migrate {
            for name in CONFIG_FILES.iter().filter(|n| !NODE_IDENTITY_FILES.contains(n)) {
                let path = conf_dir.join(name);
                if path.is_file() {
                    fs::remove_file(&path).map_err(|e| Error::io_at(&path, e))?;
                    debug!(path = %path.display(), "removed config file before migrate");
                }
            }
        }

        let copied = fsutil::copy_files(&source, &conf_dir, |name| {
            CONFIG_FILES.contains(&name) && !(exclude_identity && NODE_IDENTITY_FILES.contains(&name))
        })?;
        Ok(copied.len())
    }

    /// Restore custom assertion jars and property files.
    pub fn restore_ca(&self) -> Result<usize> {
        let props_dir = self.image.root()?.join(self.layout.ca_properties_dir);
        let jar_dir = self.image.component_dir(ComponentType::Ca)?;
        let props = fsutil::files_in(&props_dir, is_ca_properties)?;
        if jar_dir.is_none() && props.is_empty() {
            return Err(Error::unavailable(ComponentType::Ca, "not present in image"));
        }

        let props = fsutil::copy_files(&props_dir, &self.config.conf_dir(), is_ca_properties)?;
        let jars = match jar_dir {
            Some(dir) => fsutil::copy_files(
                &dir,
                &self.config.gateway_home.join(CA_JAR_DIR),
                |name| name.ends_with(".jar"),
            )?,
            None => Vec::new(),
        };
        Ok(props.len() + jars.len())
    }

    /// Restore modular assertion archives.
    pub fn restore_ma(&self) -> Result<usize> {
        let source = self.require_dir(ComponentType::Ma)?;
        let copied = fsutil::copy_files(&source, &self.config.gateway_home.join(MA_AAR_DIR), |name| {
            name.ends_with(".aar")
        })?;
        Ok(copied.len())
    }

    /// Restore extension libraries.
    pub fn restore_ext(&self) -> Result<usize> {
        let source = self.require_dir(ComponentType::Ext)?;
        let copied =
            fsutil::copy_files(&source, &self.config.gateway_home.join(LIB_EXT_DIR), |_| true)?;
        Ok(copied.len())
    }

    /// Restore the Enterprise Service Manager data trees.
    ///
    /// The caller refuses the restore while the ESM is running.
    pub fn restore_esm(&self) -> Result<usize> {
        let source = self.require_dir(ComponentType::Esm)?;
        let esm_home = self.config.esm_home();
        if !esm_home.is_dir() {
            return Err(Error::unavailable(
                ComponentType::Esm,
                format!("{} does not exist", esm_home.display()),
            ));
        }
        let mut count = 0;
        for dir in ESM_DIRS {
            let from = source.join(dir);
            if from.is_dir() {
                count += fsutil::copy_tree(&from, &esm_home.join(dir))?;
            }
        }
        Ok(count)
    }

    /// Load the main database dump.
    pub fn restore_main_db(
        &self,
        client: &dyn DatabaseClient,
        db: &DatabaseConfig,
        options: &LoadOptions,
    ) -> Result<()> {
        self.load_dump(ComponentType::MainDb, self.layout.main_db_dump, client, db, options)
    }

    /// Load the audit tables dump.
    pub fn restore_audits(
        &self,
        client: &dyn DatabaseClient,
        db: &DatabaseConfig,
        options: &LoadOptions,
    ) -> Result<()> {
        self.load_dump(ComponentType::Audits, self.layout.audit_db_dump, client, db, options)
    }

    fn load_dump(
        &self,
        component: ComponentType,
        entry: &str,
        client: &dyn DatabaseClient,
        db: &DatabaseConfig,
        options: &LoadOptions,
    ) -> Result<()> {
        let dump_path = self.image.root()?.join(entry);
        if !dump_path.is_file() {
            return Err(Error::unavailable(component, "not present in image"));
        }
        if !client.is_available() {
            return Err(Error::unavailable(component, "no database client is available"));
        }
        let bytes = fs::read(&dump_path).map_err(|e| Error::io_at(&dump_path, e))?;
        let dump = String::from_utf8(bytes).map_err(|e| {
            Error::Database(format!(
                "{} dump is not valid UTF-8 (byte offset {})",
                component,
                e.utf8_error().valid_up_to()
            ))
        })?;
        apply_dump(client, db, &dump, options)?;
        info!(component = %component, entry, "database dump restored");
        Ok(())
    }

    /// Write the resolved node.properties, and omp.dat from the image
    /// unless this is a migrate.
    pub fn restore_node_identity(&self, props: &NodeProperties, is_migrate: bool) -> Result<usize> {
        let conf_dir = self.config.conf_dir();
        let omp_dest = conf_dir.join(OMP_DAT);
        let mut count = 1;

        if !is_migrate {
            if let Some(source) = self.image.config_folder()? {
                let omp = source.join(OMP_DAT);
                if omp.is_file() {
                    fsutil::copy_file(&omp, &omp_dest)?;
                    count += 1;
                }
            }
        }
        if !omp_dest.is_file() {
            return Err(Error::MissingNodeIdentity { path: omp_dest });
        }
        props.write(&conf_dir.join(NODE_PROPERTIES))?;
        Ok(count)
    }

    /// node.properties stored in the image, if any.
    pub fn image_node_properties(&self) -> Result<Option<PathBuf>> {
        Ok(self
            .image
            .config_folder()?
            .map(|dir| dir.join(NODE_PROPERTIES))
            .filter(|p: &PathBuf| p.is_file()))
    }

    pub fn image(&self) -> &Image {
        self.image
    }
}
