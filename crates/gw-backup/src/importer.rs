//! Import and migrate orchestration.
//!
//! Opens an image (downloading it first when FTP options are given),
//! restores the selected components through the strategy of the image's
//! layout era and stages OS files for the next start. Per-component
//! failures are folded into the result; `-halt` escalation happens once, at
//! the end.
//!
//! When a database component runs, the database settings come from, in
//! order: the command line (when complete), the image's node.properties,
//! and the restore host's node.properties.

use crate::db::{DatabaseClient, DatabaseConfig, LoadOptions, NodeProperties};
use crate::ftp::FtpTransport;
use crate::options::{
    ComponentSelection, DbOptions, FtpConfig, OptionMap, DB_ADMIN_USER, HALT, IMAGE, MAPPING,
    MIGRATE,
};
use crate::os_restore::DeferredFileApplier;
use crate::staging::StagingRestore;
use crate::strategy::Strategy;
use gw_common::layout::NODE_PROPERTIES;
use gw_common::{
    ComponentFailure, ComponentType, EngineConfig, Error, ImageVersion, OperationResult, Result,
};
use gw_image::{file_part, Image};
use std::path::PathBuf;
use tempfile::TempDir;
use tracing::{debug, error, info, info_span, warn};

/// Prefix of the directory a remote image is downloaded to.
pub const DOWNLOAD_PREFIX: &str = "gw-download-";

/// Restores an image into a live gateway.
pub struct Importer<'a> {
    config: &'a EngineConfig,
    db: &'a dyn DatabaseClient,
    ftp: &'a dyn FtpTransport,
}

/// Validated import request.
struct Request {
    image: String,
    halt: bool,
    migrate: bool,
    ftp: Option<FtpConfig>,
    selection: ComponentSelection,
    db: DbOptions,
}

impl Request {
    fn parse(options: &OptionMap) -> Result<Self> {
        let image = options
            .require(IMAGE, "name of the image file to restore")?
            .to_string();
        let migrate = options.contains(MIGRATE);
        let ftp = FtpConfig::from_options(options, &image)?;
        if migrate && ftp.is_some() {
            return Err(Error::InvalidArgument(
                "FTP options cannot be used with -migrate".to_string(),
            ));
        }
        let selection = ComponentSelection::from_options(options);
        let db = DbOptions::from_options(options)?;

        if selection.has_database() && db.admin_user.is_none() {
            return Err(Error::MissingOption {
                option: DB_ADMIN_USER.to_string(),
                reason: "needed to restore the database".to_string(),
            });
        }
        if migrate {
            db.require_complete("needed by -migrate")?;
        }
        if let Some(mapping) = &db.mapping {
            if !mapping.is_file() {
                return Err(Error::InvalidArgument(format!(
                    "{} file {} does not exist",
                    MAPPING,
                    mapping.display()
                )));
            }
        }

        Ok(Self {
            image,
            halt: options.contains(HALT),
            migrate,
            ftp,
            selection,
            db,
        })
    }

    fn is_db_active(&self) -> bool {
        self.selection.has_database()
    }
}

impl<'a> Importer<'a> {
    /// Fails unless the running gateway is a supported version.
    pub fn new(
        config: &'a EngineConfig,
        db: &'a dyn DatabaseClient,
        ftp: &'a dyn FtpTransport,
    ) -> Result<Self> {
        config.check_version()?;
        Ok(Self { config, db, ftp })
    }

    /// Run an import (or a migrate, with `-migrate`).
    pub fn import(&self, options: &OptionMap) -> OperationResult {
        let _span = info_span!("import").entered();
        let mut failures = Vec::new();
        match self.try_import(options, &mut failures) {
            Ok(result) => {
                info!(
                    status = %result.status(),
                    restored = result.restored_components().len(),
                    failed = result.failed_components().len(),
                    reboot_maybe_required = result.reboot_maybe_required(),
                    "import finished"
                );
                result
            }
            Err(err) => {
                error!(error = %err, code = err.code(), "import failed");
                OperationResult::failure(&err, failures)
            }
        }
    }

    fn try_import(
        &self,
        options: &OptionMap,
        failures: &mut Vec<ComponentFailure>,
    ) -> Result<OperationResult> {
        let request = Request::parse(options)?;

        if request.selection.includes(ComponentType::Esm) && self.config.esm_pid_file.exists() {
            return Err(Error::Config(format!(
                "the Enterprise Service Manager is running ({} exists); stop it before restoring",
                self.config.esm_pid_file.display()
            )));
        }

        let (path, download_dir) = self.fetch(&request)?;
        let mut image = Image::open(&path)?;
        let outcome = self.restore_image(&image, &request, failures);
        let released = image.release();
        if let Some(dir) = download_dir {
            dir.close().map_err(Error::Io)?;
        }
        let result = outcome?;
        released?;
        Ok(result)
    }

    /// Local path of the image, downloading it when FTP was requested.
    fn fetch(&self, request: &Request) -> Result<(PathBuf, Option<TempDir>)> {
        match &request.ftp {
            Some(ftp) => {
                let dir = tempfile::Builder::new().prefix(DOWNLOAD_PREFIX).tempdir()?;
                let local = dir.path().join(file_part(&request.image)?);
                self.ftp
                    .download(ftp, &request.image, &local)
                    .map_err(|e| match e {
                        Error::Transfer(_) => e,
                        other => Error::Transfer(other.to_string()),
                    })?;
                info!(url = %ftp.url(), remote = %request.image, "image downloaded");
                Ok((local, Some(dir)))
            }
            None => {
                let path = PathBuf::from(&request.image);
                if !path.is_file() {
                    return Err(Error::InvalidArgument(format!(
                        "image file {} does not exist",
                        path.display()
                    )));
                }
                Ok((path, None))
            }
        }
    }

    fn restore_image(
        &self,
        image: &Image,
        request: &Request,
        failures: &mut Vec<ComponentFailure>,
    ) -> Result<OperationResult> {
        let strategy = Strategy::select(image.version());
        let restore = strategy.restore(self.config, image);
        info!(
            strategy = %strategy,
            image_version = %image.version(),
            migrate = request.migrate,
            selective = request.selection.is_selective(),
            "restoring image"
        );

        let identity = if request.is_db_active() {
            Some(self.resolve_node_properties(&restore, request)?)
        } else {
            None
        };
        let db_config = match &identity {
            Some(props) => Some(
                DatabaseConfig::from_properties(props)?
                    .with_admin(request.db.admin_user.clone(), request.db.admin_pass.clone()),
            ),
            None => None,
        };
        let load = LoadOptions {
            create_new_db: request.db.create_new_db(),
            mapping: request.db.mapping.clone(),
            migrate: request.migrate,
        };
        let exclude_identity = request.is_db_active() || request.migrate;

        let mut restored = Vec::new();
        let mut reboot_maybe_required = false;

        for &component in request.selection.components() {
            let step = match component {
                ComponentType::Config => restore.restore_config(request.migrate, exclude_identity),
                ComponentType::MainDb | ComponentType::Audits => match &db_config {
                    Some(db) if component == ComponentType::MainDb => {
                        restore.restore_main_db(self.db, db, &load).map(|()| 1)
                    }
                    Some(db) => restore.restore_audits(self.db, db, &load).map(|()| 1),
                    None => Err(Error::unavailable(component, "no database configuration")),
                },
                ComponentType::Os => {
                    let staged = DeferredFileApplier::from_config(self.config).stage_from_image(image);
                    if staged.is_ok() {
                        reboot_maybe_required = true;
                    }
                    staged
                }
                ComponentType::Ca => restore.restore_ca(),
                ComponentType::Ma => restore.restore_ma(),
                ComponentType::Ext => restore.restore_ext(),
                ComponentType::Esm => restore.restore_esm(),
                ComponentType::Version | ComponentType::NodeIdentity => continue,
            };

            match step {
                Ok(files) => {
                    info!(
                        target: "import.component",
                        component = %component,
                        files,
                        "restored {}",
                        component.description()
                    );
                    restored.push(component);
                }
                Err(err) if err.aborts_component_step() => return Err(err),
                Err(err) => {
                    // A fault is recorded even for a component nobody asked for.
                    if request.selection.is_required(component) || err.is_fatal() {
                        warn!(
                            target: "import.component",
                            component = %component,
                            reason = %err,
                            "component not restored"
                        );
                        failures.push(ComponentFailure::new(component, err.to_string()));
                    } else {
                        info!(
                            target: "import.component",
                            component = %component,
                            reason = %err,
                            "component skipped"
                        );
                    }
                }
            }
        }

        if let Some(props) = &identity {
            let files = restore.restore_node_identity(props, request.migrate)?;
            info!(
                target: "import.component",
                component = %ComponentType::NodeIdentity,
                files,
                "restored {}",
                ComponentType::NodeIdentity.description()
            );
            restored.push(ComponentType::NodeIdentity);
        }

        Ok(
            OperationResult::from_failures(std::mem::take(failures), request.halt)
                .with_restored(restored)
                .with_reboot_maybe_required(reboot_maybe_required),
        )
    }

    /// node.properties the restored node will run with.
    fn resolve_node_properties(
        &self,
        restore: &StagingRestore<'_>,
        request: &Request,
    ) -> Result<NodeProperties> {
        let complete = request.db.is_complete();
        let image_usable = restore.image().version() == ImageVersion::AfterFiveO
            && !request.migrate
            && (!request.selection.is_selective()
                || request.selection.includes(ComponentType::Config));

        if image_usable {
            if let Some(path) = restore.image_node_properties()? {
                let mut props = NodeProperties::load(&path)?;
                if complete {
                    props.apply_options(&request.db);
                }
                debug!(source = "image", merged_cli = complete, "database settings resolved");
                return Ok(props);
            }
        }

        let host = self.config.conf_dir().join(NODE_PROPERTIES);
        let mut props = if host.is_file() {
            NodeProperties::load(&host)?
        } else if complete {
            NodeProperties::new()
        } else {
            return Err(Error::Config(format!(
                "{} not found and the database options are incomplete",
                host.display()
            )));
        };
        if complete {
            props.apply_options(&request.db);
        }
        debug!(source = "host", merged_cli = complete, "database settings resolved");
        Ok(props)
    }
}
