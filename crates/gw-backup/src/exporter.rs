//! Export orchestration.
//!
//! Validates the option map, stages the selected components, and builds
//! the image locally or uploads it over FTP. Components that cannot be
//! captured are collected, not thrown; the final status is decided once by
//! [`escalate`] before any archive is written.

use crate::db::{DatabaseClient, DatabaseConfig, NodeProperties};
use crate::ftp::FtpTransport;
use crate::options::{ComponentSelection, FtpConfig, OptionMap, HALT, IMAGE};
use crate::staging::StagingArea;
use crate::strategy::Strategy;
use gw_common::layout::{NODE_PROPERTIES, POST_FIVE_O_DEFAULT_BACKUP_FOLDER};
use gw_common::{
    escalate, ComponentFailure, ComponentType, EngineConfig, Error, OperationResult, Result,
    Status,
};
use gw_image::{file_part, write_image, ArchiveWriter, NamingPolicy};
use std::path::{Path, PathBuf};
use tracing::{error, info, info_span, warn};

/// Prefix of the directory an image is written to before upload.
pub const UPLOAD_PREFIX: &str = "gw-upload-";

/// Captures a live gateway into an image.
pub struct Exporter<'a> {
    config: &'a EngineConfig,
    db: &'a dyn DatabaseClient,
    ftp: &'a dyn FtpTransport,
}

/// Where the built image goes.
enum Destination {
    Local { path: PathBuf },
    Ftp { config: FtpConfig, remote_name: String },
}

impl<'a> Exporter<'a> {
    /// Fails unless the running gateway is a supported version.
    pub fn new(
        config: &'a EngineConfig,
        db: &'a dyn DatabaseClient,
        ftp: &'a dyn FtpTransport,
    ) -> Result<Self> {
        config.check_version()?;
        Ok(Self { config, db, ftp })
    }

    /// Run an export. Never panics on bad input; every outcome is a result.
    pub fn export(&self, options: &OptionMap) -> OperationResult {
        let _span = info_span!("export").entered();
        let mut failures = Vec::new();
        match self.try_export(options, &mut failures) {
            Ok(result) => {
                info!(
                    status = %result.status(),
                    failed = result.failed_components().len(),
                    "export finished"
                );
                result
            }
            Err(err) => {
                error!(error = %err, code = err.code(), "export failed");
                OperationResult::failure(&err, failures)
            }
        }
    }

    fn try_export(
        &self,
        options: &OptionMap,
        failures: &mut Vec<ComponentFailure>,
    ) -> Result<OperationResult> {
        let image = options.require(IMAGE, "name of the image file to create")?;
        let halt = options.contains(HALT);
        let ftp = FtpConfig::from_options(options, image)?;
        let selection = ComponentSelection::from_options(options);

        let node_properties = self.config.conf_dir().join(NODE_PROPERTIES);
        if !node_properties.is_file() {
            return Err(Error::Config(format!(
                "{} not found; this host is not a configured gateway node",
                node_properties.display()
            )));
        }

        let policy = match ftp {
            Some(_) => NamingPolicy::ftp(),
            None => NamingPolicy::local(
                self.config
                    .is_post_five_o()
                    .then(|| self.config.gateway_home.join(POST_FIVE_O_DEFAULT_BACKUP_FOLDER)),
            ),
        }
        .with_unique(!self.config.no_unique_image_name);
        let writer = ArchiveWriter::new(policy);

        let destination = match ftp {
            Some(config) => Destination::Ftp {
                remote_name: writer.policy().image_name(image)?,
                config,
            },
            None => {
                let path = writer.resolve_target(image)?;
                check_writable(&path)?;
                Destination::Local { path }
            }
        };

        let mut staging = StagingArea::new()?;
        let outcome = self.stage_and_build(
            &mut staging,
            &selection,
            halt,
            &writer,
            &destination,
            failures,
        );
        let released = staging.release();
        let result = outcome?;
        released?;
        Ok(result)
    }

    fn stage_and_build(
        &self,
        staging: &mut StagingArea,
        selection: &ComponentSelection,
        halt: bool,
        writer: &ArchiveWriter,
        destination: &Destination,
        failures: &mut Vec<ComponentFailure>,
    ) -> Result<OperationResult> {
        let strategy = Strategy::select(self.config.build_version.image_version());
        let root = staging.root()?.to_path_buf();
        let backup = strategy.backup(self.config, &root);
        info!(strategy = %strategy, selective = selection.is_selective(), "staging export");

        backup.backup_version()?;
        staging.mark_written(ComponentType::Version);

        for &component in selection.components() {
            let step = match component {
                ComponentType::Config => backup.backup_config(),
                ComponentType::Os => backup.backup_os().and_then(|count| {
                    if count == 0 && selection.is_required(ComponentType::Os) {
                        Err(Error::unavailable(
                            ComponentType::Os,
                            "no OS files were captured",
                        ))
                    } else {
                        Ok(count)
                    }
                }),
                ComponentType::Ca => backup.backup_ca(),
                ComponentType::Ma => backup.backup_ma(),
                ComponentType::Ext => backup.backup_ext(),
                ComponentType::Esm => backup.backup_esm(),
                ComponentType::MainDb => self
                    .live_db_config(component)
                    .and_then(|db| backup.backup_main_db(self.db, &db))
                    .map(|()| 1),
                ComponentType::Audits => self
                    .live_db_config(component)
                    .and_then(|db| backup.backup_audits(self.db, &db))
                    .map(|()| 1),
                ComponentType::Version | ComponentType::NodeIdentity => continue,
            };

            match step {
                Ok(files) => {
                    info!(
                        target: "export.component",
                        component = %component,
                        files,
                        "captured {}",
                        component.description()
                    );
                    staging.mark_written(component);
                }
                Err(err) if err.aborts_component_step() => return Err(err),
                Err(err) => {
                    // A fault is recorded even for a component nobody asked for.
                    if selection.is_required(component) || err.is_fatal() {
                        warn!(
                            target: "export.component",
                            component = %component,
                            reason = %err,
                            "component not captured"
                        );
                        failures.push(ComponentFailure::new(component, err.to_string()));
                    } else {
                        info!(
                            target: "export.component",
                            component = %component,
                            reason = %err,
                            "component skipped"
                        );
                    }
                }
            }
        }

        let (status, cause) = escalate(failures, halt);
        if status == Status::Failure {
            if let Some(cause) = &cause {
                warn!(error = %cause, "halting before the image is written");
            }
            return Ok(OperationResult::from_failures(std::mem::take(failures), halt));
        }

        let artifact = match destination {
            Destination::Local { path } => writer.build_at(&root, path.clone())?.path,
            Destination::Ftp {
                config,
                remote_name,
            } => {
                self.upload(&root, config, remote_name)?;
                PathBuf::from(remote_name)
            }
        };

        Ok(OperationResult::from_failures(std::mem::take(failures), halt).with_artifact(artifact))
    }

    fn upload(&self, staging_root: &Path, config: &FtpConfig, remote_name: &str) -> Result<()> {
        let dir = tempfile::Builder::new().prefix(UPLOAD_PREFIX).tempdir()?;
        let local = dir.path().join(file_part(remote_name)?);
        write_image(staging_root, &local)?;
        self.ftp
            .upload(&local, config, remote_name)
            .map_err(|e| match e {
                Error::Transfer(_) => e,
                other => Error::Transfer(other.to_string()),
            })?;
        info!(
            target: "export.upload",
            url = %config.url(),
            remote = remote_name,
            "image uploaded"
        );
        dir.close().map_err(Error::Io)?;
        Ok(())
    }

    /// Database settings of the running node.
    fn live_db_config(&self, component: ComponentType) -> Result<DatabaseConfig> {
        let path = self.config.conf_dir().join(NODE_PROPERTIES);
        NodeProperties::load(&path)
            .and_then(|props| DatabaseConfig::from_properties(&props))
            .map_err(|e| Error::unavailable(component, e.to_string()))
    }
}

/// Fail early when the image directory exists but cannot be written.
fn check_writable(target: &Path) -> Result<()> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match std::fs::metadata(dir) {
        Ok(meta) if !meta.is_dir() => Err(Error::InvalidArgument(format!(
            "{} is not a directory",
            dir.display()
        ))),
        Ok(meta) if meta.permissions().readonly() => Err(Error::InvalidArgument(format!(
            "cannot write to directory {}",
            dir.display()
        ))),
        _ => Ok(()),
    }
}
