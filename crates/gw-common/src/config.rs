//! Engine configuration.
//!
//! Everything the engine needs to know about its environment is gathered
//! once at process start into an [`EngineConfig`] and passed by reference
//! to each component. Nothing inside the engine reads process-wide state.
//!
//! Resolution order (highest to lowest priority):
//! 1. Explicit CLI flags (via [`ConfigOptions`])
//! 2. Environment variables (`GW_BUILD_VERSION`, `GW_SKIP_VERSION_CHECK`, ...)
//! 3. TOML config file (`--config-file` or `GW_BACKUP_CONFIG`)
//! 4. Built-in defaults, and the gateway's `runtime/VERSION` file for the
//!    build version

use crate::error::{Error, Result};
use crate::layout;
use crate::version::ProductVersion;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default SecureSpan installation root.
pub const DEFAULT_SECURE_SPAN_HOME: &str = "/opt/SecureSpan";

/// Build version file inside the gateway home.
pub const BUILD_VERSION_FILE: &str = "runtime/VERSION";

/// Durable state directory inside the gateway home.
pub const DEFAULT_VAR_DIR: &str = "config/backup/var";

/// Errors that can occur while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("cannot determine gateway build version (looked in {path})")]
    MissingBuildVersion { path: PathBuf },
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

/// Resolved engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// SecureSpan installation root (contains `Gateway/` and optionally `EnterpriseManager/`).
    pub secure_span_home: PathBuf,
    /// Gateway home.
    pub gateway_home: PathBuf,
    /// Build version of the running gateway.
    pub build_version: ProductVersion,
    /// Skip the supported-version check.
    pub skip_version_check: bool,
    /// Keep image names exactly as supplied.
    pub no_unique_image_name: bool,
    /// Root that OS restore destinations are resolved against.
    pub os_root: PathBuf,
    /// Durable directory for state that must survive a restart.
    pub var_dir: PathBuf,
    /// Appliance layer; OS backup only happens when it exists.
    pub appliance_dir: PathBuf,
    /// Database server config captured with the main db.
    pub my_cnf: PathBuf,
    /// Present while the ESM is running.
    pub esm_pid_file: PathBuf,
}

impl EngineConfig {
    /// Create a configuration with defaults derived from the SecureSpan home.
    pub fn new(secure_span_home: impl Into<PathBuf>, build_version: ProductVersion) -> Self {
        let secure_span_home = secure_span_home.into();
        let gateway_home = secure_span_home.join(layout::GATEWAY);
        let var_dir = gateway_home.join(DEFAULT_VAR_DIR);
        Self {
            secure_span_home,
            gateway_home,
            build_version,
            skip_version_check: false,
            no_unique_image_name: false,
            os_root: PathBuf::from("/"),
            var_dir,
            appliance_dir: PathBuf::from(layout::OPT_SECURE_SPAN_APPLIANCE),
            my_cnf: PathBuf::from(layout::MY_CNF),
            esm_pid_file: PathBuf::from(layout::ESM_PID_FILE),
        }
    }

    /// Set the OS restore root.
    pub fn with_os_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.os_root = root.into();
        self
    }

    /// Set the durable state directory.
    pub fn with_var_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.var_dir = dir.into();
        self
    }

    /// Set the appliance directory.
    pub fn with_appliance_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.appliance_dir = dir.into();
        self
    }

    /// Set the my.cnf location.
    pub fn with_my_cnf(mut self, path: impl Into<PathBuf>) -> Self {
        self.my_cnf = path.into();
        self
    }

    /// Set the ESM pid file location.
    pub fn with_esm_pid_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.esm_pid_file = path.into();
        self
    }

    /// Disable the unique image name policy.
    pub fn with_no_unique_image_name(mut self, enabled: bool) -> Self {
        self.no_unique_image_name = enabled;
        self
    }

    /// Skip the supported-version check.
    pub fn with_skip_version_check(mut self, enabled: bool) -> Self {
        self.skip_version_check = enabled;
        self
    }

    /// Live node configuration directory.
    pub fn conf_dir(&self) -> PathBuf {
        self.gateway_home.join(layout::NODE_CONF_DIR)
    }

    /// Enterprise Service Manager home.
    pub fn esm_home(&self) -> PathBuf {
        self.secure_span_home.join(layout::ENTERPRISE_SERVICE_MANAGER)
    }

    /// OS backup manifest location.
    pub fn os_manifest(&self) -> PathBuf {
        self.gateway_home.join(layout::OS_BACKUP_MANIFEST)
    }

    /// Whether the running gateway writes the post-5.0 layout.
    pub fn is_post_five_o(&self) -> bool {
        self.build_version.image_version() == crate::ImageVersion::AfterFiveO
    }

    /// Fail unless the running gateway is 5.0 or later.
    pub fn check_version(&self) -> Result<()> {
        if self.skip_version_check || self.build_version.is_supported() {
            return Ok(());
        }
        Err(Error::UnsupportedVersion {
            version: self.build_version.to_string(),
        })
    }

    /// Resolve configuration from options, the process environment and the
    /// optional config file.
    pub fn load(options: &ConfigOptions) -> std::result::Result<Self, ConfigError> {
        Self::resolve(options, |key| std::env::var(key).ok())
    }

    /// Resolve configuration with an explicit environment lookup.
    pub fn resolve<F>(options: &ConfigOptions, env: F) -> std::result::Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file_path = options
            .config_path
            .clone()
            .or_else(|| env("GW_BACKUP_CONFIG").map(PathBuf::from));
        let file = match file_path {
            Some(path) => ConfigFile::load(&path)?,
            None => ConfigFile::default(),
        };

        let secure_span_home = options
            .secure_span_home
            .clone()
            .or_else(|| env("GW_SECURESPAN_HOME").map(PathBuf::from))
            .or(file.secure_span_home.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SECURE_SPAN_HOME));
        let gateway_home = secure_span_home.join(layout::GATEWAY);

        let build_version = match options.build_version {
            Some(v) => v,
            None => match env("GW_BUILD_VERSION").or(file.build_version.clone()) {
                Some(raw) => parse_version("GW_BUILD_VERSION", &raw)?,
                None => read_build_version(&gateway_home)?,
            },
        };

        let mut config = EngineConfig::new(secure_span_home, build_version);

        config.skip_version_check = options.skip_version_check
            || env_flag(&env, "GW_SKIP_VERSION_CHECK")?
                .or(file.skip_version_check)
                .unwrap_or(false);
        config.no_unique_image_name = options.no_unique_image_name
            || env_flag(&env, "GW_NO_UNIQUE_IMAGE_NAME")?
                .or(file.no_unique_image_name)
                .unwrap_or(false);

        if let Some(root) = options.os_root.clone().or(file.os_root) {
            config.os_root = root;
        }
        if let Some(dir) = options.var_dir.clone().or(file.var_dir) {
            config.var_dir = dir;
        }
        if let Some(dir) = file.appliance_dir {
            config.appliance_dir = dir;
        }
        if let Some(path) = file.my_cnf {
            config.my_cnf = path;
        }
        if let Some(path) = file.esm_pid_file {
            config.esm_pid_file = path;
        }

        Ok(config)
    }
}

/// Explicit overrides, typically from CLI flags.
#[derive(Debug, Default, Clone)]
pub struct ConfigOptions {
    /// Config file path.
    pub config_path: Option<PathBuf>,
    /// SecureSpan home.
    pub secure_span_home: Option<PathBuf>,
    /// Build version override.
    pub build_version: Option<ProductVersion>,
    /// Force-skip the version check.
    pub skip_version_check: bool,
    /// Force-disable unique image names.
    pub no_unique_image_name: bool,
    /// OS restore root.
    pub os_root: Option<PathBuf>,
    /// Durable state directory.
    pub var_dir: Option<PathBuf>,
}

/// On-disk TOML shape. Every key is optional.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub secure_span_home: Option<PathBuf>,
    pub build_version: Option<String>,
    pub skip_version_check: Option<bool>,
    pub no_unique_image_name: Option<bool>,
    pub os_root: Option<PathBuf>,
    pub var_dir: Option<PathBuf>,
    pub appliance_dir: Option<PathBuf>,
    pub my_cnf: Option<PathBuf>,
    pub esm_pid_file: Option<PathBuf>,
}

impl ConfigFile {
    /// Load and parse a TOML config file.
    pub fn load(path: &Path) -> std::result::Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

fn parse_version(key: &str, raw: &str) -> std::result::Result<ProductVersion, ConfigError> {
    ProductVersion::parse(raw).ok_or_else(|| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

fn read_build_version(gateway_home: &Path) -> std::result::Result<ProductVersion, ConfigError> {
    let path = gateway_home.join(BUILD_VERSION_FILE);
    let raw = std::fs::read_to_string(&path)
        .map_err(|_| ConfigError::MissingBuildVersion { path: path.clone() })?;
    parse_version(BUILD_VERSION_FILE, &raw)
}

fn env_flag<F>(env: &F, key: &str) -> std::result::Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match env(key) {
        None => Ok(None),
        Some(val) => match val.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" | "" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: val,
            }),
        },
    }
}
