//! Validated option maps.
//!
//! The CLI (or any other front end) hands the engine a map of option name
//! to optional value, e.g. `-image -> /tmp/a.zip`, `-os -> None`. This
//! module interprets that map: which components are selected, FTP and
//! database parameters.

use gw_common::layout::{DEFAULT_DB_PORT, DEFAULT_FTP_PORT};
use gw_common::{ComponentType, Error, Result};
use gw_image::dir_part;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const IMAGE: &str = "-image";
pub const HALT: &str = "-halt";
pub const VERBOSE: &str = "-v";
pub const MIGRATE: &str = "-migrate";
pub const FTP_HOST: &str = "-ftp_host";
pub const FTP_USER: &str = "-ftp_user";
pub const FTP_PASS: &str = "-ftp_pass";
pub const DB_ADMIN_USER: &str = "-dbu";
pub const DB_ADMIN_PASS: &str = "-dbp";
pub const DB_HOST: &str = "-dbh";
pub const DB_NAME: &str = "-db";
pub const NEW_DB: &str = "-newdb";
pub const CLUSTER_PASS: &str = "-cp";
pub const GATEWAY_DB_USER: &str = "-gdbu";
pub const GATEWAY_DB_PASS: &str = "-gdbp";
pub const MAPPING: &str = "-mapping";

const FTP_PROTOCOL: &str = "ftp://";

/// Option name to optional value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionMap {
    values: BTreeMap<String, Option<String>>,
}

impl OptionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a flag without a value.
    pub fn flag(mut self, name: &str) -> Self {
        self.values.insert(name.to_string(), None);
        self
    }

    /// Add an option with a value.
    pub fn value(mut self, name: &str, value: impl Into<String>) -> Self {
        self.values.insert(name.to_string(), Some(value.into()));
        self
    }

    /// Add an option when a value is present.
    pub fn value_opt(self, name: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.value(name, v),
            None => self,
        }
    }

    /// Add a flag when `enabled`.
    pub fn flag_if(self, name: &str, enabled: bool) -> Self {
        if enabled {
            self.flag(name)
        } else {
            self
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Value of an option, if present with a value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(|v| v.as_deref())
    }

    /// Value of an option, ignoring blank values.
    pub fn get_non_blank(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.trim().is_empty())
    }

    /// Value of a mandatory option.
    pub fn require(&self, name: &str, reason: &str) -> Result<&str> {
        self.get_non_blank(name).ok_or_else(|| Error::MissingOption {
            option: name.to_string(),
            reason: reason.to_string(),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Which components an operation runs, and whether they are required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentSelection {
    selective: bool,
    components: Vec<ComponentType>,
}

impl ComponentSelection {
    /// Flagged components when any component flag is present; otherwise
    /// every selectable component except ESM, which is explicit only.
    pub fn from_options(options: &OptionMap) -> Self {
        let flagged: Vec<ComponentType> = ComponentType::ALL
            .iter()
            .copied()
            .filter(|c| c.option_name().is_some_and(|name| options.contains(&name)))
            .collect();
        if !flagged.is_empty() {
            return Self {
                selective: true,
                components: flagged,
            };
        }
        let components = ComponentType::ALL
            .iter()
            .copied()
            .filter(|c| ComponentType::SELECTABLE.contains(c) && *c != ComponentType::Esm)
            .collect();
        Self {
            selective: false,
            components,
        }
    }

    pub fn is_selective(&self) -> bool {
        self.selective
    }

    /// Selected components, in run order.
    pub fn components(&self) -> &[ComponentType] {
        &self.components
    }

    pub fn includes(&self, component: ComponentType) -> bool {
        self.components.contains(&component)
    }

    /// Whether failing to handle `component` is a failure rather than a skip.
    /// Only explicitly requested components are required.
    pub fn is_required(&self, component: ComponentType) -> bool {
        self.selective && self.includes(component)
    }

    /// Whether a database component runs.
    pub fn has_database(&self) -> bool {
        self.components.iter().any(|c| c.is_database())
    }
}

/// Split `host[:port]`, unbracketing IPv6 literals.
pub fn split_host_port(raw: &str, default_port: u16) -> Result<(String, u16)> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::InvalidArgument(
            "host cannot be an empty string".to_string(),
        ));
    }
    let invalid_port = |p: &str| Error::InvalidArgument(format!("invalid port '{}' in '{}'", p, raw));

    if let Some(rest) = raw.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| Error::InvalidArgument(format!("unterminated IPv6 literal '{}'", raw)))?;
        let port = match after.strip_prefix(':') {
            Some(p) => p.parse().map_err(|_| invalid_port(p))?,
            None if after.is_empty() => default_port,
            None => return Err(invalid_port(after)),
        };
        return Ok((host.to_string(), port));
    }

    // A bare IPv6 literal has several colons and no port.
    if raw.matches(':').count() > 1 {
        return Ok((raw.to_string(), default_port));
    }
    match raw.split_once(':') {
        Some((host, port)) => Ok((host.to_string(), port.parse().map_err(|_| invalid_port(port))?)),
        None => Ok((raw.to_string(), default_port)),
    }
}

/// Database host option (`-dbh host[:port]`), default port 3306.
pub fn db_host_and_port(raw: &str) -> Result<(String, u16)> {
    split_host_port(raw, DEFAULT_DB_PORT)
}

/// FTP destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing)]
    pub pass: String,
    /// Remote directory, the directory part of the image name.
    pub directory: Option<String>,
}

impl FtpConfig {
    /// FTP settings from the option map, or `None` when FTP was not
    /// requested. Host, user and password must be given together.
    pub fn from_options(options: &OptionMap, image_name: &str) -> Result<Option<Self>> {
        let host = options.get_non_blank(FTP_HOST);
        let user = options.get_non_blank(FTP_USER);
        let pass = options.get(FTP_PASS);
        let (host, user, pass) = match (host, user, pass) {
            (None, None, None) => return Ok(None),
            (Some(h), Some(u), Some(p)) => (h, u, p),
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "{}, {} and {} must be supplied together",
                    FTP_HOST, FTP_USER, FTP_PASS
                )))
            }
        };

        let without_scheme = host.strip_prefix(FTP_PROTOCOL).unwrap_or(host);
        let authority = without_scheme.split('/').next().unwrap_or(without_scheme);
        let (host, port) = split_host_port(authority, DEFAULT_FTP_PORT)?;

        Ok(Some(Self {
            host,
            port,
            user: user.to_string(),
            pass: pass.to_string(),
            directory: dir_part(image_name)
                .map_err(gw_common::Error::from)?
                .map(str::to_string),
        }))
    }

    /// `ftp://host:port` form of the destination.
    pub fn url(&self) -> String {
        if self.host.contains(':') {
            format!("{}[{}]:{}", FTP_PROTOCOL, self.host, self.port)
        } else {
            format!("{}{}:{}", FTP_PROTOCOL, self.host, self.port)
        }
    }
}

/// Database parameters given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbOptions {
    pub admin_user: Option<String>,
    pub admin_pass: Option<String>,
    pub host: Option<(String, u16)>,
    pub name: Option<String>,
    pub new_db: Option<String>,
    pub gateway_user: Option<String>,
    pub gateway_pass: Option<String>,
    pub cluster_pass: Option<String>,
    pub mapping: Option<PathBuf>,
}

impl DbOptions {
    pub fn from_options(options: &OptionMap) -> Result<Self> {
        let owned = |name: &str| options.get_non_blank(name).map(str::to_string);
        let host = match options.get_non_blank(DB_HOST) {
            Some(raw) => Some(db_host_and_port(raw)?),
            None => None,
        };
        Ok(Self {
            admin_user: owned(DB_ADMIN_USER),
            // An empty admin password is allowed.
            admin_pass: options.get(DB_ADMIN_PASS).map(str::to_string),
            host,
            name: owned(DB_NAME),
            new_db: owned(NEW_DB),
            gateway_user: owned(GATEWAY_DB_USER),
            gateway_pass: owned(GATEWAY_DB_PASS),
            cluster_pass: owned(CLUSTER_PASS),
            mapping: options.get_non_blank(MAPPING).map(PathBuf::from),
        })
    }

    /// Database name to use; `-newdb` wins over `-db`.
    pub fn database_name(&self) -> Option<&str> {
        self.new_db.as_deref().or(self.name.as_deref())
    }

    /// Whether a new database should be created.
    pub fn create_new_db(&self) -> bool {
        self.new_db.is_some()
    }

    /// Whether host, database, gateway credentials and cluster passphrase
    /// were all supplied.
    pub fn is_complete(&self) -> bool {
        self.missing().is_none()
    }

    /// Fail with the first missing parameter unless complete.
    pub fn require_complete(&self, reason: &str) -> Result<()> {
        match self.missing() {
            None => Ok(()),
            Some(option) => Err(Error::MissingOption {
                option: option.to_string(),
                reason: reason.to_string(),
            }),
        }
    }

    fn missing(&self) -> Option<&'static str> {
        if self.host.is_none() {
            Some(DB_HOST)
        } else if self.database_name().is_none() {
            Some(DB_NAME)
        } else if self.gateway_user.is_none() {
            Some(GATEWAY_DB_USER)
        } else if self.gateway_pass.is_none() {
            Some(GATEWAY_DB_PASS)
        } else if self.cluster_pass.is_none() {
            Some(CLUSTER_PASS)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_selective_excludes_esm() {
        let selection = ComponentSelection::from_options(&OptionMap::new().value(IMAGE, "a.zip"));
        assert!(!selection.is_selective());
        assert!(!selection.includes(ComponentType::Esm));
        assert!(selection.includes(ComponentType::Os));
        assert!(selection.includes(ComponentType::MainDb));
        assert!(!selection.is_required(ComponentType::Os));
    }

    #[test]
    fn test_selective_requires_flagged() {
        let options = OptionMap::new().flag("-os").flag("-esm").flag("-ca");
        let selection = ComponentSelection::from_options(&options);
        assert!(selection.is_selective());
        assert_eq!(
            selection.components(),
            &[ComponentType::Os, ComponentType::Ca, ComponentType::Esm]
        );
        assert!(selection.is_required(ComponentType::Esm));
        assert!(!selection.includes(ComponentType::Config));
        assert!(!selection.has_database());
    }

    #[test]
    fn test_db_host_and_port() {
        assert_eq!(db_host_and_port("db1").unwrap(), ("db1".to_string(), 3306));
        assert_eq!(db_host_and_port("db1:3307").unwrap(), ("db1".to_string(), 3307));
        assert_eq!(db_host_and_port("[::1]:3308").unwrap(), ("::1".to_string(), 3308));
        assert_eq!(db_host_and_port("[fe80::1]").unwrap(), ("fe80::1".to_string(), 3306));
        assert_eq!(db_host_and_port("fe80::1").unwrap(), ("fe80::1".to_string(), 3306));
        assert!(db_host_and_port("  ").is_err());
        assert!(db_host_and_port("db1:port").is_err());
    }

    #[test]
    fn test_ftp_all_or_none() {
        let none = OptionMap::new();
        assert_eq!(FtpConfig::from_options(&none, "a.zip").unwrap(), None);

        let partial = OptionMap::new().value(FTP_HOST, "ftp.example.com");
        let err = FtpConfig::from_options(&partial, "a.zip").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_ftp_config() {
        let options = OptionMap::new()
            .value(FTP_HOST, "ftp.example.com:2121")
            .value(FTP_USER, "backup")
            .value(FTP_PASS, "secret");
        let ftp = FtpConfig::from_options(&options, "incoming/images/node1.zip")
            .unwrap()
            .unwrap();
        assert_eq!(ftp.host, "ftp.example.com");
        assert_eq!(ftp.port, 2121);
        assert_eq!(ftp.directory.as_deref(), Some("incoming/images"));
        assert_eq!(ftp.url(), "ftp://ftp.example.com:2121");

        let options = OptionMap::new()
            .value(FTP_HOST, "ftp://ftp.example.com")
            .value(FTP_USER, "backup")
            .value(FTP_PASS, "");
        let ftp = FtpConfig::from_options(&options, "node1.zip").unwrap().unwrap();
        assert_eq!(ftp.port, 21);
        assert_eq!(ftp.directory, None);
    }

    #[test]
    fn test_db_options_completeness() {
        let options = OptionMap::new()
            .value(DB_ADMIN_USER, "root")
            .value(DB_HOST, "localhost")
            .value(NEW_DB, "ssg2")
            .value(GATEWAY_DB_USER, "gateway")
            .value(GATEWAY_DB_PASS, "7layer");
        let db = DbOptions::from_options(&options).unwrap();
        assert!(!db.is_complete());
        let err = db.require_complete("migrate").unwrap_err();
        assert!(matches!(err, Error::MissingOption { option, .. } if option == CLUSTER_PASS));

        let db = DbOptions::from_options(&options.value(CLUSTER_PASS, "pass")).unwrap();
        assert!(db.is_complete());
        assert_eq!(db.database_name(), Some("ssg2"));
        assert!(db.create_new_db());
        assert_eq!(db.host, Some(("localhost".to_string(), 3306)));
    }

    #[test]
    fn test_blank_values_ignored() {
        let options = OptionMap::new().value(DB_HOST, "db").value(DB_NAME, "   ");
        let db = DbOptions::from_options(&options).unwrap();
        assert_eq!(db.name, None);
        assert!(options.require(DB_NAME, "needed").is_err());
    }
}
