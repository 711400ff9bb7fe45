//! Database bridge.
//!
//! Dumping and loading are done by an external client behind
//! [`DatabaseClient`]. This module owns what happens around it:
//! - Repairing dump escaping before a load ([`fix_dump_escaping`])
//! - Reading and rewriting `node.properties`
//! - Driving an all-or-nothing load ([`apply_dump`])

use crate::options::DbOptions;
use gw_common::layout::DEFAULT_DB_PORT;
use gw_common::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DB_HOST_KEY: &str = "node.db.config.main.host";
pub const DB_PORT_KEY: &str = "node.db.config.main.port";
pub const DB_NAME_KEY: &str = "node.db.config.main.name";
pub const DB_USER_KEY: &str = "node.db.config.main.user";
pub const DB_PASS_KEY: &str = "node.db.config.main.pass";
pub const CLUSTER_PASS_KEY: &str = "node.cluster.pass";

/// Two-character escapes a dump may already contain.
const RECOGNIZED_ESCAPES: [char; 5] = ['r', 'n', '\'', '"', '\\'];

/// Double every backslash that does not start a recognized escape
/// (`\r`, `\n`, `\'`, `\"`, `\\`).
///
/// Idempotent: the output only contains recognized escapes.
///
/// ```
/// use gw_backup::db::fix_dump_escaping;
///
/// assert_eq!(fix_dump_escaping(Some(r"foo\bar")).as_deref(), Some(r"foo\\bar"));
/// assert_eq!(fix_dump_escaping(Some(r"a\nb")).as_deref(), Some(r"a\nb"));
/// assert_eq!(fix_dump_escaping(None), None);
/// ```
pub fn fix_dump_escaping(text: Option<&str>) -> Option<String> {
    let text = text?;
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some(&next) if RECOGNIZED_ESCAPES.contains(&next) => {
                out.push('\\');
                out.push(next);
                chars.next();
            }
            _ => out.push_str("\\\\"),
        }
    }
    Some(out)
}

// ============================================================================
// node.properties
// ============================================================================

/// A `key=value` properties file, in file order.
///
/// Comment (`#`, `!`) and blank lines are dropped on rewrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeProperties {
    entries: Vec<(String, String)>,
}

impl NodeProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Self {
        let mut props = Self::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let (key, value) = match line.find(['=', ':']) {
                Some(idx) => (&line[..idx], &line[idx + 1..]),
                None => (line, ""),
            };
            props.set(key.trim(), value.trim());
        }
        props
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::io_at(path, e))?;
        Ok(Self::parse(&text))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set a value, replacing an existing key in place.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io_at(parent, e))?;
        }
        fs::write(path, self.render()).map_err(|e| Error::io_at(path, e))
    }

    /// Overlay database parameters given on the command line.
    pub fn apply_options(&mut self, options: &DbOptions) {
        if let Some((host, port)) = &options.host {
            self.set(DB_HOST_KEY, host.clone());
            self.set(DB_PORT_KEY, port.to_string());
        }
        if let Some(name) = options.database_name() {
            self.set(DB_NAME_KEY, name);
        }
        if let Some(user) = &options.gateway_user {
            self.set(DB_USER_KEY, user.clone());
        }
        if let Some(pass) = &options.gateway_pass {
            self.set(DB_PASS_KEY, pass.clone());
        }
        if let Some(pass) = &options.cluster_pass {
            self.set(CLUSTER_PASS_KEY, pass.clone());
        }
    }
}

// ============================================================================
// Database configuration
// ============================================================================

/// Connection settings for the gateway database.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub pass: String,
    pub cluster_pass: Option<String>,
    /// Administrative account used to create or replace the database.
    pub admin_user: Option<String>,
    pub admin_pass: Option<String>,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("pass", &"[redacted]")
            .field("admin_user", &self.admin_user)
            .finish()
    }
}

impl DatabaseConfig {
    /// Read the main database settings from node properties.
    pub fn from_properties(props: &NodeProperties) -> Result<Self> {
        let required = |key: &str| {
            props
                .get(key)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| Error::Config(format!("node.properties has no value for {}", key)))
        };
        let port = match props.get(DB_PORT_KEY).filter(|v| !v.is_empty()) {
            Some(raw) => raw.parse().map_err(|_| {
                Error::Config(format!("invalid {} '{}' in node.properties", DB_PORT_KEY, raw))
            })?,
            None => DEFAULT_DB_PORT,
        };
        Ok(Self {
            host: required(DB_HOST_KEY)?,
            port,
            name: required(DB_NAME_KEY)?,
            user: required(DB_USER_KEY)?,
            pass: props.get(DB_PASS_KEY).unwrap_or_default().to_string(),
            cluster_pass: props.get(CLUSTER_PASS_KEY).map(str::to_string),
            admin_user: None,
            admin_pass: None,
        })
    }

    /// Attach administrative credentials.
    pub fn with_admin(mut self, user: Option<String>, pass: Option<String>) -> Self {
        self.admin_user = user;
        self.admin_pass = pass;
        self
    }

    /// Whether the database runs on this host.
    pub fn is_local(&self) -> bool {
        matches!(
            self.host.to_ascii_lowercase().as_str(),
            "localhost" | "localhost.localdomain" | "127.0.0.1" | "::1"
        )
    }
}

// ============================================================================
// External client
// ============================================================================

/// How a dump is loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Create the database before loading.
    pub create_new_db: bool,
    /// Mapping file applied by the client while loading.
    pub mapping: Option<PathBuf>,
    /// The load is part of a migrate.
    pub migrate: bool,
}

/// External database dump/load client.
///
/// `load` must apply a dump completely or not at all.
pub trait DatabaseClient {
    /// Whether the client can reach a database at all.
    fn is_available(&self) -> bool {
        true
    }

    /// Write the main database dump, excluding audit tables, to `dest`.
    fn dump_main(&self, config: &DatabaseConfig, dest: &Path) -> Result<()>;

    /// Write the audit tables dump to `dest`.
    fn dump_audits(&self, config: &DatabaseConfig, dest: &Path) -> Result<()>;

    /// Load dump text into the database.
    fn load(&self, config: &DatabaseConfig, dump: &str, options: &LoadOptions) -> Result<()>;
}

/// Repair `dump` and hand it to `client`. Any failure is a database error.
pub fn apply_dump(
    client: &dyn DatabaseClient,
    config: &DatabaseConfig,
    dump: &str,
    options: &LoadOptions,
) -> Result<()> {
    let fixed = fix_dump_escaping(Some(dump)).unwrap_or_default();
    debug!(
        bytes_in = dump.len(),
        bytes_out = fixed.len(),
        "dump escaping repaired"
    );
    client
        .load(config, &fixed, options)
        .map_err(|e| match e {
            Error::Database(_) => e,
            other => Error::Database(other.to_string()),
        })?;
    info!(
        host = %config.host,
        database = %config.name,
        create_new_db = options.create_new_db,
        "database dump applied"
    );
    Ok(())
}

/// Client used when no database client is linked in.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableDatabase;

const NO_CLIENT: &str = "no database client is available";

impl DatabaseClient for UnavailableDatabase {
    fn is_available(&self) -> bool {
        false
    }

    fn dump_main(&self, _config: &DatabaseConfig, _dest: &Path) -> Result<()> {
        Err(Error::Database(NO_CLIENT.to_string()))
    }

    fn dump_audits(&self, _config: &DatabaseConfig, _dest: &Path) -> Result<()> {
        Err(Error::Database(NO_CLIENT.to_string()))
    }

    fn load(&self, _config: &DatabaseConfig, _dump: &str, _options: &LoadOptions) -> Result<()> {
        Err(Error::Database(NO_CLIENT.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{self, OptionMap};
    use std::cell::RefCell;

    fn fix(s: &str) -> String {
        fix_dump_escaping(Some(s)).unwrap()
    }

    #[test]
    fn test_fix_dump_escaping_cases() {
        assert_eq!(fix("\\"), "\\\\");
        assert_eq!(fix("\\\\"), "\\\\");
        assert_eq!(fix("\\r"), "\\r");
        assert_eq!(fix("\\n"), "\\n");
        assert_eq!(fix("\\'"), "\\'");
        assert_eq!(fix("\\\""), "\\\"");
        assert_eq!(fix(""), "");
        assert_eq!(fix("foo\\bar"), "foo\\\\bar");
        assert_eq!(fix_dump_escaping(None), None);
    }

    #[test]
    fn test_fix_dump_escaping_trailing_backslash() {
        assert_eq!(fix("end\\"), "end\\\\");
        assert_eq!(fix("C:\\temp\\new"), "C:\\\\temp\\new");
    }

    #[test]
    fn test_node_properties_parse_and_render() {
        let props = NodeProperties::parse(
            "# comment\n\
             node.db.config.main.host = db1\n\
             ! also comment\n\
             node.db.config.main.port:3307\n\
             \n\
             node.id=abc=def\n",
        );
        assert_eq!(props.len(), 3);
        assert_eq!(props.get(DB_HOST_KEY), Some("db1"));
        assert_eq!(props.get(DB_PORT_KEY), Some("3307"));
        assert_eq!(props.get("node.id"), Some("abc=def"));
        assert_eq!(
            props.render(),
            "node.db.config.main.host=db1\nnode.db.config.main.port=3307\nnode.id=abc=def\n"
        );
    }

    #[test]
    fn test_apply_options_overlays_cli() {
        let mut props = NodeProperties::parse("node.db.config.main.host=old\nnode.id=1\n");
        let cli = OptionMap::new()
            .value(options::DB_HOST, "newhost:3310")
            .value(options::DB_NAME, "ssg")
            .value(options::NEW_DB, "ssg_new")
            .value(options::GATEWAY_DB_USER, "gateway")
            .value(options::GATEWAY_DB_PASS, "pw")
            .value(options::CLUSTER_PASS, "cluster");
        props.apply_options(&DbOptions::from_options(&cli).unwrap());

        let config = DatabaseConfig::from_properties(&props).unwrap();
        assert_eq!(config.host, "newhost");
        assert_eq!(config.port, 3310);
        assert_eq!(config.name, "ssg_new");
        assert_eq!(config.cluster_pass.as_deref(), Some("cluster"));
        assert_eq!(props.get("node.id"), Some("1"));
    }

    #[test]
    fn test_from_properties_requires_keys() {
        let props = NodeProperties::parse("node.db.config.main.host=db\n");
        let err = DatabaseConfig::from_properties(&props).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_debug_redacts_password() {
        let props = NodeProperties::parse(
            "node.db.config.main.host=localhost\nnode.db.config.main.name=ssg\n\
             node.db.config.main.user=gw\nnode.db.config.main.pass=hunter2\n",
        );
        let config = DatabaseConfig::from_properties(&props).unwrap();
        assert!(config.is_local());
        assert_eq!(config.port, 3306);
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    struct RecordingClient {
        loaded: RefCell<Option<String>>,
        fail: bool,
    }

    impl DatabaseClient for RecordingClient {
        fn dump_main(&self, _config: &DatabaseConfig, _dest: &Path) -> Result<()> {
            Ok(())
        }

        fn dump_audits(&self, _config: &DatabaseConfig, _dest: &Path) -> Result<()> {
            Ok(())
        }

        fn load(&self, _config: &DatabaseConfig, dump: &str, _options: &LoadOptions) -> Result<()> {
            if self.fail {
                return Err(Error::Io(std::io::Error::other("connection refused")));
            }
            *self.loaded.borrow_mut() = Some(dump.to_string());
            Ok(())
        }
    }

    fn sample_config() -> DatabaseConfig {
        DatabaseConfig::from_properties(&NodeProperties::parse(
            "node.db.config.main.host=localhost\nnode.db.config.main.name=ssg\n\
             node.db.config.main.user=gw\n",
        ))
        .unwrap()
    }

    #[test]
    fn test_apply_dump_loads_fixed_text() {
        let client = RecordingClient {
            loaded: RefCell::new(None),
            fail: false,
        };
        apply_dump(&client, &sample_config(), "x\\y", &LoadOptions::default()).unwrap();
        assert_eq!(client.loaded.borrow().as_deref(), Some("x\\\\y"));
    }

    #[test]
    fn test_apply_dump_failure_is_database_error() {
        let client = RecordingClient {
            loaded: RefCell::new(None),
            fail: true,
        };
        let err = apply_dump(&client, &sample_config(), "x", &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Database(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unavailable_database() {
        let client = UnavailableDatabase;
        assert!(!client.is_available());
        assert!(client
            .load(&sample_config(), "", &LoadOptions::default())
            .is_err());
    }
}
