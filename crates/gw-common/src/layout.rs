//! Live gateway layout, relative to the gateway home unless noted.

/// Node configuration directory.
pub const NODE_CONF_DIR: &str = "node/default/etc/conf";

pub const NODE_PROPERTIES: &str = "node.properties";
pub const OMP_DAT: &str = "omp.dat";
pub const SSGLOG_PROPERTIES: &str = "ssglog.properties";
pub const SYSTEM_PROPERTIES: &str = "system.properties";

/// Files that make up the config component.
pub const CONFIG_FILES: [&str; 4] = [SSGLOG_PROPERTIES, SYSTEM_PROPERTIES, NODE_PROPERTIES, OMP_DAT];

/// Files that carry a node's identity; never copied by a migrate.
pub const NODE_IDENTITY_FILES: [&str; 2] = [NODE_PROPERTIES, OMP_DAT];

/// Custom assertion jars.
pub const CA_JAR_DIR: &str = "runtime/modules/lib";

/// Modular assertion archives.
pub const MA_AAR_DIR: &str = "runtime/modules/assertions";

/// Extension libraries.
pub const LIB_EXT_DIR: &str = "runtime/lib/ext";

/// Where local images go when no directory was given.
pub const POST_FIVE_O_DEFAULT_BACKUP_FOLDER: &str = "config/backup/images";

/// Manifest of OS files to capture.
pub const OS_BACKUP_MANIFEST: &str = "config/backup/cfg/backup_manifest";

/// Gateway directory name under the SecureSpan home.
pub const GATEWAY: &str = "Gateway";

/// Enterprise Service Manager directory name under the SecureSpan home.
pub const ENTERPRISE_SERVICE_MANAGER: &str = "EnterpriseManager";

/// ESM subdirectories captured by the esm component.
pub const ESM_DIRS: [&str; 2] = ["etc", "var"];

/// Absolute path of the appliance layer.
pub const OPT_SECURE_SPAN_APPLIANCE: &str = "/opt/SecureSpan/Appliance";

/// Absolute path of the database server config.
pub const MY_CNF: &str = "/etc/my.cnf";

/// Absolute path of the ESM pid file.
pub const ESM_PID_FILE: &str = "/var/run/ssemd.pid";

/// Archive root entries.
pub const VERSION_FILE: &str = "version";
pub const MANIFEST_LOG: &str = "manifest.log";

/// Database dump file names inside the db component folders.
pub const MAIN_DB_DUMP: &str = "main_backup.sql";
pub const AUDIT_DB_DUMP: &str = "audit_backup.sql";

/// Default port of the gateway database.
pub const DEFAULT_DB_PORT: u16 = 3306;

/// Default FTP port.
pub const DEFAULT_FTP_PORT: u16 = 21;
