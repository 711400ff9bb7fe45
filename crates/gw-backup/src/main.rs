//! gw-backup - Gateway backup and restore
//!
//! The main entry point for gw-backup, handling:
//! - Export of a node into an image
//! - Import and migrate of an image into a node
//! - Applying staged OS files at boot
//! - Reporting the pending OS restore state

use clap::{Args, Parser, Subcommand};
use gw_backup::db::UnavailableDatabase;
use gw_backup::exit_codes::ExitCode;
use gw_backup::ftp::UnavailableFtp;
use gw_backup::logging::{generate_run_id, init_logging, LogConfig, LogFormat, LogLevel};
use gw_backup::options::{self, OptionMap};
use gw_backup::{DeferredFileApplier, Exporter, Importer};
use gw_common::{
    ComponentType, ConfigOptions, EngineConfig, Error, OperationResult, OutputFormat,
    ProductVersion,
};
use std::path::PathBuf;
use tracing::info_span;

/// Gateway backup and restore
#[derive(Parser)]
#[command(name = "gw-backup")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// SecureSpan installation root (contains Gateway/)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// TOML config file
    #[arg(long, global = true)]
    config_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format on stderr (human, jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Result format on stdout
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Root that OS restore destinations are resolved against
    #[arg(long, global = true)]
    os_root: Option<PathBuf>,

    /// Directory for state that must survive a restart
    #[arg(long, global = true)]
    var_dir: Option<PathBuf>,

    /// Skip the supported-version check
    #[arg(long, global = true)]
    skip_version_check: bool,

    /// Keep image names exactly as given
    #[arg(long, global = true)]
    no_unique_image_name: bool,

    /// Override the running gateway's build version
    #[arg(long, global = true)]
    build_version: Option<ProductVersion>,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture this node into an image
    Export(ExportArgs),

    /// Restore an image into this node
    Import(ImportArgs),

    /// Restore an image from another node, keeping this node's identity
    Migrate(ImportArgs),

    /// Apply OS files staged by a previous import (run at boot)
    ApplyOs,

    /// Show the pending OS restore state
    Status,

    /// Print version information
    Version,
}

// ============================================================================
// Command argument structs
// ============================================================================

/// Component selection flags. With none given, every component except esm runs.
#[derive(Args, Debug, Default)]
struct ComponentArgs {
    /// Operating system files
    #[arg(long)]
    os: bool,

    /// Node configuration files
    #[arg(long)]
    config: bool,

    /// Main database
    #[arg(long)]
    maindb: bool,

    /// Audit tables
    #[arg(long)]
    audits: bool,

    /// Custom assertions
    #[arg(long)]
    ca: bool,

    /// Modular assertions
    #[arg(long)]
    ma: bool,

    /// runtime/lib/ext libraries
    #[arg(long)]
    ext: bool,

    /// Enterprise Service Manager
    #[arg(long)]
    esm: bool,
}

impl ComponentArgs {
    fn flagged(&self) -> Vec<ComponentType> {
        [
            (self.os, ComponentType::Os),
            (self.config, ComponentType::Config),
            (self.maindb, ComponentType::MainDb),
            (self.audits, ComponentType::Audits),
            (self.ca, ComponentType::Ca),
            (self.ma, ComponentType::Ma),
            (self.ext, ComponentType::Ext),
            (self.esm, ComponentType::Esm),
        ]
        .into_iter()
        .filter_map(|(set, component)| set.then_some(component))
        .collect()
    }
}

#[derive(Args, Debug, Default)]
struct FtpArgs {
    /// FTP server, host[:port]
    #[arg(long)]
    ftp_host: Option<String>,

    /// FTP user
    #[arg(long)]
    ftp_user: Option<String>,

    /// FTP password
    #[arg(long)]
    ftp_pass: Option<String>,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Image file to create
    #[arg(long)]
    image: Option<String>,

    /// Fail instead of writing a partial image
    #[arg(long)]
    halt: bool,

    #[command(flatten)]
    components: ComponentArgs,

    #[command(flatten)]
    ftp: FtpArgs,
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// Image file to restore
    #[arg(long)]
    image: Option<String>,

    /// Fail if any requested component cannot be restored
    #[arg(long)]
    halt: bool,

    /// Verbose per-file logging
    #[arg(short = 'v', long)]
    verbose: bool,

    #[command(flatten)]
    components: ComponentArgs,

    #[command(flatten)]
    ftp: FtpArgs,

    /// Database administrator user
    #[arg(long)]
    dbu: Option<String>,

    /// Database administrator password
    #[arg(long)]
    dbp: Option<String>,

    /// Database host, host[:port]
    #[arg(long)]
    dbh: Option<String>,

    /// Database name
    #[arg(long)]
    db: Option<String>,

    /// Create and restore into a new database with this name
    #[arg(long)]
    newdb: Option<String>,

    /// Cluster passphrase
    #[arg(long)]
    cp: Option<String>,

    /// Gateway database user
    #[arg(long)]
    gdbu: Option<String>,

    /// Gateway database password
    #[arg(long)]
    gdbp: Option<String>,

    /// Mapping file applied while loading the database
    #[arg(long)]
    mapping: Option<PathBuf>,
}

fn component_options(map: OptionMap, components: &ComponentArgs) -> OptionMap {
    components.flagged().into_iter().fold(map, |map, component| match component.option_name() {
        Some(name) => map.flag(&name),
        None => map,
    })
}

fn ftp_options(map: OptionMap, ftp: &FtpArgs) -> OptionMap {
    map.value_opt(options::FTP_HOST, ftp.ftp_host.clone())
        .value_opt(options::FTP_USER, ftp.ftp_user.clone())
        .value_opt(options::FTP_PASS, ftp.ftp_pass.clone())
}

impl ExportArgs {
    fn to_options(&self) -> OptionMap {
        let map = OptionMap::new()
            .value_opt(options::IMAGE, self.image.clone())
            .flag_if(options::HALT, self.halt);
        ftp_options(component_options(map, &self.components), &self.ftp)
    }
}

impl ImportArgs {
    fn to_options(&self, migrate: bool) -> OptionMap {
        let map = OptionMap::new()
            .value_opt(options::IMAGE, self.image.clone())
            .flag_if(options::HALT, self.halt)
            .flag_if(options::VERBOSE, self.verbose)
            .flag_if(options::MIGRATE, migrate)
            .value_opt(options::DB_ADMIN_USER, self.dbu.clone())
            .value_opt(options::DB_ADMIN_PASS, self.dbp.clone())
            .value_opt(options::DB_HOST, self.dbh.clone())
            .value_opt(options::DB_NAME, self.db.clone())
            .value_opt(options::NEW_DB, self.newdb.clone())
            .value_opt(options::CLUSTER_PASS, self.cp.clone())
            .value_opt(options::GATEWAY_DB_USER, self.gdbu.clone())
            .value_opt(options::GATEWAY_DB_PASS, self.gdbp.clone())
            .value_opt(
                options::MAPPING,
                self.mapping.as_ref().map(|p| p.to_string_lossy().into_owned()),
            );
        ftp_options(component_options(map, &self.components), &self.ftp)
    }
}

// ============================================================================
// Entry point
// ============================================================================

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help and --version are not errors
            let code = if err.use_stderr() {
                ExitCode::ArgsError
            } else {
                ExitCode::Success
            };
            let _ = err.print();
            std::process::exit(code.as_i32());
        }
    };

    let verbose = matches!(
        &cli.command,
        Commands::Import(args) | Commands::Migrate(args) if args.verbose
    );
    let mut log_config = LogConfig::from_env(cli.global.log_level, cli.global.log_format);
    if verbose {
        log_config = log_config.verbose();
    }
    init_logging(&log_config);

    let run_id = generate_run_id();
    let span = info_span!("gw_backup", run_id = %run_id).entered();

    let exit_code = match &cli.command {
        Commands::Export(args) => run_export(&cli.global, &run_id, args),
        Commands::Import(args) => run_import(&cli.global, &run_id, args, false),
        Commands::Migrate(args) => run_import(&cli.global, &run_id, args, true),
        Commands::ApplyOs => run_apply_os(&cli.global, &run_id),
        Commands::Status => run_status(&cli.global, &run_id),
        Commands::Version => {
            print_version(&cli.global);
            ExitCode::Success
        }
    };

    drop(span);
    std::process::exit(exit_code.as_i32());
}

fn load_config(global: &GlobalOpts) -> Result<EngineConfig, Error> {
    let options = ConfigOptions {
        config_path: global.config_file.clone(),
        secure_span_home: global.home.clone(),
        build_version: global.build_version,
        skip_version_check: global.skip_version_check,
        no_unique_image_name: global.no_unique_image_name,
        os_root: global.os_root.clone(),
        var_dir: global.var_dir.clone(),
    };
    EngineConfig::load(&options).map_err(Error::from)
}

// ============================================================================
// Commands
// ============================================================================

fn run_export(global: &GlobalOpts, run_id: &str, args: &ExportArgs) -> ExitCode {
    let config = match load_config(global) {
        Ok(config) => config,
        Err(err) => return output_error(global, run_id, "export", &err),
    };
    let exporter = match Exporter::new(&config, &UnavailableDatabase, &UnavailableFtp) {
        Ok(exporter) => exporter,
        Err(err) => return output_error(global, run_id, "export", &err),
    };
    let result = exporter.export(&args.to_options());
    output_result(global, run_id, "export", &result)
}

fn run_import(global: &GlobalOpts, run_id: &str, args: &ImportArgs, migrate: bool) -> ExitCode {
    let command = if migrate { "migrate" } else { "import" };
    let config = match load_config(global) {
        Ok(config) => config,
        Err(err) => return output_error(global, run_id, command, &err),
    };
    let importer = match Importer::new(&config, &UnavailableDatabase, &UnavailableFtp) {
        Ok(importer) => importer,
        Err(err) => return output_error(global, run_id, command, &err),
    };
    let result = importer.import(&args.to_options(migrate));
    output_result(global, run_id, command, &result)
}

fn run_apply_os(global: &GlobalOpts, run_id: &str) -> ExitCode {
    let config = match load_config(global) {
        Ok(config) => config,
        Err(err) => return output_error(global, run_id, "apply-os", &err),
    };
    match DeferredFileApplier::from_config(&config).apply_pending_os_restore() {
        Ok(outcome) => {
            output_payload(
                global,
                run_id,
                "apply-os",
                serde_json::to_value(outcome).unwrap_or_default(),
                &format!("{:?}", outcome),
            );
            ExitCode::Success
        }
        Err(err) => output_error(global, run_id, "apply-os", &err),
    }
}

fn run_status(global: &GlobalOpts, run_id: &str) -> ExitCode {
    let config = match load_config(global) {
        Ok(config) => config,
        Err(err) => return output_error(global, run_id, "status", &err),
    };
    match DeferredFileApplier::from_config(&config).status() {
        Ok(status) => {
            let summary = format!("os restore {} ({} files)", status.state, status.file_count);
            output_payload(
                global,
                run_id,
                "status",
                serde_json::to_value(&status).unwrap_or_default(),
                &summary,
            );
            ExitCode::Success
        }
        Err(err) => output_error(global, run_id, "status", &err),
    }
}

fn print_version(global: &GlobalOpts) {
    match global.format {
        OutputFormat::Json => {
            let version_info = serde_json::json!({
                "gw_backup_version": env!("CARGO_PKG_VERSION"),
                "rust_version": env!("CARGO_PKG_RUST_VERSION"),
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&version_info).unwrap_or_default()
            );
        }
        OutputFormat::Exitcode => {}
        OutputFormat::Summary => println!("gw-backup {}", env!("CARGO_PKG_VERSION")),
    }
}

// ============================================================================
// Output
// ============================================================================

fn output_result(
    global: &GlobalOpts,
    run_id: &str,
    command: &str,
    result: &OperationResult,
) -> ExitCode {
    let exit_code = ExitCode::from_outcome(result.status(), result.error());
    match global.format {
        OutputFormat::Json => {
            let response = serde_json::json!({
                "run_id": run_id,
                "command": command,
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "exit_code": exit_code.as_i32(),
                "exit_code_name": exit_code.code_name(),
                "result": result,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&response).unwrap_or_default()
            );
        }
        OutputFormat::Summary => {
            let failed: Vec<&str> = result
                .failed_components()
                .iter()
                .map(|f| f.component.name())
                .collect();
            let mut line = format!("[{}] {}: {}", run_id, command, result.status());
            if !failed.is_empty() {
                line.push_str(&format!(" (failed: {})", failed.join(", ")));
            }
            if let Some(artifact) = result.artifact() {
                line.push_str(&format!(" -> {}", artifact.display()));
            }
            if let Some(cause) = result.cause() {
                line.push_str(&format!(": {}", cause));
            }
            println!("{}", line);
        }
        OutputFormat::Exitcode => {}
    }
    exit_code
}

fn output_payload(
    global: &GlobalOpts,
    run_id: &str,
    command: &str,
    payload: serde_json::Value,
    summary: &str,
) {
    match global.format {
        OutputFormat::Json => {
            let response = serde_json::json!({
                "run_id": run_id,
                "command": command,
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "result": payload,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&response).unwrap_or_default()
            );
        }
        OutputFormat::Summary => println!("[{}] {}: {}", run_id, command, summary),
        OutputFormat::Exitcode => {}
    }
}

fn output_error(global: &GlobalOpts, run_id: &str, command: &str, error: &Error) -> ExitCode {
    let exit_code = ExitCode::from_category(error.category());
    match global.format {
        OutputFormat::Json => {
            let response = serde_json::json!({
                "run_id": run_id,
                "command": command,
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "exit_code": exit_code.as_i32(),
                "exit_code_name": exit_code.code_name(),
                "error": gw_common::StructuredError::from(error),
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&response).unwrap_or_default()
            );
        }
        OutputFormat::Summary => {
            eprintln!("[{}] {}: {}: {}", run_id, command, error.headline(), error);
        }
        OutputFormat::Exitcode => {}
    }
    exit_code
}
