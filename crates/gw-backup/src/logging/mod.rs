//! Structured logging for gw-backup.
//!
//! Provides dual-mode logging:
//! - Human-readable console output for interactive use
//! - Machine-parseable JSON lines for automation
//!
//! stdout is reserved for the command result payload; all log output goes
//! to stderr. Engine events use dotted targets named by stage
//! (`export.component`, `import.component`, `os_restore.apply`, ...).

pub mod config;

pub use config::{LogConfig, LogFormat, LogLevel};

use std::io::IsTerminal;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the logging subsystem.
///
/// Must be called once at startup before any logging occurs.
pub fn init_logging(config: &LogConfig) {
    let filter = build_filter(config, std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref());

    match config.format {
        LogFormat::Human => {
            let use_ansi = std::io::stderr().is_terminal();
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_ansi(use_ansi);

            if config.timestamps {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .init();
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer.without_time())
                    .init();
            }
        }
        LogFormat::Jsonl => {
            let json_layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(true);
            tracing_subscriber::registry()
                .with(filter)
                .with(json_layer)
                .init();
        }
    }
}

/// Filter for `config`. Valid `RUST_LOG` directives are used only when no
/// level was given explicitly.
pub fn build_filter(config: &LogConfig, rust_log: Option<&str>) -> EnvFilter {
    let from_level = || EnvFilter::default().add_directive(LevelFilter::from(config.level).into());
    match rust_log {
        Some(directives) if !config.explicit_level => {
            EnvFilter::try_new(directives).unwrap_or_else(|_| from_level())
        }
        _ => from_level(),
    }
}

/// Generate a unique run ID for this invocation.
pub fn generate_run_id() -> String {
    let uuid = uuid::Uuid::new_v4();
    format!("run-{}", &uuid.simple().to_string()[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_level_beats_rust_log() {
        let config = LogConfig::resolve(Some(LogLevel::Warn), None, |key| {
            (key == "RUST_LOG").then(|| "trace".to_string())
        });
        let filter = build_filter(&config, Some("trace"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn test_rust_log_used_without_explicit_level() {
        let config = LogConfig::default();
        assert_eq!(
            build_filter(&config, Some("debug")).max_level_hint(),
            Some(LevelFilter::DEBUG)
        );
        assert_eq!(
            build_filter(&config, Some("gw_backup=loudest")).max_level_hint(),
            Some(LevelFilter::INFO)
        );
    }

    #[test]
    fn test_generate_run_id() {
        let id1 = generate_run_id();
        let id2 = generate_run_id();

        assert!(id1.starts_with("run-"));
        assert_ne!(id1, id2);
        // Format: run-<12 hex chars>
        assert_eq!(id1.len(), 16);
        assert!(id1[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }
}
