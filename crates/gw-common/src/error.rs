//! Error types for gateway backup and restore.
//!
//! Every error carries:
//! - A stable numeric code for machine parsing
//! - A category matching the propagation policy of the engine
//!
//! Outside a component step, only [`ErrorCategory::ComponentUnavailable`]
//! errors are non-fatal. Inside one, see [`Error::aborts_component_step`].
//!
//! # Agent-Facing Output
//!
//! ```json
//! {
//!   "code": 40,
//!   "category": "component_unavailable",
//!   "message": "component os unavailable: no appliance layer",
//!   "fatal": false
//! }
//! ```

use crate::component::ComponentType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for gateway backup operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories, one per propagation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad or missing command-line option. Raised before any I/O.
    InvalidArgument,
    /// Malformed target environment.
    Configuration,
    /// Archive, staging area or transfer failure.
    Io,
    /// A requested component could not be captured or restored.
    ComponentUnavailable,
    /// Dump repair or load failure.
    Database,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::InvalidArgument => write!(f, "invalid_argument"),
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Io => write!(f, "io"),
            ErrorCategory::ComponentUnavailable => write!(f, "component_unavailable"),
            ErrorCategory::Database => write!(f, "database"),
        }
    }
}

/// Unified error type for the backup engine.
#[derive(Error, Debug)]
pub enum Error {
    // Invalid arguments (10-19)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("missing option {option}: {reason}")]
    MissingOption { option: String, reason: String },

    #[error("file '{}' already exists", path.display())]
    TargetExists { path: PathBuf },

    // Configuration (20-29)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unsupported gateway version {version}: 5.0 or later is required")]
    UnsupportedVersion { version: String },

    #[error("node identity file missing: {}", path.display())]
    MissingNodeIdentity { path: PathBuf },

    // I/O (30-39)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error at '{}': {source}", path.display())]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("staged file '{}' changed since it was staged", path.display())]
    StagedFileChanged { path: PathBuf },

    // Components (40-49)
    #[error("component {component} unavailable: {reason}")]
    ComponentUnavailable {
        component: ComponentType,
        reason: String,
    },

    #[error("halted on component {component}: {reason}")]
    Halted {
        component: ComponentType,
        reason: String,
    },

    // Database (50-59)
    #[error("database error: {0}")]
    Database(String),
}

impl Error {
    /// Attach a path to an I/O error.
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::IoAt {
            path: path.into(),
            source,
        }
    }

    /// Shorthand for a component-unavailable failure.
    pub fn unavailable(component: ComponentType, reason: impl Into<String>) -> Self {
        Error::ComponentUnavailable {
            component,
            reason: reason.into(),
        }
    }

    /// Returns the stable error code.
    ///
    /// - 10-19: invalid arguments
    /// - 20-29: configuration
    /// - 30-39: I/O
    /// - 40-49: components
    /// - 50-59: database
    pub fn code(&self) -> u32 {
        match self {
            Error::InvalidArgument(_) => 10,
            Error::MissingOption { .. } => 11,
            Error::TargetExists { .. } => 12,
            Error::Config(_) => 20,
            Error::UnsupportedVersion { .. } => 21,
            Error::MissingNodeIdentity { .. } => 22,
            Error::Io(_) => 30,
            Error::IoAt { .. } => 31,
            Error::Json(_) => 32,
            Error::Archive(_) => 33,
            Error::Transfer(_) => 34,
            Error::StagedFileChanged { .. } => 35,
            Error::ComponentUnavailable { .. } => 40,
            Error::Halted { .. } => 41,
            Error::Database(_) => 50,
        }
    }

    /// Returns the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidArgument(_) | Error::MissingOption { .. } | Error::TargetExists { .. } => {
                ErrorCategory::InvalidArgument
            }

            Error::Config(_) | Error::UnsupportedVersion { .. } | Error::MissingNodeIdentity { .. } => {
                ErrorCategory::Configuration
            }

            Error::Io(_)
            | Error::IoAt { .. }
            | Error::Json(_)
            | Error::Archive(_)
            | Error::Transfer(_)
            | Error::StagedFileChanged { .. } => ErrorCategory::Io,

            Error::ComponentUnavailable { .. } | Error::Halted { .. } => {
                ErrorCategory::ComponentUnavailable
            }

            Error::Database(_) => ErrorCategory::Database,
        }
    }

    /// Whether this error aborts the whole operation.
    ///
    /// A halted component is fatal even though its category is
    /// component-unavailable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::ComponentUnavailable { .. })
    }

    /// Whether an error raised while capturing or restoring one component
    /// aborts the operation instead of being recorded against it.
    ///
    /// Database errors are never partially applied, and a malformed target
    /// environment affects every component. Anything else (an unreadable
    /// source file, a failed copy) stays with the component.
    pub fn aborts_component_step(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Configuration | ErrorCategory::Database
        ) || matches!(self, Error::Halted { .. })
    }

    /// Component this error is about, if any.
    pub fn component(&self) -> Option<ComponentType> {
        match self {
            Error::ComponentUnavailable { component, .. } | Error::Halted { component, .. } => {
                Some(*component)
            }
            _ => None,
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self.category() {
            ErrorCategory::InvalidArgument => "Invalid Argument",
            ErrorCategory::Configuration => "Configuration Error",
            ErrorCategory::Io => "I/O Error",
            ErrorCategory::ComponentUnavailable => "Component Unavailable",
            ErrorCategory::Database => "Database Error",
        }
    }
}

/// Structured error for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,
    /// Error category.
    pub category: ErrorCategory,
    /// Human-readable message.
    pub message: String,
    /// Whether the error aborted the operation.
    pub fatal: bool,
    /// Component the error refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<ComponentType>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            fatal: err.is_fatal(),
            component: err.component(),
        }
    }
}
