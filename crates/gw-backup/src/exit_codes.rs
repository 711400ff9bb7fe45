//! Exit codes for the gw-backup CLI.
//!
//! Exit codes communicate the operation outcome without requiring output
//! parsing. They are a stable contract for automation.
//!
//! Exit code ranges:
//! - 0-2: operation outcomes (success, partial success, failure)
//! - 10-19: user/environment errors (recoverable by user action)
//! - 20-29: I/O errors

use gw_common::{ErrorCategory, Status, StructuredError};

/// Exit codes for gw-backup operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Operation Outcomes (0-2)
    // ========================================================================
    /// Every requested component was handled
    Success = 0,

    /// At least one requested component could not be handled
    PartialSuccess = 1,

    /// The operation failed
    Failure = 2,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid arguments
    ArgsError = 10,

    /// Malformed or unsupported target environment
    ConfigError = 11,

    // ========================================================================
    // I/O Errors (20-29)
    // ========================================================================
    /// Archive, staging area or transfer failure
    IoError = 20,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code indicates full success.
    pub fn is_success(self) -> bool {
        self == ExitCode::Success
    }

    /// Check if this exit code is a user/environment error (codes 10-19).
    pub fn is_user_error(self) -> bool {
        (10..20).contains(&self.as_i32())
    }

    /// Exit code for an error category.
    pub fn from_category(category: ErrorCategory) -> Self {
        match category {
            ErrorCategory::InvalidArgument => ExitCode::ArgsError,
            ErrorCategory::Configuration => ExitCode::ConfigError,
            ErrorCategory::Io => ExitCode::IoError,
            ErrorCategory::ComponentUnavailable | ErrorCategory::Database => ExitCode::Failure,
        }
    }

    /// Exit code for a finished operation.
    ///
    /// Failures with a categorised cause map to that category's code.
    pub fn from_outcome(status: Status, error: Option<&StructuredError>) -> Self {
        match (status, error) {
            (Status::Success, _) => ExitCode::Success,
            (Status::PartialSuccess, _) => ExitCode::PartialSuccess,
            (Status::Failure, Some(err)) => ExitCode::from_category(err.category),
            (Status::Failure, None) => ExitCode::Failure,
        }
    }

    /// Get the code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Success => "OK",
            ExitCode::PartialSuccess => "OK_PARTIAL",
            ExitCode::Failure => "ERR_FAILURE",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::IoError => "ERR_IO",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
