//! Gateway backup common types.
//!
//! This crate provides the vocabulary shared by the image layer and the
//! backup engine:
//! - The component catalog
//! - Product and image versions
//! - The unified error type and its categories
//! - Explicit engine configuration
//! - Tri-state operation results
//! - Live layout constants

pub mod component;
pub mod config;
pub mod error;
pub mod layout;
pub mod output;
pub mod result;
pub mod version;

pub use component::ComponentType;
pub use config::{ConfigError, ConfigOptions, EngineConfig};
pub use error::{Error, ErrorCategory, Result, StructuredError};
pub use output::OutputFormat;
pub use result::{escalate, ComponentFailure, OperationResult, Status};
pub use version::{ImageVersion, ProductVersion};
