//! Tri-state operation results.
//!
//! Exporter and Importer collect per-component failures while they run and
//! decide the final status once, at the end, with [`escalate`].

use crate::component::ComponentType;
use crate::error::{Error, StructuredError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of an export or import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Every requested component succeeded.
    Success,
    /// At least one requested component could not be handled.
    PartialSuccess,
    /// A structural error occurred, or a failure was escalated by `-halt`.
    Failure,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Success => write!(f, "SUCCESS"),
            Status::PartialSuccess => write!(f, "PARTIAL_SUCCESS"),
            Status::Failure => write!(f, "FAILURE"),
        }
    }
}

/// One component that could not be handled, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentFailure {
    pub component: ComponentType,
    pub reason: String,
}

impl ComponentFailure {
    pub fn new(component: ComponentType, reason: impl Into<String>) -> Self {
        Self {
            component,
            reason: reason.into(),
        }
    }
}

/// Decide the final status from the collected failures.
///
/// With `halt`, the first failure becomes a [`Error::Halted`] cause.
pub fn escalate(failures: &[ComponentFailure], halt: bool) -> (Status, Option<Error>) {
    match failures.first() {
        None => (Status::Success, None),
        Some(first) if halt => (
            Status::Failure,
            Some(Error::Halted {
                component: first.component,
                reason: first.reason.clone(),
            }),
        ),
        Some(_) => (Status::PartialSuccess, None),
    }
}

/// Result of an export or import. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    artifact: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    restored_components: Vec<ComponentType>,
    failed_components: Vec<ComponentFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cause: Option<StructuredError>,
    #[serde(default)]
    reboot_maybe_required: bool,
}

impl OperationResult {
    /// Build a result from collected failures.
    pub fn from_failures(failures: Vec<ComponentFailure>, halt: bool) -> Self {
        let (status, cause) = escalate(&failures, halt);
        Self {
            status,
            artifact: None,
            restored_components: Vec::new(),
            failed_components: failures,
            cause: cause.as_ref().map(StructuredError::from),
            reboot_maybe_required: false,
        }
    }

    /// Build a failure result from a fatal error.
    pub fn failure(error: &Error, failures: Vec<ComponentFailure>) -> Self {
        Self {
            status: Status::Failure,
            artifact: None,
            restored_components: Vec::new(),
            failed_components: failures,
            cause: Some(StructuredError::from(error)),
            reboot_maybe_required: false,
        }
    }

    /// Record the produced image path.
    pub fn with_artifact(mut self, path: PathBuf) -> Self {
        self.artifact = Some(path);
        self
    }

    /// Record which components were restored.
    pub fn with_restored(mut self, components: Vec<ComponentType>) -> Self {
        self.restored_components = components;
        self
    }

    /// Flag that staged OS files will be applied on next boot.
    pub fn with_reboot_maybe_required(mut self, required: bool) -> Self {
        self.reboot_maybe_required = required;
        self
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn artifact(&self) -> Option<&PathBuf> {
        self.artifact.as_ref()
    }

    pub fn restored_components(&self) -> &[ComponentType] {
        &self.restored_components
    }

    pub fn failed_components(&self) -> &[ComponentFailure] {
        &self.failed_components
    }

    /// Failed component types, in the order they failed.
    pub fn failed_component_types(&self) -> Vec<ComponentType> {
        self.failed_components.iter().map(|f| f.component).collect()
    }

    /// Message of the error that caused a failure.
    pub fn cause(&self) -> Option<&str> {
        self.cause.as_ref().map(|e| e.message.as_str())
    }

    /// Structured form of the failure cause, with its code and category.
    pub fn error(&self) -> Option<&StructuredError> {
        self.cause.as_ref()
    }

    pub fn reboot_maybe_required(&self) -> bool {
        self.reboot_maybe_required
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalate_no_failures() {
        let (status, cause) = escalate(&[], true);
        assert_eq!(status, Status::Success);
        assert!(cause.is_none());
    }

    #[test]
    fn test_escalate_partial_without_halt() {
        let failures = vec![ComponentFailure::new(ComponentType::Os, "not in image")];
        let (status, cause) = escalate(&failures, false);
        assert_eq!(status, Status::PartialSuccess);
        assert!(cause.is_none());
    }

    #[test]
    fn test_escalate_halt_uses_first_failure() {
        let failures = vec![
            ComponentFailure::new(ComponentType::Ca, "first"),
            ComponentFailure::new(ComponentType::Ma, "second"),
        ];
        let (status, cause) = escalate(&failures, true);
        assert_eq!(status, Status::Failure);
        match cause {
            Some(Error::Halted { component, reason }) => {
                assert_eq!(component, ComponentType::Ca);
                assert_eq!(reason, "first");
            }
            other => panic!("unexpected cause: {:?}", other),
        }
    }

    #[test]
    fn test_result_keeps_failure_order() {
        let result = OperationResult::from_failures(
            vec![
                ComponentFailure::new(ComponentType::Esm, "a"),
                ComponentFailure::new(ComponentType::Os, "b"),
            ],
            false,
        );
        assert_eq!(
            result.failed_component_types(),
            vec![ComponentType::Esm, ComponentType::Os]
        );
        assert_eq!(result.status(), Status::PartialSuccess);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&Status::PartialSuccess).unwrap(),
            "\"PARTIAL_SUCCESS\""
        );
        let result = OperationResult::from_failures(vec![], false)
            .with_artifact(PathBuf::from("/tmp/a.zip"));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "SUCCESS");
        assert_eq!(json["artifact"], "/tmp/a.zip");
        assert!(json.get("cause").is_none());
    }

    #[test]
    fn test_failure_carries_error_code() {
        let err = Error::TargetExists {
            path: PathBuf::from("/tmp/a.zip"),
        };
        let result = OperationResult::failure(&err, vec![]);
        assert_eq!(result.status(), Status::Failure);
        assert_eq!(result.error().map(|e| e.code), Some(12));
        assert!(result.cause().unwrap().contains("already exists"));

        let halted = OperationResult::from_failures(
            vec![ComponentFailure::new(ComponentType::Os, "absent")],
            true,
        );
        assert_eq!(halted.error().map(|e| e.code), Some(41));
    }
}
