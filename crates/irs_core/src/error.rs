use serde::{Deserialize, Serialize};
use std::fmt;

pub const DB_NOT_FOUND: &str = "DB_NOT_FOUND";
pub const LIFECYCLE_STALE_TRANSITION: &str = "LIFECYCLE_STALE_TRANSITION";

/// Single structured error shape used across crates and exposed in caller-facing responses.
///
/// Admission filtering and remediation failures are values, not errors; see
/// `classify::Admission` and `remediation::ActionOutcome`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn not_found(id: &str) -> Self {
        Self::new(DB_NOT_FOUND, "Incident not found").with_details(format!("incident_id={id}"))
    }

    /// Stored status did not match the expected prior status. Callers re-read and reconcile.
    pub fn stale_transition(id: &str, expected: &str, actual: &str) -> Self {
        Self::new(
            LIFECYCLE_STALE_TRANSITION,
            "Incident status changed concurrently; re-read and reconcile",
        )
        .with_details(format!("incident_id={id}; expected={expected}; actual={actual}"))
    }

    /// A remote collaborator could not be reached. Always retryable.
    pub fn unavailable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, message).with_retryable(true)
    }

    pub fn is_not_found(&self) -> bool {
        self.code == DB_NOT_FOUND
    }

    pub fn is_stale(&self) -> bool {
        self.code == LIFECYCLE_STALE_TRANSITION
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(d) = &self.details {
            write!(f, " ({d})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}
