//! Error handling for xpilot.
//!
//! This module provides:
//! - [`XpError`]: The main error enum for all engine operations
//! - [`ErrorCode`]: Standardized error codes for machine parsing
//! - [`StructuredError`]: Serializable error with suggestion and context

mod codes;

use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use codes::ErrorCode;

/// Main error type for xpilot operations.
///
/// Business conditions such as an ineligible user or an event from an
/// unassigned user are not errors; they resolve to defaults at the call site.
#[derive(Error, Debug)]
pub enum XpError {
    #[error("Experiment not found: {0}")]
    ExperimentNotFound(String),

    #[error("Variant '{variant_id}' not found in experiment {experiment_id}")]
    VariantNotFound {
        experiment_id: String,
        variant_id: String,
    },

    #[error("Experiment {experiment_id} is not running (status: {status})")]
    NotRunning {
        experiment_id: String,
        status: String,
    },

    #[error("Experiment {experiment_id} cannot move from {from} to {to}")]
    InvalidTransition {
        experiment_id: String,
        from: String,
        to: String,
    },

    #[error("Invalid rollout percentage {0}: must be within [0, 100]")]
    InvalidPercentage(f64),

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Experiment validation failed: {0}")]
    ValidationFailed(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl XpError {
    /// Get the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::ExperimentNotFound(_) => ErrorCode::ExperimentNotFound,
            Self::VariantNotFound { .. } => ErrorCode::VariantNotFound,
            Self::NotRunning { .. } => ErrorCode::NotRunning,
            Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::InvalidPercentage(_) => ErrorCode::InvalidPercentage,
            Self::Storage(_) => ErrorCode::StorageFailure,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) | Self::Serialization(_) => ErrorCode::SerializationError,
            Self::ValidationFailed(_) => ErrorCode::ValidationFailed,
            Self::Config(_) => ErrorCode::ConfigInvalid,
        }
    }

    /// Get context information for this error as JSON.
    #[must_use]
    pub fn context(&self) -> Option<Value> {
        match self {
            Self::ExperimentNotFound(id) => Some(serde_json::json!({ "experiment_id": id })),
            Self::VariantNotFound {
                experiment_id,
                variant_id,
            } => Some(serde_json::json!({
                "experiment_id": experiment_id,
                "variant_id": variant_id,
            })),
            Self::NotRunning {
                experiment_id,
                status,
            } => Some(serde_json::json!({ "experiment_id": experiment_id, "status": status })),
            Self::InvalidTransition {
                experiment_id,
                from,
                to,
            } => Some(serde_json::json!({
                "experiment_id": experiment_id,
                "from": from,
                "to": to,
            })),
            Self::InvalidPercentage(value) => Some(serde_json::json!({ "percentage": value })),
            _ => None,
        }
    }

    /// Convert this error to a structured error.
    #[must_use]
    pub fn to_structured(&self) -> StructuredError {
        StructuredError::from_xp_error(self)
    }
}

/// A structured error with machine-readable code, suggestion, and context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// The error code (e.g., "EXPERIMENT_NOT_FOUND")
    pub code: ErrorCode,

    /// The numeric error code (e.g., 101)
    pub numeric_code: u16,

    /// Human-readable error message
    pub message: String,

    /// Actionable suggestion for recovery
    pub suggestion: String,

    /// Additional context for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,

    /// Whether this error is potentially recoverable by the user
    pub recoverable: bool,

    /// Error category (e.g., "experiment", "lifecycle")
    pub category: String,
}

impl StructuredError {
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            numeric_code: code.numeric(),
            message: message.into(),
            suggestion: code.suggestion().to_string(),
            context: None,
            recoverable: code.is_recoverable(),
            category: code.category().to_string(),
        }
    }

    #[must_use]
    pub fn from_xp_error(err: &XpError) -> Self {
        let mut structured = Self::new(err.code(), err.to_string());
        structured.context = err.context();
        structured
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl From<&XpError> for StructuredError {
    fn from(err: &XpError) -> Self {
        Self::from_xp_error(err)
    }
}

/// Result type alias using XpError.
pub type Result<T> = std::result::Result<T, XpError>;
