//! Standardized error codes for machine-parseable output.
//!
//! Error codes follow a numeric taxonomy:
//! - 1xx: Experiment errors
//! - 2xx: Lifecycle errors
//! - 3xx: Config errors
//! - 6xx: Storage errors
//! - 8xx: Validation errors
//! - 9xx: Internal errors

use serde::{Deserialize, Serialize};

/// Standardized error codes for machine output.
///
/// Each variant maps to a numeric code (e.g., `ExperimentNotFound` -> E101).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================
    // Experiment errors (1xx)
    // ========================================
    /// E101: No experiment with the given id
    ExperimentNotFound,
    /// E102: Variant id is not declared on the experiment
    VariantNotFound,

    // ========================================
    // Lifecycle errors (2xx)
    // ========================================
    /// E201: Operation requires a running experiment
    NotRunning,
    /// E202: Requested status change is not allowed from the current status
    InvalidTransition,

    // ========================================
    // Config errors (3xx)
    // ========================================
    /// E301: Config file has invalid syntax or values
    ConfigInvalid,

    // ========================================
    // Storage errors (6xx)
    // ========================================
    /// E601: Storage collaborator failed
    StorageFailure,
    /// E602: Database operation failed
    DatabaseError,
    /// E603: Serialization/deserialization failed
    SerializationError,

    // ========================================
    // Validation errors (8xx)
    // ========================================
    /// E801: Experiment definition or input failed validation
    ValidationFailed,
    /// E802: Rollout percentage outside [0, 100]
    InvalidPercentage,

    // ========================================
    // Internal errors (9xx)
    // ========================================
    /// E901: IO operation failed
    IoError,
}

impl ErrorCode {
    /// Get the numeric error code (e.g., `ExperimentNotFound` -> 101).
    #[must_use]
    pub const fn numeric(&self) -> u16 {
        match self {
            Self::ExperimentNotFound => 101,
            Self::VariantNotFound => 102,

            Self::NotRunning => 201,
            Self::InvalidTransition => 202,

            Self::ConfigInvalid => 301,

            Self::StorageFailure => 601,
            Self::DatabaseError => 602,
            Self::SerializationError => 603,

            Self::ValidationFailed => 801,
            Self::InvalidPercentage => 802,

            Self::IoError => 901,
        }
    }

    /// Get the error code as a formatted string (e.g., "E101").
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("E{}", self.numeric())
    }

    /// Get the default suggestion for this error code.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::ExperimentNotFound => "Run `xpilot list` to see known experiments",
            Self::VariantNotFound => "Run `xpilot show <experiment>` to see the declared variant ids",
            Self::NotRunning => "Start or resume the experiment first with `xpilot start` / `xpilot resume`",
            Self::InvalidTransition => "Check the experiment status; completed and rolled back experiments are final",
            Self::ConfigInvalid => "Check TOML syntax and value ranges in the config file and XPILOT_* variables",
            Self::StorageFailure => "The storage backend reported a failure. Retry, then check backend health",
            Self::DatabaseError => "Check the database path and permissions. The file may be locked by another process",
            Self::SerializationError => "The stored data may be corrupted. Check input data for validity",
            Self::ValidationFailed => "Fix the reported field. Variant weights must sum to 100 with exactly one control",
            Self::InvalidPercentage => "Use a rollout percentage between 0 and 100",
            Self::IoError => "File operation failed. Check path exists and permissions are correct",
        }
    }

    /// Check if this error is potentially recoverable by the user.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::ExperimentNotFound
            | Self::VariantNotFound
            | Self::NotRunning
            | Self::InvalidTransition
            | Self::ConfigInvalid
            | Self::StorageFailure
            | Self::ValidationFailed
            | Self::InvalidPercentage
            | Self::IoError => true,

            Self::DatabaseError | Self::SerializationError => false,
        }
    }

    /// Get the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self.numeric() / 100 {
            1 => "experiment",
            2 => "lifecycle",
            3 => "config",
            6 => "storage",
            8 => "validation",
            9 => "internal",
            _ => "unknown",
        }
    }

    /// Iterate over all error codes.
    pub fn all() -> impl Iterator<Item = Self> {
        [
            Self::ExperimentNotFound,
            Self::VariantNotFound,
            Self::NotRunning,
            Self::InvalidTransition,
            Self::ConfigInvalid,
            Self::StorageFailure,
            Self::DatabaseError,
            Self::SerializationError,
            Self::ValidationFailed,
            Self::InvalidPercentage,
            Self::IoError,
        ]
        .into_iter()
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code_string())
    }
}
