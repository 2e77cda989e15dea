//! Collaborators the rollout controller drives: feature flags and alerts.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::core::FlagMap;
use crate::error::Result;
use crate::storage::ExperimentStore;

/// Applies a variant's flag values to an application.
pub trait FeatureFlagService: Send + Sync {
    /// Make `flags` the new defaults after a variant wins.
    fn set_flags(&self, application_id: &str, flags: &FlagMap) -> Result<()>;
    /// Restore the baseline values after a rollback.
    fn revert_flags(&self, application_id: &str, flags: &FlagMap) -> Result<()>;
}

/// Flag service that writes flag values into the experiment store.
pub struct StoreFlagService {
    store: Arc<dyn ExperimentStore>,
}

impl StoreFlagService {
    pub fn new(store: Arc<dyn ExperimentStore>) -> Self {
        Self { store }
    }
}

impl FeatureFlagService for StoreFlagService {
    fn set_flags(&self, application_id: &str, flags: &FlagMap) -> Result<()> {
        info!(application_id, count = flags.len(), "propagating feature flags");
        self.store.set_feature_flags(application_id, flags)
    }

    fn revert_flags(&self, application_id: &str, flags: &FlagMap) -> Result<()> {
        warn!(application_id, count = flags.len(), "reverting feature flags to baseline");
        self.store.set_feature_flags(application_id, flags)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        })
    }
}

pub trait AlertService: Send + Sync {
    fn send_alert(&self, title: &str, message: &str, severity: AlertSeverity) -> Result<()>;
}

/// Emits alerts as log records at a level matching their severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertService;

impl AlertService for TracingAlertService {
    fn send_alert(&self, title: &str, message: &str, severity: AlertSeverity) -> Result<()> {
        match severity {
            AlertSeverity::Info => info!(alert = title, %severity, "{message}"),
            AlertSeverity::Warning => warn!(alert = title, %severity, "{message}"),
            AlertSeverity::Critical => error!(alert = title, %severity, "{message}"),
        }
        Ok(())
    }
}
