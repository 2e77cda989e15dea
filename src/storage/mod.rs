//! Storage layer for xpilot
//!
//! The engine only talks to [`ExperimentStore`]. Two backends ship with the
//! crate: an in-process [`MemoryStore`] and a SQLite-backed [`SqliteStore`].

pub mod memory;
pub mod migrations;
pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{
    Actor, CohortConfig, DecisionLog, DecisionType, Experiment, ExperimentEvent,
    ExperimentStatus, FeedbackSignal, FlagMap, UserAssignment,
};
use crate::error::Result;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Partial experiment update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentUpdate {
    pub status: Option<ExperimentStatus>,
    pub cohort: Option<CohortConfig>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub decision: Option<DecisionType>,
    pub decision_reason: Option<String>,
    pub decision_at: Option<DateTime<Utc>>,
    pub decision_by: Option<Actor>,
}

impl ExperimentUpdate {
    pub fn status(status: ExperimentStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_decision(
        mut self,
        decision: DecisionType,
        reason: impl Into<String>,
        at: DateTime<Utc>,
        by: Actor,
    ) -> Self {
        self.decision = Some(decision);
        self.decision_reason = Some(reason.into());
        self.decision_at = Some(at);
        self.decision_by = Some(by);
        self
    }

    pub fn apply(&self, experiment: &mut Experiment) {
        if let Some(status) = self.status {
            experiment.status = status;
        }
        if let Some(cohort) = &self.cohort {
            experiment.cohort = cohort.clone();
        }
        if let Some(start_date) = self.start_date {
            experiment.start_date = start_date;
        }
        if let Some(end_date) = self.end_date {
            experiment.end_date = Some(end_date);
        }
        if let Some(decision) = self.decision {
            experiment.decision = Some(decision);
        }
        if let Some(reason) = &self.decision_reason {
            experiment.decision_reason = Some(reason.clone());
        }
        if let Some(at) = self.decision_at {
            experiment.decision_at = Some(at);
        }
        if let Some(by) = self.decision_by {
            experiment.decision_by = Some(by);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentFilter {
    pub status: Option<ExperimentStatus>,
    pub application_id: Option<String>,
}

impl ExperimentFilter {
    pub fn matches(&self, experiment: &Experiment) -> bool {
        self.status.is_none_or(|status| experiment.status == status)
            && self
                .application_id
                .as_deref()
                .is_none_or(|app| experiment.application_id == app)
    }
}

/// Persistence contract consumed by the engine.
///
/// Implementations must be safe to share across threads. Assignment writes
/// are last-write-wins; events, feedback and decision logs are append-only.
pub trait ExperimentStore: Send + Sync {
    fn create_experiment(&self, experiment: &Experiment) -> Result<()>;
    fn get_experiment(&self, experiment_id: &str) -> Result<Option<Experiment>>;
    /// Apply a partial update and return the stored result.
    /// Fails with `ExperimentNotFound` for unknown ids.
    fn update_experiment(&self, experiment_id: &str, update: &ExperimentUpdate)
    -> Result<Experiment>;
    fn list_experiments(&self, filter: &ExperimentFilter) -> Result<Vec<Experiment>>;

    fn get_running_experiments_for_app(&self, application_id: &str) -> Result<Vec<Experiment>> {
        self.list_experiments(&ExperimentFilter {
            status: Some(ExperimentStatus::Running),
            application_id: Some(application_id.to_string()),
        })
    }

    fn get_assignment(&self, experiment_id: &str, user_id: &str)
    -> Result<Option<UserAssignment>>;
    fn set_assignment(&self, assignment: &UserAssignment) -> Result<()>;
    fn get_assignments_by_user(&self, user_id: &str) -> Result<Vec<UserAssignment>>;
    /// Drop every sticky assignment of an experiment. Returns how many were removed.
    fn clear_assignments(&self, experiment_id: &str) -> Result<usize>;

    /// Running experiments (optionally of one application) the user is assigned to.
    fn get_active_experiments_for_user(
        &self,
        user_id: &str,
        application_id: Option<&str>,
    ) -> Result<Vec<Experiment>> {
        let mut active = Vec::new();
        for assignment in self.get_assignments_by_user(user_id)? {
            let Some(experiment) = self.get_experiment(&assignment.experiment_id)? else {
                continue;
            };
            if experiment.status != ExperimentStatus::Running {
                continue;
            }
            if application_id.is_some_and(|app| experiment.application_id != app) {
                continue;
            }
            active.push(experiment);
        }
        Ok(active)
    }

    fn add_event(&self, event: &ExperimentEvent) -> Result<()>;
    fn add_events(&self, events: &[ExperimentEvent]) -> Result<()> {
        for event in events {
            self.add_event(event)?;
        }
        Ok(())
    }
    fn get_events(&self, experiment_id: &str, metric_id: Option<&str>)
    -> Result<Vec<ExperimentEvent>>;
    fn get_events_by_variant(&self, experiment_id: &str, variant_id: &str)
    -> Result<Vec<ExperimentEvent>>;

    fn add_feedback(&self, signal: &FeedbackSignal) -> Result<()>;
    /// Feedback for an experiment, oldest first, optionally only at or after `since`.
    fn get_feedback(
        &self,
        experiment_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<FeedbackSignal>>;

    fn add_decision_log(&self, entry: &DecisionLog) -> Result<()>;
    fn get_decision_logs(&self, experiment_id: &str) -> Result<Vec<DecisionLog>>;

    fn get_user_segments(&self, user_id: &str) -> Result<Vec<String>>;
    fn set_user_segments(&self, user_id: &str, segments: &[String]) -> Result<()>;

    /// Merge `flags` into the application's current flag set.
    fn set_feature_flags(&self, application_id: &str, flags: &FlagMap) -> Result<()>;
    fn get_feature_flags(&self, application_id: &str) -> Result<FlagMap>;
}
