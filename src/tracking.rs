//! Metric event ingestion.
//!
//! Events are attributed to the variant of the user's sticky assignment at
//! write time. Users without an assignment contribute nothing.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::core::ExperimentEvent;
use crate::error::{Result, XpError};
use crate::storage::ExperimentStore;

/// One entry of a batch submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInput {
    pub experiment_id: String,
    pub user_id: String,
    pub metric_id: String,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub recorded: usize,
    /// Entries dropped because the user had no assignment.
    pub skipped: usize,
    /// Entries that hit an error, with the reason.
    pub failed: Vec<BatchFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchFailure {
    pub index: usize,
    pub error: String,
}

pub struct EventTracker {
    store: Arc<dyn ExperimentStore>,
    clock: Arc<dyn Clock>,
}

impl EventTracker {
    pub fn new(store: Arc<dyn ExperimentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Record one observation. Returns `None` when the user is unassigned.
    pub fn track_event(
        &self,
        experiment_id: &str,
        user_id: &str,
        metric_id: &str,
        value: f64,
    ) -> Result<Option<ExperimentEvent>> {
        let Some(event) = self.resolve(experiment_id, user_id, metric_id, value)? else {
            return Ok(None);
        };
        self.store.add_event(&event)?;
        Ok(Some(event))
    }

    /// Record many observations. Unassigned users and failing entries are
    /// skipped individually; the rest are written in one store call.
    pub fn track_events_batch(&self, inputs: &[EventInput]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        let mut events = Vec::with_capacity(inputs.len());

        for (index, input) in inputs.iter().enumerate() {
            match self.resolve(&input.experiment_id, &input.user_id, &input.metric_id, input.value)
            {
                Ok(Some(event)) => events.push(event),
                Ok(None) => outcome.skipped += 1,
                Err(err) => {
                    warn!(index, experiment_id = %input.experiment_id, error = %err, "batch event rejected");
                    outcome.failed.push(BatchFailure {
                        index,
                        error: err.to_string(),
                    });
                }
            }
        }

        if !events.is_empty() {
            self.store.add_events(&events)?;
        }
        outcome.recorded = events.len();
        debug!(
            recorded = outcome.recorded,
            skipped = outcome.skipped,
            failed = outcome.failed.len(),
            "event batch stored"
        );
        Ok(outcome)
    }

    fn resolve(
        &self,
        experiment_id: &str,
        user_id: &str,
        metric_id: &str,
        value: f64,
    ) -> Result<Option<ExperimentEvent>> {
        if !value.is_finite() {
            return Err(XpError::ValidationFailed(format!(
                "metric {metric_id} value must be finite, got {value}"
            )));
        }
        if self.store.get_experiment(experiment_id)?.is_none() {
            return Err(XpError::ExperimentNotFound(experiment_id.to_string()));
        }

        let Some(assignment) = self.store.get_assignment(experiment_id, user_id)? else {
            debug!(experiment_id, user_id, metric_id, "user not assigned, event dropped");
            return Ok(None);
        };

        Ok(Some(ExperimentEvent {
            id: uuid::Uuid::new_v4().to_string(),
            experiment_id: experiment_id.to_string(),
            user_id: user_id.to_string(),
            variant_id: assignment.variant_id,
            metric_id: metric_id.to_string(),
            value,
            timestamp: self.clock.now(),
        }))
    }
}
