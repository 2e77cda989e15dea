//! Negative-feedback spike detection.
//!
//! Feedback is attributed to the variant the user is assigned to in each
//! running experiment of the application. When the trailing window shows a
//! burst of mostly negative signals, the auto-pilot is run immediately.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::autopilot::{AutoPilot, AutoPilotOutcome};
use crate::clock::Clock;
use crate::config::FeedbackConfig;
use crate::core::{Experiment, FeedbackSignal, FeedbackType, Sentiment};
use crate::error::Result;
use crate::storage::ExperimentStore;

/// Feedback as reported by a collaborator, before attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackInput {
    pub user_id: String,
    #[serde(rename = "type")]
    pub feedback_type: FeedbackType,
    pub sentiment: Sentiment,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggeredRun {
    pub experiment_id: String,
    pub signals: usize,
    pub negative_ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<AutoPilotOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedbackReport {
    pub recorded: Vec<FeedbackSignal>,
    pub triggered: Vec<TriggeredRun>,
}

pub struct FeedbackTrigger {
    store: Arc<dyn ExperimentStore>,
    autopilot: Arc<AutoPilot>,
    clock: Arc<dyn Clock>,
    config: FeedbackConfig,
}

impl FeedbackTrigger {
    pub fn new(
        store: Arc<dyn ExperimentStore>,
        autopilot: Arc<AutoPilot>,
        clock: Arc<dyn Clock>,
        config: FeedbackConfig,
    ) -> Self {
        Self {
            store,
            autopilot,
            clock,
            config,
        }
    }

    /// Record a signal against the user's live assignments and react to spikes.
    pub fn receive(&self, application_id: &str, input: &FeedbackInput) -> Result<FeedbackReport> {
        let now = self.clock.now();
        let mut report = FeedbackReport::default();

        for experiment in self
            .store
            .get_active_experiments_for_user(&input.user_id, Some(application_id))?
        {
            let Some(assignment) = self.store.get_assignment(&experiment.id, &input.user_id)?
            else {
                continue;
            };
            let signal = FeedbackSignal {
                id: uuid::Uuid::new_v4().to_string(),
                experiment_id: experiment.id.clone(),
                variant_id: assignment.variant_id,
                user_id: input.user_id.clone(),
                feedback_type: input.feedback_type,
                sentiment: input.sentiment,
                score: input.score,
                message: input.message.clone(),
                timestamp: input.timestamp.map_or(now, |reported| reported.min(now)),
            };
            self.store.add_feedback(&signal)?;
            report.recorded.push(signal);
        }

        if report.recorded.is_empty() {
            debug!(
                application_id,
                user_id = %input.user_id,
                "no live assignment, feedback not recorded"
            );
        }

        for experiment in self.store.get_running_experiments_for_app(application_id)? {
            if let Some(run) = self.check_spike(&experiment, now)? {
                report.triggered.push(run);
            }
        }

        Ok(report)
    }

    fn check_spike(
        &self,
        experiment: &Experiment,
        now: DateTime<Utc>,
    ) -> Result<Option<TriggeredRun>> {
        let since = i64::try_from(self.config.window_minutes)
            .ok()
            .and_then(Duration::try_minutes)
            .and_then(|window| now.checked_sub_signed(window));
        let mut recent = self.store.get_feedback(&experiment.id, since)?;
        recent.retain(|signal| signal.timestamp <= now);
        if recent.is_empty() || recent.len() < self.config.min_signals {
            return Ok(None);
        }

        let negative = recent
            .iter()
            .filter(|signal| signal.sentiment == Sentiment::Negative)
            .count();
        let ratio = negative as f64 / recent.len() as f64;
        if ratio <= self.config.negative_ratio {
            return Ok(None);
        }

        info!(
            experiment_id = %experiment.id,
            signals = recent.len(),
            negative_ratio = ratio,
            "negative feedback spike, running auto-pilot"
        );
        let mut run = TriggeredRun {
            experiment_id: experiment.id.clone(),
            signals: recent.len(),
            negative_ratio: ratio,
            outcome: None,
            error: None,
        };
        match self.autopilot.run_autopilot(&experiment.id) {
            Ok(outcome) => run.outcome = Some(outcome),
            Err(err) => {
                warn!(
                    experiment_id = %experiment.id,
                    error = %err,
                    "spike-triggered auto-pilot failed"
                );
                run.error = Some(err.to_string());
            }
        }
        Ok(Some(run))
    }
}
