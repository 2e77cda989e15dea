//! Rollout controller.
//!
//! The auto-pilot turns an evaluation into a lifecycle step: roll back on a
//! breach or regression, roll forward a winner, pause an experiment that
//! outlived its end date. Manual equivalents live in [`lifecycle`].

pub mod lifecycle;

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::core::{
    Actor, DecisionAction, DecisionLog, DecisionType, Experiment, ExperimentStatus,
};
use crate::error::{Result, XpError};
use crate::evaluation::{Evaluator, ExperimentEvaluation, Recommendation};
use crate::services::{AlertService, AlertSeverity, FeatureFlagService};
use crate::storage::{ExperimentStore, ExperimentUpdate};

/// What a single auto-pilot run did to the experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoPilotAction {
    RolledBack,
    RolledForward,
    Paused,
    NoChange,
}

#[derive(Debug, Clone, Serialize)]
pub struct AutoPilotOutcome {
    pub experiment_id: String,
    pub action: AutoPilotAction,
    pub status: ExperimentStatus,
    pub recommendation: Recommendation,
    pub reason: String,
    /// Variant whose flags became the default on roll-forward.
    pub winner: Option<String>,
    pub evaluation: ExperimentEvaluation,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepEntry {
    pub experiment_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<AutoPilotOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub entries: Vec<SweepEntry>,
}

impl SweepReport {
    pub fn failures(&self) -> usize {
        self.entries.iter().filter(|entry| entry.error.is_some()).count()
    }

    pub fn changed(&self) -> usize {
        self.entries
            .iter()
            .filter_map(|entry| entry.outcome.as_ref())
            .filter(|outcome| outcome.action != AutoPilotAction::NoChange)
            .count()
    }
}

pub struct AutoPilot {
    store: Arc<dyn ExperimentStore>,
    evaluator: Evaluator,
    flags: Arc<dyn FeatureFlagService>,
    alerts: Arc<dyn AlertService>,
    clock: Arc<dyn Clock>,
}

impl AutoPilot {
    pub fn new(
        store: Arc<dyn ExperimentStore>,
        evaluator: Evaluator,
        flags: Arc<dyn FeatureFlagService>,
        alerts: Arc<dyn AlertService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            evaluator,
            flags,
            alerts,
            clock,
        }
    }

    /// Evaluate a running experiment and act on the recommendation.
    pub fn run_autopilot(&self, experiment_id: &str) -> Result<AutoPilotOutcome> {
        let experiment = self.load(experiment_id)?;
        if experiment.status != ExperimentStatus::Running {
            return Err(XpError::NotRunning {
                experiment_id: experiment_id.to_string(),
                status: experiment.status.to_string(),
            });
        }

        let evaluation = self.evaluator.evaluate_loaded(&experiment)?;
        let now = evaluation.evaluated_at;
        let mut reason = evaluation.reason.clone();

        let (action, status, winner) = match evaluation.recommendation {
            Recommendation::RollBack => {
                let control = experiment.require_control()?;
                self.flags
                    .revert_flags(&experiment.application_id, &control.feature_flags)?;
                self.store.update_experiment(
                    experiment_id,
                    &ExperimentUpdate::status(ExperimentStatus::RolledBack).with_decision(
                        DecisionType::RollBack,
                        &evaluation.reason,
                        now,
                        Actor::Auto,
                    ),
                )?;
                self.log(
                    &experiment,
                    DecisionAction::RollBack,
                    &evaluation.reason,
                    Actor::Auto,
                    Some(&evaluation),
                )?;
                self.alert(
                    &format!("Experiment {} rolled back", experiment.name),
                    &evaluation.reason,
                    AlertSeverity::Critical,
                );
                (AutoPilotAction::RolledBack, ExperimentStatus::RolledBack, None)
            }
            Recommendation::RollForward => {
                let control = experiment.require_control()?;
                let winner = evaluation
                    .winning_variant()
                    .and_then(|id| experiment.variant(id))
                    .unwrap_or(control);
                reason = format!("{}, promoted {}", evaluation.reason, winner.id);
                self.flags
                    .set_flags(&experiment.application_id, &winner.feature_flags)?;
                self.store.update_experiment(
                    experiment_id,
                    &ExperimentUpdate::status(ExperimentStatus::Completed).with_decision(
                        DecisionType::RollForward,
                        &reason,
                        now,
                        Actor::Auto,
                    ),
                )?;
                self.log(
                    &experiment,
                    DecisionAction::RollForward,
                    &reason,
                    Actor::Auto,
                    Some(&evaluation),
                )?;
                self.alert(
                    &format!("Experiment {} rolled forward", experiment.name),
                    &format!("Variant {} is now the default. {reason}", winner.id),
                    AlertSeverity::Info,
                );
                (
                    AutoPilotAction::RolledForward,
                    ExperimentStatus::Completed,
                    Some(winner.id.clone()),
                )
            }
            Recommendation::Extend if experiment.end_date.is_some_and(|end| now >= end) => {
                self.store.update_experiment(
                    experiment_id,
                    &ExperimentUpdate::status(ExperimentStatus::Paused),
                )?;
                self.log(
                    &experiment,
                    DecisionAction::Pause,
                    &evaluation.reason,
                    Actor::Auto,
                    Some(&evaluation),
                )?;
                self.alert(
                    &format!("Experiment {} needs review", experiment.name),
                    &evaluation.reason,
                    AlertSeverity::Warning,
                );
                (AutoPilotAction::Paused, ExperimentStatus::Paused, None)
            }
            Recommendation::Extend => (AutoPilotAction::NoChange, experiment.status, None),
            Recommendation::InsufficientData => {
                self.log(
                    &experiment,
                    DecisionAction::InsufficientData,
                    &evaluation.reason,
                    Actor::Auto,
                    Some(&evaluation),
                )?;
                (AutoPilotAction::NoChange, experiment.status, None)
            }
        };

        info!(
            experiment_id,
            recommendation = %evaluation.recommendation,
            ?action,
            status = %status,
            "auto-pilot run complete"
        );

        Ok(AutoPilotOutcome {
            experiment_id: experiment_id.to_string(),
            action,
            status,
            recommendation: evaluation.recommendation,
            reason,
            winner,
            evaluation,
        })
    }

    /// Run the auto-pilot over every running experiment, optionally of one
    /// application. A failing experiment is recorded and skipped.
    pub fn run_sweep(&self, application_id: Option<&str>) -> Result<SweepReport> {
        let experiments = match application_id {
            Some(app) => self.store.get_running_experiments_for_app(app)?,
            None => self.store.list_experiments(&crate::storage::ExperimentFilter {
                status: Some(ExperimentStatus::Running),
                application_id: None,
            })?,
        };

        let mut report = SweepReport::default();
        for experiment in experiments {
            let entry = match self.run_autopilot(&experiment.id) {
                Ok(outcome) => SweepEntry {
                    experiment_id: experiment.id,
                    outcome: Some(outcome),
                    error: None,
                },
                Err(err) => {
                    warn!(experiment_id = %experiment.id, error = %err, "auto-pilot failed during sweep");
                    SweepEntry {
                        experiment_id: experiment.id,
                        outcome: None,
                        error: Some(err.to_string()),
                    }
                }
            };
            report.entries.push(entry);
        }

        info!(
            experiments = report.entries.len(),
            changed = report.changed(),
            failures = report.failures(),
            "auto-pilot sweep finished"
        );
        Ok(report)
    }

    fn load(&self, experiment_id: &str) -> Result<Experiment> {
        self.store
            .get_experiment(experiment_id)?
            .ok_or_else(|| XpError::ExperimentNotFound(experiment_id.to_string()))
    }

    fn log(
        &self,
        experiment: &Experiment,
        action: DecisionAction,
        reason: &str,
        actor: Actor,
        evaluation: Option<&ExperimentEvaluation>,
    ) -> Result<()> {
        let mut entry = DecisionLog::new(&experiment.id, action, reason, actor, self.clock.now());
        if let Some(evaluation) = evaluation {
            entry = entry.with_evaluation(evaluation.clone());
        }
        self.store.add_decision_log(&entry)
    }

    /// Alerts are best effort once the state change is stored.
    fn alert(&self, title: &str, message: &str, severity: AlertSeverity) {
        if let Err(err) = self.alerts.send_alert(title, message, severity) {
            warn!(title, error = %err, "failed to deliver alert");
        }
    }
}
