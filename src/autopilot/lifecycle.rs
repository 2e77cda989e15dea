//! Operator-driven lifecycle actions.
//!
//! Each action checks the transition, applies it, and appends one decision
//! log entry attributed to a manual actor. Failures are returned as-is.

use tracing::info;

use super::AutoPilot;
use crate::core::{
    Actor, CohortConfig, DecisionAction, DecisionType, Experiment, ExperimentStatus,
};
use crate::error::{Result, XpError};
use crate::services::AlertSeverity;
use crate::storage::ExperimentUpdate;

impl AutoPilot {
    /// Validate and store a new experiment definition.
    pub fn create_experiment(&self, experiment: &Experiment) -> Result<()> {
        experiment.validate()?;
        if self.store.get_experiment(&experiment.id)?.is_some() {
            return Err(XpError::ValidationFailed(format!(
                "experiment already exists: {}",
                experiment.id
            )));
        }
        self.store.create_experiment(experiment)?;
        info!(experiment_id = %experiment.id, status = %experiment.status, "experiment created");
        Ok(())
    }

    /// Draft to running. Stamps the start date.
    pub fn start(&self, experiment_id: &str) -> Result<Experiment> {
        let experiment = self.load(experiment_id)?;
        if experiment.status != ExperimentStatus::Draft {
            return Err(invalid_transition(&experiment, ExperimentStatus::Running));
        }
        experiment.validate()?;

        let now = self.clock.now();
        let updated = self.store.update_experiment(
            experiment_id,
            &ExperimentUpdate {
                start_date: Some(now),
                ..ExperimentUpdate::status(ExperimentStatus::Running)
            },
        )?;
        self.log(&experiment, DecisionAction::Start, "Experiment started", Actor::Manual, None)?;
        info!(experiment_id, "experiment started");
        Ok(updated)
    }

    pub fn pause(&self, experiment_id: &str, reason: &str) -> Result<Experiment> {
        self.transition(
            experiment_id,
            ExperimentStatus::Running,
            ExperimentStatus::Paused,
            DecisionAction::Pause,
            reason,
        )
    }

    pub fn resume(&self, experiment_id: &str) -> Result<Experiment> {
        self.transition(
            experiment_id,
            ExperimentStatus::Paused,
            ExperimentStatus::Running,
            DecisionAction::Resume,
            "Experiment resumed",
        )
    }

    /// Make `variant_id` the default and complete the experiment.
    pub fn roll_forward(
        &self,
        experiment_id: &str,
        variant_id: &str,
        reason: &str,
    ) -> Result<Experiment> {
        let experiment = self.load(experiment_id)?;
        let variant = experiment.variant(variant_id).ok_or_else(|| XpError::VariantNotFound {
            experiment_id: experiment_id.to_string(),
            variant_id: variant_id.to_string(),
        })?;
        check_transition(&experiment, ExperimentStatus::Completed)?;

        self.flags
            .set_flags(&experiment.application_id, &variant.feature_flags)?;
        let updated = self.store.update_experiment(
            experiment_id,
            &ExperimentUpdate::status(ExperimentStatus::Completed).with_decision(
                DecisionType::RollForward,
                reason,
                self.clock.now(),
                Actor::Manual,
            ),
        )?;
        self.log(&experiment, DecisionAction::RollForward, reason, Actor::Manual, None)?;
        self.alert(
            &format!("Experiment {} rolled forward", experiment.name),
            &format!("Variant {variant_id} promoted manually: {reason}"),
            AlertSeverity::Info,
        );
        info!(experiment_id, variant_id, "manual roll-forward");
        Ok(updated)
    }

    /// Restore the control flags and mark the experiment rolled back.
    pub fn roll_back(&self, experiment_id: &str, reason: &str) -> Result<Experiment> {
        let experiment = self.load(experiment_id)?;
        check_transition(&experiment, ExperimentStatus::RolledBack)?;
        let control = experiment.require_control()?;

        self.flags
            .revert_flags(&experiment.application_id, &control.feature_flags)?;
        let updated = self.store.update_experiment(
            experiment_id,
            &ExperimentUpdate::status(ExperimentStatus::RolledBack).with_decision(
                DecisionType::RollBack,
                reason,
                self.clock.now(),
                Actor::Manual,
            ),
        )?;
        self.log(&experiment, DecisionAction::RollBack, reason, Actor::Manual, None)?;
        self.alert(
            &format!("Experiment {} rolled back", experiment.name),
            &format!("Manual rollback: {reason}"),
            AlertSeverity::Warning,
        );
        info!(experiment_id, "manual roll-back");
        Ok(updated)
    }

    /// Change the eligible share of a percentage cohort. Status is untouched.
    pub fn graduate_rollout(&self, experiment_id: &str, new_percentage: f64) -> Result<Experiment> {
        if !new_percentage.is_finite() || !(0.0..=100.0).contains(&new_percentage) {
            return Err(XpError::InvalidPercentage(new_percentage));
        }

        let experiment = self.load(experiment_id)?;
        if experiment.status.is_terminal() {
            return Err(XpError::InvalidTransition {
                experiment_id: experiment_id.to_string(),
                from: experiment.status.to_string(),
                to: format!("rollout {new_percentage}%"),
            });
        }
        let CohortConfig::Percentage {
            percentage: previous,
            exclude_list,
        } = &experiment.cohort
        else {
            return Err(XpError::ValidationFailed(format!(
                "experiment {experiment_id} does not use a percentage cohort"
            )));
        };

        let updated = self.store.update_experiment(
            experiment_id,
            &ExperimentUpdate {
                cohort: Some(CohortConfig::Percentage {
                    percentage: new_percentage,
                    exclude_list: exclude_list.clone(),
                }),
                ..ExperimentUpdate::default()
            },
        )?;
        let reason = format!("Rollout changed from {previous}% to {new_percentage}%");
        self.log(&experiment, DecisionAction::Graduate, &reason, Actor::Manual, None)?;
        info!(experiment_id, previous, new_percentage, "rollout graduated");
        Ok(updated)
    }

    fn transition(
        &self,
        experiment_id: &str,
        from: ExperimentStatus,
        to: ExperimentStatus,
        action: DecisionAction,
        reason: &str,
    ) -> Result<Experiment> {
        let experiment = self.load(experiment_id)?;
        if experiment.status != from {
            return Err(invalid_transition(&experiment, to));
        }
        let updated = self
            .store
            .update_experiment(experiment_id, &ExperimentUpdate::status(to))?;
        self.log(&experiment, action, reason, Actor::Manual, None)?;
        info!(experiment_id, from = %from, to = %to, "experiment status changed");
        Ok(updated)
    }
}

fn check_transition(experiment: &Experiment, to: ExperimentStatus) -> Result<()> {
    if experiment.status.can_transition_to(to) {
        Ok(())
    } else {
        Err(invalid_transition(experiment, to))
    }
}

fn invalid_transition(experiment: &Experiment, to: ExperimentStatus) -> XpError {
    XpError::InvalidTransition {
        experiment_id: experiment.id.clone(),
        from: experiment.status.to_string(),
        to: to.to_string(),
    }
}
