//! User to variant assignment.
//!
//! Eligibility (who is in the experiment) and bucketing (which arm they get)
//! hash into separate namespaces, so a percentage rollout does not skew the
//! variant split. Only bucketed users get a sticky assignment; excluded and
//! ineligible users see control and are re-checked on every call.

pub mod hashing;

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace};

use crate::clock::Clock;
use crate::core::{CohortConfig, Experiment, UserAssignment, Variant};
use crate::error::{Result, XpError};
use crate::storage::ExperimentStore;

use hashing::{eligibility_bucket, variant_bucket};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentSource {
    /// Existing sticky assignment reused.
    Sticky,
    /// Newly bucketed and persisted.
    Bucketed,
    /// User is on the cohort exclude list.
    Excluded,
    /// User failed the cohort eligibility rule.
    Ineligible,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentDecision {
    pub experiment_id: String,
    pub user_id: String,
    pub variant: Variant,
    pub source: AssignmentSource,
}

pub struct Assigner {
    store: Arc<dyn ExperimentStore>,
    clock: Arc<dyn Clock>,
}

impl Assigner {
    pub fn new(store: Arc<dyn ExperimentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Variant the user should see.
    pub fn assign_user(&self, experiment_id: &str, user_id: &str) -> Result<Variant> {
        Ok(self.resolve(experiment_id, user_id)?.variant)
    }

    /// Like [`Self::assign_user`], but also reports how the variant was chosen.
    pub fn resolve(&self, experiment_id: &str, user_id: &str) -> Result<AssignmentDecision> {
        let experiment = self
            .store
            .get_experiment(experiment_id)?
            .ok_or_else(|| XpError::ExperimentNotFound(experiment_id.to_string()))?;

        let decision = |variant: &Variant, source| AssignmentDecision {
            experiment_id: experiment_id.to_string(),
            user_id: user_id.to_string(),
            variant: variant.clone(),
            source,
        };

        if let Some(existing) = self.store.get_assignment(experiment_id, user_id)? {
            if let Some(variant) = experiment.variant(&existing.variant_id) {
                trace!(experiment_id, user_id, variant = %variant.id, "sticky assignment");
                return Ok(decision(variant, AssignmentSource::Sticky));
            }
            debug!(
                experiment_id,
                user_id,
                stale_variant = %existing.variant_id,
                "sticky assignment points at removed variant, reassigning"
            );
        }

        let control = experiment.require_control()?;

        if experiment.cohort.is_excluded(user_id) {
            debug!(experiment_id, user_id, "user excluded, serving control");
            return Ok(decision(control, AssignmentSource::Excluded));
        }

        if !self.is_eligible(&experiment, user_id)? {
            trace!(experiment_id, user_id, "user not eligible, serving control");
            return Ok(decision(control, AssignmentSource::Ineligible));
        }

        let bucket = variant_bucket(experiment_id, user_id);
        let variant = select_variant(&experiment, bucket).unwrap_or(control);

        self.store.set_assignment(&UserAssignment {
            experiment_id: experiment_id.to_string(),
            user_id: user_id.to_string(),
            variant_id: variant.id.clone(),
            assigned_at: self.clock.now(),
        })?;
        debug!(experiment_id, user_id, bucket, variant = %variant.id, "assigned user");

        Ok(decision(variant, AssignmentSource::Bucketed))
    }

    fn is_eligible(&self, experiment: &Experiment, user_id: &str) -> Result<bool> {
        Ok(match &experiment.cohort {
            CohortConfig::Percentage { percentage, .. } => {
                f64::from(eligibility_bucket(&experiment.id, user_id)) < percentage * 100.0
            }
            CohortConfig::Allowlist { user_ids } => user_ids.iter().any(|id| id == user_id),
            CohortConfig::Segment { segments } => {
                let memberships = self.store.get_user_segments(user_id)?;
                memberships.iter().any(|segment| segments.contains(segment))
            }
        })
    }
}

/// Walk variants in declared order over cumulative `weight * 100` bounds.
/// The last variant absorbs any remainder.
pub fn select_variant(experiment: &Experiment, bucket: u32) -> Option<&Variant> {
    let mut cumulative = 0u32;
    for variant in &experiment.variants {
        cumulative += variant.weight * 100;
        if bucket < cumulative {
            return Some(variant);
        }
    }
    experiment.variants.last()
}
