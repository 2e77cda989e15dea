//! Experiment evaluation.
//!
//! An evaluation is recomputed from the stored events on every call and is
//! never persisted except as a snapshot inside a decision log entry. Two
//! evaluations over the same events agree in everything but `evaluated_at`.

pub mod aggregate;
pub mod policy;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::core::{Aggregation, DecisionAction, Experiment, ExperimentEvent, MetricDirection};
use crate::error::{Result, XpError};
use crate::stats::{self, DEFAULT_SIGNIFICANCE_LEVEL};
use crate::storage::ExperimentStore;

use aggregate::{VariantEvents, group_by_variant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    RollForward,
    RollBack,
    Extend,
    InsufficientData,
}

impl Recommendation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RollForward => "roll_forward",
            Self::RollBack => "roll_back",
            Self::Extend => "extend",
            Self::InsufficientData => "insufficient_data",
        }
    }

    pub const fn action(&self) -> DecisionAction {
        match self {
            Self::RollForward => DecisionAction::RollForward,
            Self::RollBack => DecisionAction::RollBack,
            Self::Extend => DecisionAction::Extend,
            Self::InsufficientData => DecisionAction::InsufficientData,
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailStatus {
    AllGreen,
    Breached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatTest {
    ChiSquared,
    TTest,
}

/// Aggregated value of one metric for one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantResult {
    pub variant_id: String,
    pub metric_id: String,
    pub value: f64,
    /// Distinct users that reported this metric.
    pub sample_size: u64,
}

/// One treatment variant measured against control on one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub variant_id: String,
    pub metric_id: String,
    pub test: StatTest,
    pub control_value: f64,
    pub treatment_value: f64,
    #[serde(with = "unbounded")]
    pub lift: f64,
    pub p_value: f64,
    pub confidence: f64,
    pub is_significant: bool,
}

impl MetricComparison {
    /// Significant and moving against the metric's declared direction.
    pub fn is_regression(&self, direction: MetricDirection) -> bool {
        if !self.is_significant {
            return false;
        }
        let delta = self.treatment_value - self.control_value;
        match direction {
            MetricDirection::Increase => delta < 0.0,
            MetricDirection::Decrease => delta > 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentEvaluation {
    pub experiment_id: String,
    pub evaluated_at: DateTime<Utc>,
    pub variant_results: Vec<VariantResult>,
    pub comparisons: Vec<MetricComparison>,
    pub guardrail_status: GuardrailStatus,
    #[serde(default)]
    pub guardrail_breaches: Vec<String>,
    pub recommendation: Recommendation,
    pub reason: String,
    /// Distinct users with at least one event.
    pub sample_size: u64,
    pub duration_hours: f64,
}

impl ExperimentEvaluation {
    pub fn result(&self, variant_id: &str, metric_id: &str) -> Option<&VariantResult> {
        self.variant_results
            .iter()
            .find(|result| result.variant_id == variant_id && result.metric_id == metric_id)
    }

    pub fn comparison(&self, variant_id: &str, metric_id: &str) -> Option<&MetricComparison> {
        self.comparisons
            .iter()
            .find(|comparison| comparison.variant_id == variant_id && comparison.metric_id == metric_id)
    }

    /// Treatment with the single highest significant positive lift.
    /// `None` when nothing qualifies or the top lift is shared.
    pub fn winning_variant(&self) -> Option<&str> {
        let mut best: Option<(&str, f64)> = None;
        let mut tied = false;
        for comparison in self.comparisons.iter().filter(|c| c.is_significant && c.lift > 0.0) {
            match best {
                Some((variant, lift)) if comparison.lift == lift => {
                    tied |= variant != comparison.variant_id;
                }
                Some((_, lift)) if comparison.lift < lift => {}
                _ => {
                    best = Some((comparison.variant_id.as_str(), comparison.lift));
                    tied = false;
                }
            }
        }
        if tied { None } else { best.map(|(variant, _)| variant) }
    }
}

/// Evaluate `experiment` over `events` as of `now`.
pub fn evaluate(
    experiment: &Experiment,
    events: &[ExperimentEvent],
    now: DateTime<Utc>,
    significance_level: f64,
) -> Result<ExperimentEvaluation> {
    let control = experiment.require_control()?;
    let grouped = group_by_variant(events);
    let empty = VariantEvents::default();
    let events_for = |variant_id: &str| grouped.get(variant_id).unwrap_or(&empty);

    let mut variant_results = Vec::new();
    for variant in &experiment.variants {
        let data = events_for(&variant.id);
        for metric in &experiment.metrics {
            variant_results.push(VariantResult {
                variant_id: variant.id.clone(),
                metric_id: metric.id.clone(),
                value: data.aggregate(&metric.id, metric.aggregation),
                sample_size: data.metric_users(&metric.id),
            });
        }
    }

    let control_data = events_for(&control.id);
    let mut comparisons = Vec::new();
    for variant in experiment.treatment_variants() {
        let data = events_for(&variant.id);
        for metric in &experiment.metrics {
            let (test, result) = if metric.is_conversion() {
                (
                    StatTest::ChiSquared,
                    stats::chi_squared_test(
                        control_data.converted_users(&metric.id),
                        control_data.user_count(),
                        data.converted_users(&metric.id),
                        data.user_count(),
                    ),
                )
            } else {
                (
                    StatTest::TTest,
                    stats::t_test(&control_data.values(&metric.id), &data.values(&metric.id)),
                )
            };
            let control_value = control_data.aggregate(&metric.id, metric.aggregation);
            let treatment_value = data.aggregate(&metric.id, metric.aggregation);
            comparisons.push(MetricComparison {
                variant_id: variant.id.clone(),
                metric_id: metric.id.clone(),
                test,
                control_value,
                treatment_value,
                lift: stats::calculate_lift(control_value, treatment_value),
                p_value: result.p_value,
                confidence: result.confidence,
                is_significant: stats::is_significant(result.p_value, significance_level),
            });
        }
    }

    let mut guardrail_breaches = Vec::new();
    for guardrail in &experiment.guardrails {
        let aggregation = experiment
            .metric(&guardrail.metric_id)
            .map_or(Aggregation::Avg, |metric| metric.aggregation);
        for variant in experiment.treatment_variants() {
            let data = events_for(&variant.id);
            if data.metric(&guardrail.metric_id).is_empty() {
                continue;
            }
            let value = data.aggregate(&guardrail.metric_id, aggregation);
            if guardrail.is_breached_by(value) {
                warn!(
                    experiment_id = %experiment.id,
                    variant = %variant.id,
                    metric = %guardrail.metric_id,
                    value,
                    threshold = guardrail.threshold,
                    "guardrail breached"
                );
                guardrail_breaches.push(format!(
                    "{} on {} is {value:.4} ({} {})",
                    guardrail.metric_id,
                    variant.id,
                    guardrail.comparison.symbol(),
                    guardrail.threshold
                ));
            }
        }
    }

    let sample_size = grouped
        .values()
        .flat_map(|data| data.users.iter().copied())
        .collect::<std::collections::BTreeSet<_>>()
        .len() as u64;
    let duration_hours = (now - experiment.start_date).num_milliseconds() as f64 / 3_600_000.0;

    let mut evaluation = ExperimentEvaluation {
        experiment_id: experiment.id.clone(),
        evaluated_at: now,
        variant_results,
        comparisons,
        guardrail_status: if guardrail_breaches.is_empty() {
            GuardrailStatus::AllGreen
        } else {
            GuardrailStatus::Breached
        },
        guardrail_breaches,
        recommendation: Recommendation::InsufficientData,
        reason: String::new(),
        sample_size,
        duration_hours,
    };

    let (recommendation, reason) = policy::recommend(experiment, &evaluation, now);
    evaluation.recommendation = recommendation;
    evaluation.reason = reason;
    Ok(evaluation)
}

/// Loads experiments and events from the store and evaluates them.
#[derive(Clone)]
pub struct Evaluator {
    store: Arc<dyn ExperimentStore>,
    clock: Arc<dyn Clock>,
    significance_level: f64,
}

impl Evaluator {
    pub fn new(store: Arc<dyn ExperimentStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            significance_level: DEFAULT_SIGNIFICANCE_LEVEL,
        }
    }

    #[must_use]
    pub fn with_significance_level(mut self, level: f64) -> Self {
        self.significance_level = level;
        self
    }

    pub fn evaluate_experiment(&self, experiment_id: &str) -> Result<ExperimentEvaluation> {
        let experiment = self
            .store
            .get_experiment(experiment_id)?
            .ok_or_else(|| XpError::ExperimentNotFound(experiment_id.to_string()))?;
        self.evaluate_loaded(&experiment)
    }

    pub fn evaluate_loaded(&self, experiment: &Experiment) -> Result<ExperimentEvaluation> {
        let events = self.store.get_events(&experiment.id, None)?;
        let evaluation = evaluate(experiment, &events, self.clock.now(), self.significance_level)?;
        debug!(
            experiment_id = %experiment.id,
            events = events.len(),
            users = evaluation.sample_size,
            recommendation = %evaluation.recommendation,
            "evaluated experiment"
        );
        Ok(evaluation)
    }
}

/// Lift can be infinite, which JSON cannot carry. Non-finite values are
/// written as `null` and read back as positive infinity.
mod unbounded {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}
