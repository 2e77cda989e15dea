//! Built-in experiment templates.
//!
//! The table is built once on first use and never mutated afterwards.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use serde::Serialize;

use super::experiment::{
    Aggregation, Comparison, Experiment, ExperimentMetric, GuardrailAction, GuardrailMetric,
    MetricDirection, MetricType, SuccessCriterion,
};

#[derive(Debug, Clone, Serialize)]
pub struct ExperimentPreset {
    pub name: &'static str,
    pub description: &'static str,
    pub metrics: Vec<ExperimentMetric>,
    pub guardrails: Vec<GuardrailMetric>,
    pub success_criteria: Vec<SuccessCriterion>,
    pub min_sample_size: u64,
    pub min_duration_hours: f64,
}

impl ExperimentPreset {
    /// Fill in whatever the experiment leaves unspecified.
    pub fn apply(&self, experiment: &mut Experiment) {
        if experiment.metrics.is_empty() {
            experiment.metrics = self.metrics.clone();
        }
        if experiment.guardrails.is_empty() {
            experiment.guardrails = self.guardrails.clone();
        }
        if experiment.success_criteria.is_empty() {
            experiment.success_criteria = self.success_criteria.clone();
        }
        if experiment.min_sample_size == 0 {
            experiment.min_sample_size = self.min_sample_size;
        }
        if experiment.min_duration_hours <= 0.0 {
            experiment.min_duration_hours = self.min_duration_hours;
        }
    }
}

fn guardrail(metric_id: &str, threshold: f64, comparison: Comparison, description: &str) -> GuardrailMetric {
    GuardrailMetric {
        metric_id: metric_id.to_string(),
        threshold,
        comparison,
        description: description.to_string(),
        action: GuardrailAction::Rollback,
    }
}

fn criterion(metric_id: &str, min_lift: f64, confidence: f64) -> SuccessCriterion {
    SuccessCriterion {
        metric_id: metric_id.to_string(),
        min_lift,
        confidence,
    }
}

fn error_rate_metric() -> ExperimentMetric {
    ExperimentMetric::new(
        "error_rate",
        MetricType::Count,
        Aggregation::Avg,
        MetricDirection::Decrease,
    )
}

pub static EXPERIMENT_PRESETS: LazyLock<BTreeMap<&'static str, ExperimentPreset>> =
    LazyLock::new(|| {
        let presets = [
            ExperimentPreset {
                name: "conversion",
                description: "Checkout or signup funnel change measured by conversion rate",
                metrics: vec![
                    ExperimentMetric::new(
                        "conversion",
                        MetricType::Conversion,
                        Aggregation::Rate,
                        MetricDirection::Increase,
                    ),
                    error_rate_metric(),
                ],
                guardrails: vec![guardrail(
                    "error_rate",
                    0.05,
                    Comparison::Gt,
                    "Error rate above 5%",
                )],
                success_criteria: vec![criterion("conversion", 0.05, 0.95)],
                min_sample_size: 1000,
                min_duration_hours: 72.0,
            },
            ExperimentPreset {
                name: "performance",
                description: "Latency-sensitive change; slower p95 is a regression",
                metrics: vec![
                    ExperimentMetric::new(
                        "latency_ms",
                        MetricType::Duration,
                        Aggregation::P95,
                        MetricDirection::Decrease,
                    ),
                    error_rate_metric(),
                ],
                guardrails: vec![
                    guardrail("latency_ms", 2000.0, Comparison::Gt, "p95 latency above 2s"),
                    guardrail("error_rate", 0.02, Comparison::Gt, "Error rate above 2%"),
                ],
                success_criteria: vec![criterion("latency_ms", -0.1, 0.95)],
                min_sample_size: 500,
                min_duration_hours: 24.0,
            },
            ExperimentPreset {
                name: "engagement",
                description: "Feature usage and satisfaction for a new surface",
                metrics: vec![
                    ExperimentMetric::new(
                        "sessions",
                        MetricType::Count,
                        Aggregation::Avg,
                        MetricDirection::Increase,
                    ),
                    ExperimentMetric::new(
                        "satisfaction",
                        MetricType::Satisfaction,
                        Aggregation::Avg,
                        MetricDirection::Increase,
                    ),
                ],
                guardrails: vec![guardrail(
                    "satisfaction",
                    3.0,
                    Comparison::Lt,
                    "Average satisfaction below 3",
                )],
                success_criteria: vec![criterion("sessions", 0.1, 0.95)],
                min_sample_size: 500,
                min_duration_hours: 168.0,
            },
            ExperimentPreset {
                name: "revenue",
                description: "Pricing or upsell change measured by revenue per user",
                metrics: vec![
                    ExperimentMetric::new(
                        "revenue",
                        MetricType::Revenue,
                        Aggregation::Avg,
                        MetricDirection::Increase,
                    ),
                    ExperimentMetric::new(
                        "refunds",
                        MetricType::Count,
                        Aggregation::Avg,
                        MetricDirection::Decrease,
                    ),
                ],
                guardrails: vec![guardrail(
                    "refunds",
                    0.1,
                    Comparison::Gt,
                    "Refund rate above 10%",
                )],
                success_criteria: vec![criterion("revenue", 0.03, 0.95)],
                min_sample_size: 2000,
                min_duration_hours: 336.0,
            },
        ];
        presets.into_iter().map(|preset| (preset.name, preset)).collect()
    });

pub fn preset(name: &str) -> Option<&'static ExperimentPreset> {
    EXPERIMENT_PRESETS.get(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures::two_arm_experiment;

    #[test]
    fn presets_reference_declared_metrics() {
        for preset in EXPERIMENT_PRESETS.values() {
            for guardrail in &preset.guardrails {
                assert!(
                    preset.metrics.iter().any(|m| m.id == guardrail.metric_id),
                    "{} guardrail on undeclared metric {}",
                    preset.name,
                    guardrail.metric_id
                );
            }
            for criterion in &preset.success_criteria {
                assert!(preset.metrics.iter().any(|m| m.id == criterion.metric_id));
            }
        }
    }

    #[test]
    fn apply_keeps_explicit_fields() {
        let mut exp = two_arm_experiment("exp-preset");
        exp.min_sample_size = 42;
        exp.metrics.clear();
        exp.guardrails.clear();
        exp.success_criteria.clear();
        preset("conversion").unwrap().apply(&mut exp);
        assert_eq!(exp.min_sample_size, 42);
        assert_eq!(exp.metrics.len(), 2);
        assert_eq!(exp.success_criteria[0].metric_id, "conversion");
    }

    #[test]
    fn unknown_preset_is_none() {
        assert!(preset("nope").is_none());
    }
}
