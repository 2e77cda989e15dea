//! Recommendation policy.
//!
//! Rules are checked in a fixed order and the first match wins:
//! guardrail breach, sample size, run time, success criteria, regression,
//! end date, then the default extend.

use chrono::{DateTime, Utc};

use super::{ExperimentEvaluation, GuardrailStatus, Recommendation};
use crate::core::Experiment;

pub fn recommend(
    experiment: &Experiment,
    evaluation: &ExperimentEvaluation,
    now: DateTime<Utc>,
) -> (Recommendation, String) {
    if evaluation.guardrail_status == GuardrailStatus::Breached {
        return (
            Recommendation::RollBack,
            format!(
                "Guardrail metric breached: {}",
                evaluation.guardrail_breaches.join("; ")
            ),
        );
    }

    if evaluation.sample_size == 0 {
        return (
            Recommendation::InsufficientData,
            "No events recorded yet".to_string(),
        );
    }

    if evaluation.sample_size < experiment.min_sample_size {
        return (
            Recommendation::InsufficientData,
            format!(
                "Sample size {} below minimum {}",
                evaluation.sample_size, experiment.min_sample_size
            ),
        );
    }

    if evaluation.duration_hours < experiment.min_duration_hours {
        return (
            Recommendation::InsufficientData,
            format!(
                "Ran {:.1}h of the required {:.1}h",
                evaluation.duration_hours, experiment.min_duration_hours
            ),
        );
    }

    if criteria_met(experiment, evaluation) {
        return (
            Recommendation::RollForward,
            "All success criteria met".to_string(),
        );
    }

    if let Some(regression) = evaluation.comparisons.iter().find(|comparison| {
        experiment
            .metric(&comparison.metric_id)
            .is_some_and(|metric| comparison.is_regression(metric.direction))
    }) {
        return (
            Recommendation::RollBack,
            format!(
                "Significant regression detected: {} on {} (lift {:+.2}%)",
                regression.metric_id,
                regression.variant_id,
                regression.lift * 100.0
            ),
        );
    }

    if experiment.end_date.is_some_and(|end| now >= end) {
        return (
            Recommendation::Extend,
            "End date reached without a clear signal, manual review needed".to_string(),
        );
    }

    (
        Recommendation::Extend,
        "Not enough statistical power yet".to_string(),
    )
}

/// Some treatment meets every success criterion.
fn criteria_met(experiment: &Experiment, evaluation: &ExperimentEvaluation) -> bool {
    if experiment.success_criteria.is_empty() {
        return false;
    }
    experiment
        .treatment_variants()
        .any(|variant| {
            experiment.success_criteria.iter().all(|criterion| {
                evaluation
                    .comparison(&variant.id, &criterion.metric_id)
                    .is_some_and(|comparison| {
                        comparison.lift >= criterion.min_lift
                            && comparison.confidence >= criterion.confidence
                    })
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{MetricComparison, StatTest};
    use crate::test_utils::fixtures::{fixed_now, two_arm_experiment};

    fn evaluation_with(comparisons: Vec<MetricComparison>) -> ExperimentEvaluation {
        ExperimentEvaluation {
            experiment_id: "exp".to_string(),
            evaluated_at: fixed_now(),
            variant_results: Vec::new(),
            comparisons,
            guardrail_status: GuardrailStatus::AllGreen,
            guardrail_breaches: Vec::new(),
            recommendation: Recommendation::InsufficientData,
            reason: String::new(),
            sample_size: 5000,
            duration_hours: 200.0,
        }
    }

    fn comparison(metric: &str, lift: f64, confidence: f64) -> MetricComparison {
        MetricComparison {
            variant_id: "treatment".to_string(),
            metric_id: metric.to_string(),
            test: StatTest::ChiSquared,
            control_value: 1.0,
            treatment_value: 1.0 + lift,
            lift,
            p_value: 1.0 - confidence,
            confidence,
            is_significant: confidence > 0.95,
        }
    }

    #[test]
    fn criterion_needs_both_lift_and_confidence() {
        let exp = two_arm_experiment("exp");
        let low_confidence = evaluation_with(vec![comparison("conversion", 0.2, 0.90)]);
        assert_eq!(
            recommend(&exp, &low_confidence, fixed_now()).0,
            Recommendation::Extend
        );
        let low_lift = evaluation_with(vec![comparison("conversion", 0.01, 0.99)]);
        assert_eq!(recommend(&exp, &low_lift, fixed_now()).0, Recommendation::Extend);
        let both = evaluation_with(vec![comparison("conversion", 0.2, 0.99)]);
        assert_eq!(recommend(&exp, &both, fixed_now()).0, Recommendation::RollForward);
    }

    #[test]
    fn missing_criterion_metric_blocks_roll_forward() {
        let mut exp = two_arm_experiment("exp");
        exp.success_criteria.push(crate::core::SuccessCriterion {
            metric_id: "retention".to_string(),
            min_lift: 0.0,
            confidence: 0.5,
        });
        let evaluation = evaluation_with(vec![comparison("conversion", 0.2, 0.99)]);
        assert_eq!(recommend(&exp, &evaluation, fixed_now()).0, Recommendation::Extend);
    }

    #[test]
    fn decrease_metric_rising_is_regression() {
        let exp = two_arm_experiment("exp");
        let evaluation = evaluation_with(vec![comparison("error_rate", 0.5, 0.99)]);
        let (recommendation, reason) = recommend(&exp, &evaluation, fixed_now());
        assert_eq!(recommendation, Recommendation::RollBack);
        assert!(reason.contains("error_rate"));
    }

    #[test]
    fn breach_checked_before_sample_size() {
        let exp = two_arm_experiment("exp");
        let mut evaluation = evaluation_with(Vec::new());
        evaluation.sample_size = 1;
        evaluation.guardrail_status = GuardrailStatus::Breached;
        evaluation.guardrail_breaches.push("error_rate on treatment".to_string());
        assert_eq!(recommend(&exp, &evaluation, fixed_now()).0, Recommendation::RollBack);
    }
}
