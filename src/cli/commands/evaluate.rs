//! xpilot evaluate - Statistical evaluation without side effects

use clap::Args;
use serde_json::json;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json, format_lift, verdict};
use crate::error::Result;
use crate::evaluation::{ExperimentEvaluation, GuardrailStatus};

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Experiment ID
    pub experiment: String,
}

pub fn run(ctx: &AppContext, args: &EvaluateArgs) -> Result<()> {
    let evaluation = ctx.evaluator.evaluate_experiment(&args.experiment)?;

    if ctx.machine {
        return emit_json(&json!({
            "status": "ok",
            "evaluation": evaluation,
        }));
    }

    emit_human(evaluation_layout(&evaluation));
    Ok(())
}

pub(crate) fn evaluation_layout(evaluation: &ExperimentEvaluation) -> HumanLayout {
    let guardrails = match evaluation.guardrail_status {
        GuardrailStatus::AllGreen => "all_green",
        GuardrailStatus::Breached => "breached",
    };

    let mut layout = HumanLayout::new();
    layout
        .title(&format!("Evaluation: {}", evaluation.experiment_id))
        .kv("Recommendation", &verdict(evaluation.recommendation.as_str()))
        .kv("Reason", &evaluation.reason)
        .kv("Guardrails", &verdict(guardrails))
        .kv("Sample size", &evaluation.sample_size.to_string())
        .kv("Running for", &format!("{:.1}h", evaluation.duration_hours));
    for breach in &evaluation.guardrail_breaches {
        layout.bullet(breach);
    }

    if !evaluation.variant_results.is_empty() {
        layout.blank().section("Results");
        for result in &evaluation.variant_results {
            layout.bullet(&format!(
                "{} / {}: {:.4} (n={})",
                result.variant_id, result.metric_id, result.value, result.sample_size
            ));
        }
    }

    if !evaluation.comparisons.is_empty() {
        layout.blank().section("Comparisons");
        for comparison in &evaluation.comparisons {
            let marker = if comparison.is_significant { " *" } else { "" };
            layout.bullet(&format!(
                "{} / {}: lift {} p={:.4}{marker}",
                comparison.variant_id,
                comparison.metric_id,
                format_lift(comparison.lift),
                comparison.p_value
            ));
        }
    }
    layout
}
