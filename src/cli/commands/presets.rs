//! xpilot presets - Built-in experiment templates

use clap::Args;
use serde_json::json;

use crate::cli::output::{HumanLayout, emit_human, emit_json};
use crate::core::{EXPERIMENT_PRESETS, ExperimentPreset, preset};
use crate::error::{Result, XpError};

#[derive(Args, Debug)]
pub struct PresetsArgs {
    /// Show a single preset in full
    pub name: Option<String>,
}

pub fn run(machine: bool, args: &PresetsArgs) -> Result<()> {
    let selected: Vec<&ExperimentPreset> = match &args.name {
        Some(name) => vec![
            preset(name)
                .ok_or_else(|| XpError::ValidationFailed(format!("unknown preset: {name}")))?,
        ],
        None => EXPERIMENT_PRESETS.values().collect(),
    };

    if machine {
        return emit_json(&json!({
            "status": "ok",
            "presets": selected,
        }));
    }

    let mut layout = HumanLayout::new();
    layout.title("Experiment presets");
    for template in selected {
        layout
            .section(template.name)
            .push_line(template.description)
            .kv("Min sample size", &template.min_sample_size.to_string())
            .kv("Min duration", &format!("{}h", template.min_duration_hours));
        for guardrail in &template.guardrails {
            layout.bullet(&format!(
                "guardrail {} {} {}",
                guardrail.metric_id,
                guardrail.comparison.symbol(),
                guardrail.threshold
            ));
        }
        for criterion in &template.success_criteria {
            layout.bullet(&format!(
                "success {} lift >= {:.0}% at {:.0}% confidence",
                criterion.metric_id,
                criterion.min_lift * 100.0,
                criterion.confidence * 100.0
            ));
        }
        layout.blank();
    }
    emit_human(layout);
    Ok(())
}
