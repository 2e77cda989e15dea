//! xpilot autopilot - Evaluate and act on running experiments

use clap::Args;
use serde_json::json;

use super::evaluate::evaluation_layout;
use crate::app::AppContext;
use crate::autopilot::{AutoPilotOutcome, SweepReport};
use crate::cli::output::{HumanLayout, emit_human, emit_json, verdict};
use crate::error::{Result, XpError};

#[derive(Args, Debug)]
pub struct AutopilotArgs {
    /// Experiment ID (omit with --all)
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub experiment: Option<String>,

    /// Sweep every running experiment
    #[arg(long)]
    pub all: bool,

    /// Restrict the sweep to one application (defaults to config autopilot.application_id)
    #[arg(long, requires = "all")]
    pub app: Option<String>,
}

pub fn run(ctx: &AppContext, args: &AutopilotArgs) -> Result<()> {
    if args.all {
        let app = args
            .app
            .as_deref()
            .or(ctx.config.autopilot.application_id.as_deref());
        let report = ctx.autopilot.run_sweep(app)?;
        return report_sweep(ctx, &report);
    }

    let experiment = args.experiment.as_deref().ok_or_else(|| {
        XpError::ValidationFailed("autopilot needs an experiment id or --all".to_string())
    })?;
    let outcome = ctx.autopilot.run_autopilot(experiment)?;

    if ctx.machine {
        return emit_json(&json!({
            "status": "ok",
            "outcome": outcome,
        }));
    }

    let mut layout = evaluation_layout(&outcome.evaluation);
    layout.blank();
    outcome_lines(&mut layout, &outcome);
    emit_human(layout);
    Ok(())
}

fn report_sweep(ctx: &AppContext, report: &SweepReport) -> Result<()> {
    if ctx.machine {
        return emit_json(&json!({
            "status": "ok",
            "evaluated": report.entries.len(),
            "changed": report.changed(),
            "failed": report.failures(),
            "entries": report.entries,
        }));
    }

    let mut layout = HumanLayout::new();
    layout
        .title("Auto-pilot sweep")
        .kv("Evaluated", &report.entries.len().to_string())
        .kv("Changed", &report.changed().to_string())
        .kv("Failed", &report.failures().to_string())
        .blank();
    for entry in &report.entries {
        match (&entry.outcome, &entry.error) {
            (Some(outcome), _) => outcome_lines(&mut layout, outcome),
            (None, Some(error)) => {
                layout.bullet(&format!("{}: error: {error}", entry.experiment_id));
            }
            (None, None) => {}
        }
    }
    emit_human(layout);
    Ok(())
}

fn outcome_lines(layout: &mut HumanLayout, outcome: &AutoPilotOutcome) {
    let action = serde_json::to_value(outcome.action)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_default();
    let winner = outcome
        .winner
        .as_deref()
        .map(|winner| format!(" winner={winner}"))
        .unwrap_or_default();
    layout.bullet(&format!(
        "{}: {} -> {}{winner} ({})",
        outcome.experiment_id,
        action,
        verdict(outcome.status.as_str()),
        outcome.reason
    ));
}
