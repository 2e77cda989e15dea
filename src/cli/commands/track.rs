//! xpilot track - Record metric events

use std::path::PathBuf;

use clap::Args;
use serde_json::json;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json};
use crate::error::{Result, XpError};
use crate::tracking::EventInput;

#[derive(Args, Debug)]
pub struct TrackArgs {
    /// Experiment ID
    #[arg(required_unless_present = "batch")]
    pub experiment: Option<String>,

    /// User ID
    #[arg(required_unless_present = "batch")]
    pub user: Option<String>,

    /// Metric ID
    #[arg(required_unless_present = "batch")]
    pub metric: Option<String>,

    /// Observed value
    #[arg(required_unless_present = "batch", allow_hyphen_values = true)]
    pub value: Option<f64>,

    /// JSON array of events (`-` reads stdin)
    #[arg(long, conflicts_with_all = ["experiment", "user", "metric", "value"])]
    pub batch: Option<PathBuf>,
}

pub fn run(ctx: &AppContext, args: &TrackArgs) -> Result<()> {
    if let Some(path) = &args.batch {
        return run_batch(ctx, path);
    }

    let (Some(experiment), Some(user), Some(metric), Some(value)) =
        (&args.experiment, &args.user, &args.metric, args.value)
    else {
        return Err(XpError::ValidationFailed(
            "track needs <EXPERIMENT> <USER> <METRIC> <VALUE> or --batch".to_string(),
        ));
    };

    let event = ctx.tracker.track_event(experiment, user, metric, value)?;

    if ctx.machine {
        return emit_json(&json!({
            "status": "ok",
            "recorded": event.is_some(),
            "event": event,
        }));
    }

    let mut layout = HumanLayout::new();
    match &event {
        Some(event) => {
            layout
                .title("Event recorded")
                .kv("Experiment", &event.experiment_id)
                .kv("Variant", &event.variant_id)
                .kv("Metric", &event.metric_id)
                .kv("Value", &event.value.to_string());
        }
        None => {
            layout.push_line(&format!("User {user} is not assigned to {experiment}; event dropped"));
        }
    }
    emit_human(layout);
    Ok(())
}

fn run_batch(ctx: &AppContext, path: &std::path::Path) -> Result<()> {
    let raw = super::read_input(path)?;
    let inputs: Vec<EventInput> = serde_json::from_str(&raw)?;
    let outcome = ctx.tracker.track_events_batch(&inputs)?;

    if ctx.machine {
        return emit_json(&json!({
            "status": "ok",
            "outcome": outcome,
        }));
    }

    let mut layout = HumanLayout::new();
    layout
        .title("Event batch")
        .kv("Recorded", &outcome.recorded.to_string())
        .kv("Skipped", &outcome.skipped.to_string())
        .kv("Failed", &outcome.failed.len().to_string());
    for failure in &outcome.failed {
        layout.bullet(&format!("#{}: {}", failure.index, failure.error));
    }
    emit_human(layout);
    Ok(())
}
