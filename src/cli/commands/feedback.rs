//! xpilot feedback - Record user feedback and react to negative spikes

use clap::Args;
use serde_json::json;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json, verdict};
use crate::error::{Result, XpError};
use crate::feedback::FeedbackInput;

#[derive(Args, Debug)]
pub struct FeedbackArgs {
    /// Application the feedback is about
    pub app: String,

    /// User who gave the feedback
    pub user: String,

    /// Feedback channel: ticket, rating, review, nps, churn, in_app_feedback
    #[arg(long = "type", default_value = "in_app_feedback")]
    pub feedback_type: String,

    /// positive, neutral or negative
    #[arg(long)]
    pub sentiment: String,

    /// Optional numeric score
    #[arg(long, allow_hyphen_values = true)]
    pub score: Option<f64>,

    /// Optional free-text message
    #[arg(long)]
    pub message: Option<String>,
}

pub fn run(ctx: &AppContext, args: &FeedbackArgs) -> Result<()> {
    let input = parse_input(args)?;
    let report = ctx.feedback.receive(&args.app, &input)?;

    if ctx.machine {
        return emit_json(&json!({
            "status": "ok",
            "report": report,
        }));
    }

    let mut layout = HumanLayout::new();
    layout
        .title("Feedback")
        .kv("Application", &args.app)
        .kv("Attributed to", &report.recorded.len().to_string());
    for signal in &report.recorded {
        layout.bullet(&format!("{} / {}", signal.experiment_id, signal.variant_id));
    }
    if !report.triggered.is_empty() {
        layout.blank().section("Auto-pilot triggered");
        for run in &report.triggered {
            let result = match (&run.outcome, &run.error) {
                (Some(outcome), _) => verdict(outcome.status.as_str()),
                (None, Some(error)) => format!("error: {error}"),
                (None, None) => String::new(),
            };
            layout.bullet(&format!(
                "{}: {:.0}% negative of {} signals -> {result}",
                run.experiment_id,
                run.negative_ratio * 100.0,
                run.signals
            ));
        }
    }
    emit_human(layout);
    Ok(())
}

fn parse_input(args: &FeedbackArgs) -> Result<FeedbackInput> {
    serde_json::from_value(json!({
        "user_id": args.user,
        "type": args.feedback_type,
        "sentiment": args.sentiment,
        "score": args.score,
        "message": args.message,
    }))
    .map_err(|err| XpError::ValidationFailed(format!("invalid feedback: {err}")))
}
