//! xpilot assign - Resolve a user's variant

use clap::Args;
use serde_json::json;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct AssignArgs {
    /// Experiment ID
    pub experiment: String,

    /// User ID
    pub user: String,
}

pub fn run(ctx: &AppContext, args: &AssignArgs) -> Result<()> {
    let decision = ctx.assigner.resolve(&args.experiment, &args.user)?;

    if ctx.machine {
        return emit_json(&json!({
            "status": "ok",
            "assignment": decision,
        }));
    }

    let source = serde_json::to_value(decision.source)?;
    let mut layout = HumanLayout::new();
    layout
        .title("Assignment")
        .kv("Experiment", &decision.experiment_id)
        .kv("User", &decision.user_id)
        .kv("Variant", &decision.variant.id)
        .kv("Source", source.as_str().unwrap_or_default());
    if !decision.variant.feature_flags.is_empty() {
        layout.blank().section("Flags");
        for (key, value) in &decision.variant.feature_flags {
            layout.kv(key, &value.to_string());
        }
    }
    emit_human(layout);
    Ok(())
}
