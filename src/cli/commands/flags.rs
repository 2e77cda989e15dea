//! xpilot flags - Current feature flag values of an application

use clap::Args;
use serde_json::json;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct FlagsArgs {
    /// Application ID
    pub app: String,
}

pub fn run(ctx: &AppContext, args: &FlagsArgs) -> Result<()> {
    let flags = ctx.store.get_feature_flags(&args.app)?;

    if ctx.machine {
        return emit_json(&json!({
            "status": "ok",
            "application_id": args.app,
            "flags": flags,
        }));
    }

    let mut layout = HumanLayout::new();
    layout.title(&format!("Feature flags: {}", args.app));
    if flags.is_empty() {
        layout.push_line("(none)");
    }
    for (key, value) in &flags {
        layout.kv(key, &value.to_string());
    }
    emit_human(layout);
    Ok(())
}
