//! xpilot segments - Inspect or replace a user's segment memberships

use clap::Args;
use serde_json::json;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct SegmentsArgs {
    /// User ID
    pub user: String,

    /// Replace the user's segments (comma separated, empty clears)
    #[arg(long, value_delimiter = ',', num_args = 0..)]
    pub set: Option<Vec<String>>,
}

pub fn run(ctx: &AppContext, args: &SegmentsArgs) -> Result<()> {
    if let Some(segments) = &args.set {
        let segments: Vec<String> = segments
            .iter()
            .map(|segment| segment.trim().to_string())
            .filter(|segment| !segment.is_empty())
            .collect();
        ctx.store.set_user_segments(&args.user, &segments)?;
    }
    let segments = ctx.store.get_user_segments(&args.user)?;

    if ctx.machine {
        return emit_json(&json!({
            "status": "ok",
            "user_id": args.user,
            "segments": segments,
        }));
    }

    let mut layout = HumanLayout::new();
    layout.title(&format!("Segments for {}", args.user));
    if segments.is_empty() {
        layout.push_line("(none)");
    }
    for segment in &segments {
        layout.bullet(segment);
    }
    emit_human(layout);
    Ok(())
}
