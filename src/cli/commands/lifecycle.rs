//! xpilot start / pause / resume / rollforward / rollback / graduate

use clap::Args;
use serde_json::json;

use super::experiment::experiment_layout;
use crate::app::AppContext;
use crate::cli::output::{emit_human, emit_json};
use crate::core::Experiment;
use crate::error::Result;

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Experiment ID
    pub experiment: String,
}

#[derive(Args, Debug)]
pub struct PauseArgs {
    /// Experiment ID
    pub experiment: String,

    /// Reason recorded in the decision log
    #[arg(long, default_value = "Paused by operator")]
    pub reason: String,
}

#[derive(Args, Debug)]
pub struct ResumeArgs {
    /// Experiment ID
    pub experiment: String,
}

#[derive(Args, Debug)]
pub struct RollForwardArgs {
    /// Experiment ID
    pub experiment: String,

    /// Variant whose flags become the default
    pub variant: String,

    /// Reason recorded in the decision log
    #[arg(long, default_value = "Rolled forward by operator")]
    pub reason: String,
}

#[derive(Args, Debug)]
pub struct RollBackArgs {
    /// Experiment ID
    pub experiment: String,

    /// Reason recorded in the decision log
    #[arg(long, default_value = "Rolled back by operator")]
    pub reason: String,
}

#[derive(Args, Debug)]
pub struct GraduateArgs {
    /// Experiment ID
    pub experiment: String,

    /// New rollout percentage (0-100)
    #[arg(allow_hyphen_values = true)]
    pub percentage: f64,
}

pub fn run_start(ctx: &AppContext, args: &StartArgs) -> Result<()> {
    let experiment = ctx.autopilot.start(&args.experiment)?;
    report(ctx, "started", &experiment)
}

pub fn run_pause(ctx: &AppContext, args: &PauseArgs) -> Result<()> {
    let experiment = ctx.autopilot.pause(&args.experiment, &args.reason)?;
    report(ctx, "paused", &experiment)
}

pub fn run_resume(ctx: &AppContext, args: &ResumeArgs) -> Result<()> {
    let experiment = ctx.autopilot.resume(&args.experiment)?;
    report(ctx, "resumed", &experiment)
}

pub fn run_roll_forward(ctx: &AppContext, args: &RollForwardArgs) -> Result<()> {
    let experiment = ctx
        .autopilot
        .roll_forward(&args.experiment, &args.variant, &args.reason)?;
    report(ctx, "rolled_forward", &experiment)
}

pub fn run_roll_back(ctx: &AppContext, args: &RollBackArgs) -> Result<()> {
    let experiment = ctx.autopilot.roll_back(&args.experiment, &args.reason)?;
    report(ctx, "rolled_back", &experiment)
}

pub fn run_graduate(ctx: &AppContext, args: &GraduateArgs) -> Result<()> {
    let experiment = ctx
        .autopilot
        .graduate_rollout(&args.experiment, args.percentage)?;
    report(ctx, "graduated", &experiment)
}

fn report(ctx: &AppContext, action: &str, experiment: &Experiment) -> Result<()> {
    if ctx.machine {
        return emit_json(&json!({
            "status": "ok",
            "action": action,
            "experiment": experiment,
        }));
    }

    let mut layout = experiment_layout(experiment);
    layout.blank().bullet(&format!("Experiment {}: {action}", experiment.id));
    emit_human(layout);
    Ok(())
}
