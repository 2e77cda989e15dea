//! xpilot sample-size - Users needed per variant for a conversion test

use clap::Args;
use serde_json::json;

use crate::cli::output::{HumanLayout, emit_human, emit_json};
use crate::error::{Result, XpError};
use crate::stats::calculate_sample_size;

#[derive(Args, Debug)]
pub struct SampleSizeArgs {
    /// Baseline conversion rate, e.g. 0.1
    pub base_rate: f64,

    /// Minimum detectable relative effect, e.g. 0.05 for a 5% lift
    pub min_detectable_effect: f64,

    /// Statistical power [default: statistics.default_power]
    #[arg(long)]
    pub power: Option<f64>,
}

/// `default_power` comes from `statistics.default_power` in the loaded config.
pub fn run(machine: bool, default_power: f64, args: &SampleSizeArgs) -> Result<()> {
    let power = args.power.unwrap_or(default_power);
    validate(args, power)?;
    let per_variant = calculate_sample_size(args.base_rate, args.min_detectable_effect, power);

    if machine {
        return emit_json(&json!({
            "status": "ok",
            "base_rate": args.base_rate,
            "min_detectable_effect": args.min_detectable_effect,
            "power": power,
            "per_variant": per_variant,
        }));
    }

    let mut layout = HumanLayout::new();
    layout
        .title("Sample size")
        .kv("Base rate", &args.base_rate.to_string())
        .kv("Detectable effect", &format!("{:.1}%", args.min_detectable_effect * 100.0))
        .kv("Power", &power.to_string())
        .kv("Per variant", &format!("{per_variant:.0} users"));
    emit_human(layout);
    Ok(())
}

fn validate(args: &SampleSizeArgs, power: f64) -> Result<()> {
    if !(args.base_rate > 0.0 && args.base_rate < 1.0) {
        return Err(XpError::ValidationFailed(format!(
            "base rate must be within (0, 1), got {}",
            args.base_rate
        )));
    }
    if !(args.min_detectable_effect > 0.0) || !args.min_detectable_effect.is_finite() {
        return Err(XpError::ValidationFailed(format!(
            "minimum detectable effect must be positive, got {}",
            args.min_detectable_effect
        )));
    }
    let target = args.base_rate * (1.0 + args.min_detectable_effect);
    if target >= 1.0 {
        return Err(XpError::ValidationFailed(format!(
            "base rate {} with effect {} exceeds a rate of 1",
            args.base_rate, args.min_detectable_effect
        )));
    }
    if !(power > 0.0 && power < 1.0) {
        return Err(XpError::ValidationFailed(format!(
            "power must be within (0, 1), got {power}"
        )));
    }
    Ok(())
}
