//! xpilot create / list / show - Experiment definitions

use std::path::PathBuf;

use chrono::SecondsFormat;
use clap::Args;
use serde_json::{Value, json};

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json, verdict};
use crate::core::{CohortConfig, Experiment, ExperimentStatus, preset};
use crate::error::{Result, XpError};
use crate::storage::ExperimentFilter;

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Experiment definition as JSON (`-` reads stdin)
    #[arg(long, short)]
    pub file: PathBuf,

    /// Fill unspecified metrics, guardrails and thresholds from a preset
    #[arg(long)]
    pub preset: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only experiments in this status
    #[arg(long)]
    pub status: Option<String>,

    /// Only experiments of this application
    #[arg(long)]
    pub app: Option<String>,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Experiment ID
    pub experiment: String,

    /// Include the decision log
    #[arg(long)]
    pub logs: bool,
}

pub fn run_create(ctx: &AppContext, args: &CreateArgs) -> Result<()> {
    let raw = super::read_input(&args.file)?;
    let mut experiment = parse_definition(&raw, ctx.clock.now())?;

    if let Some(name) = &args.preset {
        let template = preset(name)
            .ok_or_else(|| XpError::ValidationFailed(format!("unknown preset: {name}")))?;
        template.apply(&mut experiment);
    }

    ctx.autopilot.create_experiment(&experiment)?;

    if ctx.machine {
        return emit_json(&json!({
            "status": "ok",
            "experiment": experiment,
        }));
    }

    let mut layout = experiment_layout(&experiment);
    layout.blank().bullet(&format!("Start it with `xpilot start {}`", experiment.id));
    emit_human(layout);
    Ok(())
}

pub fn run_list(ctx: &AppContext, args: &ListArgs) -> Result<()> {
    let filter = ExperimentFilter {
        status: args.status.as_deref().map(ExperimentStatus::parse).transpose()?,
        application_id: args.app.clone(),
    };
    let experiments = ctx.store.list_experiments(&filter)?;

    if ctx.machine {
        return emit_json(&json!({
            "status": "ok",
            "count": experiments.len(),
            "experiments": experiments,
        }));
    }

    let mut layout = HumanLayout::new();
    layout.title("Experiments");
    if experiments.is_empty() {
        layout.push_line("No experiments found");
    }
    for experiment in &experiments {
        layout.bullet(&format!(
            "{} [{}] {} ({})",
            experiment.id,
            verdict(experiment.status.as_str()),
            experiment.name,
            experiment.application_id
        ));
    }
    emit_human(layout);
    Ok(())
}

pub fn run_show(ctx: &AppContext, args: &ShowArgs) -> Result<()> {
    let experiment = ctx
        .store
        .get_experiment(&args.experiment)?
        .ok_or_else(|| XpError::ExperimentNotFound(args.experiment.clone()))?;
    let logs = if args.logs {
        ctx.store.get_decision_logs(&experiment.id)?
    } else {
        Vec::new()
    };

    if ctx.machine {
        let mut payload = json!({
            "status": "ok",
            "experiment": experiment,
        });
        if args.logs {
            payload["decision_log"] = serde_json::to_value(&logs)?;
        }
        return emit_json(&payload);
    }

    let mut layout = experiment_layout(&experiment);
    if args.logs {
        layout.blank().section("Decision log");
        if logs.is_empty() {
            layout.push_line("(empty)");
        }
        for entry in &logs {
            layout.bullet(&format!(
                "{} {} by {}: {}",
                entry.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
                entry.action.as_str(),
                entry.actor.as_str(),
                entry.reason
            ));
        }
    }
    emit_human(layout);
    Ok(())
}

/// Accept a definition without lifecycle fields; new experiments start as drafts.
fn parse_definition(raw: &str, now: chrono::DateTime<chrono::Utc>) -> Result<Experiment> {
    let mut value: Value = serde_json::from_str(raw)?;
    let Some(object) = value.as_object_mut() else {
        return Err(XpError::ValidationFailed(
            "experiment definition must be a JSON object".to_string(),
        ));
    };
    object
        .entry("status")
        .or_insert_with(|| Value::from(ExperimentStatus::Draft.as_str()));
    object
        .entry("start_date")
        .or_insert_with(|| Value::from(now.to_rfc3339()));
    Ok(serde_json::from_value(value)?)
}

pub(crate) fn experiment_layout(experiment: &Experiment) -> HumanLayout {
    let mut layout = HumanLayout::new();
    layout
        .title(&experiment.name)
        .kv("ID", &experiment.id)
        .kv("Application", &experiment.application_id)
        .kv("Status", &verdict(experiment.status.as_str()))
        .kv("Cohort", &describe_cohort(&experiment.cohort))
        .kv(
            "Started",
            &experiment.start_date.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
    if let Some(end) = experiment.end_date {
        layout.kv("Ends", &end.to_rfc3339_opts(SecondsFormat::Secs, true));
    }
    if !experiment.hypothesis.is_empty() {
        layout.kv("Hypothesis", &experiment.hypothesis);
    }

    layout.blank().section("Variants");
    for variant in &experiment.variants {
        let marker = if variant.is_control() { " (control)" } else { "" };
        layout.bullet(&format!("{} {}%{marker}", variant.id, variant.weight));
    }

    if !experiment.guardrails.is_empty() {
        layout.blank().section("Guardrails");
        for guardrail in &experiment.guardrails {
            layout.bullet(&format!(
                "{} {} {}",
                guardrail.metric_id,
                guardrail.comparison.symbol(),
                guardrail.threshold
            ));
        }
    }

    if let Some(decision_reason) = &experiment.decision_reason {
        layout.blank().kv("Decision", decision_reason);
    }
    layout
}

fn describe_cohort(cohort: &CohortConfig) -> String {
    match cohort {
        CohortConfig::Percentage {
            percentage,
            exclude_list,
        } if exclude_list.is_empty() => format!("{percentage}% of users"),
        CohortConfig::Percentage {
            percentage,
            exclude_list,
        } => format!("{percentage}% of users, {} excluded", exclude_list.len()),
        CohortConfig::Segment { segments } => format!("segments: {}", segments.join(", ")),
        CohortConfig::Allowlist { user_ids } => format!("allowlist of {}", user_ids.len()),
    }
}
