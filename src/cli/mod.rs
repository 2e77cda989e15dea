//! CLI module - Command-line interface definitions and handlers
//!
//! Uses clap v4 with derive macros for argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod commands;
pub mod output;

/// xpilot - experiment assignment, evaluation and automated rollout
#[derive(Parser, Debug)]
#[command(name = "xpilot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable machine-readable JSON output.
    #[arg(long, short = 'm', global = true)]
    pub machine: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file path (default: ~/.config/xpilot/config.toml + ./xpilot.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database path (overrides config)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an experiment from a JSON definition
    Create(commands::experiment::CreateArgs),

    /// List experiments
    List(commands::experiment::ListArgs),

    /// Show an experiment and its decision log
    Show(commands::experiment::ShowArgs),

    /// Start a draft experiment
    Start(commands::lifecycle::StartArgs),

    /// Pause a running experiment
    Pause(commands::lifecycle::PauseArgs),

    /// Resume a paused experiment
    Resume(commands::lifecycle::ResumeArgs),

    /// Assign a user to a variant
    Assign(commands::assign::AssignArgs),

    /// Track a metric event for an assigned user
    Track(commands::track::TrackArgs),

    /// Evaluate an experiment against its criteria
    Evaluate(commands::evaluate::EvaluateArgs),

    /// Run the auto-pilot on one experiment or sweep all running ones
    Autopilot(commands::autopilot::AutopilotArgs),

    /// Promote a variant and complete the experiment
    Rollforward(commands::lifecycle::RollForwardArgs),

    /// Revert to control and mark the experiment rolled back
    Rollback(commands::lifecycle::RollBackArgs),

    /// Change the rollout percentage of a percentage cohort
    Graduate(commands::lifecycle::GraduateArgs),

    /// Submit user feedback for an application
    Feedback(commands::feedback::FeedbackArgs),

    /// Show or set a user's segment memberships
    Segments(commands::segments::SegmentsArgs),

    /// Show the feature flags of an application
    Flags(commands::flags::FlagsArgs),

    /// List experiment presets
    Presets(commands::presets::PresetsArgs),

    /// Required users per variant for a conversion experiment
    SampleSize(commands::sample_size::SampleSizeArgs),
}
