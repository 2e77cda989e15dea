//! CLI command implementations
//!
//! Each subcommand has its own module with:
//! - Args struct for command-line arguments
//! - `run()` function to execute the command

use std::io::Read;
use std::path::Path;

use crate::app::AppContext;
use crate::cli::{Cli, Commands};
use crate::config::Config;
use crate::error::Result;

pub mod assign;
pub mod autopilot;
pub mod evaluate;
pub mod experiment;
pub mod feedback;
pub mod flags;
pub mod lifecycle;
pub mod presets;
pub mod sample_size;
pub mod segments;
pub mod track;

/// Run a parsed command line. Store-backed commands open the configured database.
pub fn dispatch(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Presets(args) => presets::run(cli.machine, args),
        Commands::SampleSize(args) => {
            let config = Config::load(cli.config.as_deref(), &std::env::current_dir()?)?;
            sample_size::run(cli.machine, config.statistics.default_power, args)
        }
        command => {
            let ctx = AppContext::from_cwd(cli.config.as_deref(), cli.db.as_deref())?
                .with_machine_mode(cli.machine);
            run(&ctx, command)
        }
    }
}

pub fn run(ctx: &AppContext, command: &Commands) -> Result<()> {
    match command {
        Commands::Create(args) => experiment::run_create(ctx, args),
        Commands::List(args) => experiment::run_list(ctx, args),
        Commands::Show(args) => experiment::run_show(ctx, args),
        Commands::Start(args) => lifecycle::run_start(ctx, args),
        Commands::Pause(args) => lifecycle::run_pause(ctx, args),
        Commands::Resume(args) => lifecycle::run_resume(ctx, args),
        Commands::Rollforward(args) => lifecycle::run_roll_forward(ctx, args),
        Commands::Rollback(args) => lifecycle::run_roll_back(ctx, args),
        Commands::Graduate(args) => lifecycle::run_graduate(ctx, args),
        Commands::Assign(args) => assign::run(ctx, args),
        Commands::Track(args) => track::run(ctx, args),
        Commands::Evaluate(args) => evaluate::run(ctx, args),
        Commands::Autopilot(args) => autopilot::run(ctx, args),
        Commands::Feedback(args) => feedback::run(ctx, args),
        Commands::Segments(args) => segments::run(ctx, args),
        Commands::Flags(args) => flags::run(ctx, args),
        Commands::Presets(args) => presets::run(ctx.machine, args),
        Commands::SampleSize(args) => {
            sample_size::run(ctx.machine, ctx.config.statistics.default_power, args)
        }
    }
}

/// Read a JSON document from a file, or from stdin when the path is `-`.
pub(crate) fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    Ok(std::fs::read_to_string(path)?)
}
