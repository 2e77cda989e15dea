//! xpilot - experiment auto-pilot CLI
//!
//! Assign users, record metrics, evaluate experiments and let the
//! auto-pilot roll variants forward or back.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use xpilot::cli::Cli;
use xpilot::cli::commands::dispatch;
use xpilot::cli::output::emit_error;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match dispatch(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            emit_error(&err, cli.machine);
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr; stdout carries command output in both modes.
fn init_tracing(cli: &Cli) {
    if cli.quiet {
        return;
    }

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(cli.verbose)));
    let registry = tracing_subscriber::registry().with(env_filter);

    if cli.machine {
        registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(cli.verbose > 1)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Filter used when `RUST_LOG` is unset. Each `-v` lowers the crate level by one.
fn default_directives(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn,xpilot=info",
        1 => "info,xpilot=debug",
        2 => "debug,xpilot=trace",
        _ => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_directives() {
        assert_eq!(default_directives(0), "warn,xpilot=info");
        assert_eq!(default_directives(2), "debug,xpilot=trace");
        assert_eq!(default_directives(3), "trace");
        assert_eq!(default_directives(u8::MAX), "trace");
    }

    #[test]
    fn directives_parse() {
        for verbose in 0..4 {
            assert!(EnvFilter::try_new(default_directives(verbose)).is_ok());
        }
    }
}
