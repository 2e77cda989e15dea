pub mod app;
pub mod assignment;
pub mod autopilot;
pub mod cli;
pub mod clock;
pub mod config;
pub mod core;
pub mod error;
pub mod evaluation;
pub mod feedback;
pub mod services;
pub mod stats;
pub mod storage;
pub mod test_utils;
pub mod tracking;

pub use error::{Result, XpError};

/// Package version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
