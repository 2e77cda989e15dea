//! Integration test suite entry point.

mod cli_tests;
mod fixture;
mod rollout_tests;
