//! Property test suite entry point.

mod assignment_props;
mod stats_props;
