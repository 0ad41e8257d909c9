//! itest - config-driven integration test runner
//!
//! This library loads YAML test suites, flattens their inheritable case trees
//! into executable tests and runs them against an application and its
//! dependent services through pluggable requesters and services.

pub mod cli;
pub mod commands;
pub mod common;
pub mod plugins;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result, Value};
pub use plugins::Registry;
