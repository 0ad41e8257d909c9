//! Test suite engine
//!
//! Loads a YAML suite, flattens its case tree into executable tests and runs
//! them against the application and its services:
//!
//! ```text
//! load(path) -> Config -> resolve(&config, &registry) -> Resolved -> Runner::run() -> RunSummary
//! ```

pub mod config;
pub mod equality;
pub mod interpolation;
pub mod loader;
pub mod resolver;
pub mod runner;
pub mod tester;
pub mod variables;

pub use config::{
    ApplicationConfig, Config, ConfigFragment, ExpectedResponse, GeneralCaseDefinition,
    GeneralCasesSelector, RequestDefaults, ServiceConfig, TestCaseNode,
};
pub use equality::{is_equal, Pattern};
pub use interpolation::{interpolate, Interpolator};
pub use loader::load;
pub use resolver::{resolve, Resolved};
pub use runner::{RunSummary, Runner, TestResult, EXIT_FAILURES, EXIT_NO_TESTS, EXIT_SUCCESS};
pub use tester::{ResolvedTestCase, Stage, TestFailure};
pub use variables::{VariableStore, RESPONSE_KEY};
