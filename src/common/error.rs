//! Error types for the integration test runner
//!
//! Errors fall in two groups: fatal ones (configuration, resolution) that abort
//! the whole run before any test starts, and per-test ones (request, mismatch,
//! interpolation, service) that only fail the test that produced them.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the test runner
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file '{path}': {message}")]
    ConfigParse { path: String, message: String },

    #[error("Configuration conflict: '{field}' of '{path}' is defined more than once")]
    ConfigConflict { path: String, field: String },

    // === Resolution Errors ===
    #[error("Service '{0}' is not declared")]
    ServiceNotFound(String),

    #[error("Unknown service type '{0}'")]
    UnknownServiceType(String),

    #[error("Unknown requester type '{0}'")]
    UnknownRequesterType(String),

    #[error("Unknown environment initializer '{0}'")]
    UnknownInitializer(String),

    #[error("General case '{0}' is not declared")]
    GeneralCaseNotFound(String),

    #[error("Unable to resolve test case '{name}': {message}")]
    Resolve { name: String, message: String },

    // === Assertion Errors ===
    #[error("Unable to interpolate '{path}': {message}")]
    Interpolation { path: String, message: String },

    #[error("Invalid value of key '{path}'\n Actual value  : {actual}\n Expected value: {expected}")]
    Mismatch {
        path: String,
        actual: String,
        expected: String,
    },

    #[error("Invalid pattern at '{path}': {message}")]
    Pattern { path: String, message: String },

    #[error("Test assertion failed: {0}")]
    TestAssertion(String),

    // === Collaborator Errors ===
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Service '{service}' failed: {message}")]
    Service { service: String, message: String },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },
}

impl Error {
    /// Create a configuration conflict error for a field at a case path
    pub fn conflict(path: &str, field: &str) -> Self {
        Self::ConfigConflict {
            path: path.to_string(),
            field: field.to_string(),
        }
    }

    /// Create a resolution error for a qualified test name
    pub fn resolve(name: &str, message: impl Into<String>) -> Self {
        Self::Resolve {
            name: name.to_string(),
            message: message.into(),
        }
    }

    /// Create an interpolation error for a variable path
    pub fn interpolation(path: &str, message: impl Into<String>) -> Self {
        Self::Interpolation {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// Create a pattern error for a location in the expected tree
    pub fn pattern(path: &str, message: impl Into<String>) -> Self {
        Self::Pattern {
            path: display_path(path),
            message: message.into(),
        }
    }

    /// Create a service failure error
    pub fn service(service: &str, message: impl Into<String>) -> Self {
        Self::Service {
            service: service.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
impl Error {
    /// Whether this error must abort the run instead of failing a single test
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::ConfigParse { .. }
                | Error::ConfigConflict { .. }
                | Error::ServiceNotFound(_)
                | Error::UnknownServiceType(_)
                | Error::UnknownRequesterType(_)
                | Error::UnknownInitializer(_)
                | Error::GeneralCaseNotFound(_)
                | Error::Resolve { .. }
                | Error::FileRead { .. }
        )
    }
}

/// Root of a value tree is reported as `$`
pub(crate) fn display_path(path: &str) -> String {
    if path.is_empty() {
        "$".to_string()
    } else {
        path.to_string()
    }
}
