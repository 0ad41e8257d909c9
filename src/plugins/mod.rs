//! Collaborator contracts and built-in plugins
//!
//! The resolver and executor only talk to services, requesters and
//! environment initializers through the traits below. Concrete plugins are
//! looked up by type name in a [`Registry`] built at startup.

pub mod clocks;
pub mod filesystem;
pub mod graphql;
pub mod registry;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::common::{Result, Value};
use crate::testing::VariableStore;

pub use registry::{Registry, ServiceContext};

/// Raw response of the application under test
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub body: Vec<u8>,
    pub status: u16,
}

/// Sends the request of one test to the application
#[async_trait]
pub trait Requester: Send + Sync + fmt::Debug {
    async fn make_request(&self) -> Result<Response>;

    /// Build a new requester where fields set on `other` win over ours.
    /// Neither side is modified.
    fn join(&self, other: &dyn Requester) -> Result<Arc<dyn Requester>>;

    /// Concrete type access for [`Requester::join`]
    fn as_any(&self) -> &dyn Any;
}

/// A dependent service (database, filesystem, mock server...)
pub trait Service: Send + Sync {
    fn preparer(&self, params: &Value) -> Result<Arc<dyn ServicePreparer>>;
    fn checker(&self, params: &Value) -> Result<Arc<dyn ServiceChecker>>;
}

/// Puts a service into a known state before a test
#[async_trait]
pub trait ServicePreparer: Send + Sync {
    async fn prepare(&self) -> Result<()>;
}

/// Asserts on a service's state after a test; may save values for later checkers
#[async_trait]
pub trait ServiceChecker: Send + Sync {
    async fn check(&self, variables: &mut VariableStore) -> Result<()>;
}

/// Runs before every test; implementations must be idempotent
#[async_trait]
pub trait EnvironmentInitializer: Send + Sync {
    async fn init_environment(&self) -> Result<()>;
}

/// Entries of a list-shaped params value; a single entry may be written bare
pub(crate) fn param_items(params: &Value) -> Vec<&Value> {
    match params {
        Value::List(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        single => vec![single],
    }
}
