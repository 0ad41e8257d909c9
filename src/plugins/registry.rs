//! Plugin registry and metadata
//!
//! Maps service types, requester types and environment initializer names to
//! the factories that build them. A registry is an ordinary value: build one
//! at startup (usually [`Registry::builtin`]) and pass it to the resolver.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use super::{EnvironmentInitializer, Requester, Service};
use crate::common::{Error, Result, Value};
use crate::testing::RequestDefaults;

/// Plugin categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    Service,
    Requester,
    EnvironmentInitializer,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginKind::Service => write!(f, "service"),
            PluginKind::Requester => write!(f, "requester"),
            PluginKind::EnvironmentInitializer => write!(f, "environment"),
        }
    }
}

/// Information about a built-in plugin
#[derive(Debug, Clone)]
pub struct PluginInfo {
    /// Name used in configuration (e.g. "filesystem", "graphql")
    pub name: &'static str,
    pub kind: PluginKind,
    /// Brief description
    pub description: &'static str,
}

/// All built-in plugins
static BUILTIN_PLUGINS: &[PluginInfo] = &[
    PluginInfo {
        name: "graphql",
        kind: PluginKind::Requester,
        description: "Sends GraphQL queries over HTTP",
    },
    PluginInfo {
        name: "filesystem",
        kind: PluginKind::Service,
        description: "Prepares and checks files under a host directory",
    },
    PluginInfo {
        name: "clocks",
        kind: PluginKind::EnvironmentInitializer,
        description: "Pins the application clock to a fixed instant",
    },
];

/// Get all built-in plugins
pub fn builtin_plugins() -> &'static [PluginInfo] {
    BUILTIN_PLUGINS
}

/// What a service factory knows besides the service's own params
#[derive(Debug, Clone)]
pub struct ServiceContext {
    /// Name the service is declared under
    pub name: String,
    /// Directory of the loaded configuration
    pub base_dir: PathBuf,
}

pub type ServiceFactory =
    Arc<dyn Fn(&ServiceContext, &Value) -> Result<Arc<dyn Service>> + Send + Sync>;
pub type RequesterFactory =
    Arc<dyn Fn(&Value, &RequestDefaults) -> Result<Arc<dyn Requester>> + Send + Sync>;
pub type InitializerFactory =
    Arc<dyn Fn(&Value) -> Result<Arc<dyn EnvironmentInitializer>> + Send + Sync>;

/// Factories keyed by the names configuration refers to
#[derive(Clone, Default)]
pub struct Registry {
    services: HashMap<String, ServiceFactory>,
    requesters: HashMap<String, RequesterFactory>,
    initializers: HashMap<String, InitializerFactory>,
}

impl Registry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in plugin
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.services.insert(
            "filesystem".to_string(),
            Arc::new(|ctx: &ServiceContext, params: &Value| {
                super::filesystem::FilesystemService::from_params(ctx, params)
                    .map(|s| Arc::new(s) as Arc<dyn Service>)
            }),
        );
        registry.requesters.insert(
            "graphql".to_string(),
            Arc::new(|request: &Value, defaults: &RequestDefaults| {
                super::graphql::GraphqlRequester::from_params(request, defaults)
                    .map(|r| Arc::new(r) as Arc<dyn Requester>)
            }),
        );
        registry.initializers.insert(
            "clocks".to_string(),
            Arc::new(|params: &Value| {
                super::clocks::ClocksInitializer::from_params(params)
                    .map(|i| Arc::new(i) as Arc<dyn EnvironmentInitializer>)
            }),
        );
        registry
    }

    /// Register a service type; a type can only be registered once
    pub fn register_service<F>(&mut self, service_type: &str, factory: F) -> Result<()>
    where
        F: Fn(&ServiceContext, &Value) -> Result<Arc<dyn Service>> + Send + Sync + 'static,
    {
        if self.services.contains_key(service_type) {
            return Err(Error::Config(format!(
                "Service type '{}' is already registered",
                service_type
            )));
        }
        self.services
            .insert(service_type.to_string(), Arc::new(factory));
        Ok(())
    }

    /// Register a requester type; a type can only be registered once
    pub fn register_requester<F>(&mut self, request_type: &str, factory: F) -> Result<()>
    where
        F: Fn(&Value, &RequestDefaults) -> Result<Arc<dyn Requester>> + Send + Sync + 'static,
    {
        if self.requesters.contains_key(request_type) {
            return Err(Error::Config(format!(
                "Requester type '{}' is already registered",
                request_type
            )));
        }
        self.requesters
            .insert(request_type.to_string(), Arc::new(factory));
        Ok(())
    }

    /// Register an environment initializer; a name can only be registered once
    pub fn register_initializer<F>(&mut self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(&Value) -> Result<Arc<dyn EnvironmentInitializer>> + Send + Sync + 'static,
    {
        if self.initializers.contains_key(name) {
            return Err(Error::Config(format!(
                "Environment initializer '{}' is already registered",
                name
            )));
        }
        self.initializers.insert(name.to_string(), Arc::new(factory));
        Ok(())
    }

    /// Build a declared service
    pub fn create_service(
        &self,
        ctx: &ServiceContext,
        service_type: &str,
        params: &Value,
    ) -> Result<Arc<dyn Service>> {
        let factory = self
            .services
            .get(service_type)
            .ok_or_else(|| Error::UnknownServiceType(service_type.to_string()))?;
        factory(ctx, params)
    }

    /// Get the requester factory for a request type
    pub fn requester_factory(&self, request_type: &str) -> Result<RequesterFactory> {
        self.requesters
            .get(request_type)
            .cloned()
            .ok_or_else(|| Error::UnknownRequesterType(request_type.to_string()))
    }

    /// Build an environment initializer
    pub fn create_initializer(
        &self,
        name: &str,
        params: &Value,
    ) -> Result<Arc<dyn EnvironmentInitializer>> {
        let factory = self
            .initializers
            .get(name)
            .ok_or_else(|| Error::UnknownInitializer(name.to_string()))?;
        factory(params)
    }

    /// Registered names of one kind, sorted
    pub fn names(&self, kind: PluginKind) -> Vec<String> {
        let mut names: Vec<String> = match kind {
            PluginKind::Service => self.services.keys().cloned().collect(),
            PluginKind::Requester => self.requesters.keys().cloned().collect(),
            PluginKind::EnvironmentInitializer => self.initializers.keys().cloned().collect(),
        };
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_matches_metadata() {
        let registry = Registry::builtin();
        for info in builtin_plugins() {
            assert!(
                registry.names(info.kind).iter().any(|n| n == info.name),
                "{} {} not registered",
                info.kind,
                info.name
            );
        }
    }

    #[test]
    fn test_unknown_names() {
        let registry = Registry::builtin();
        let ctx = ServiceContext {
            name: "db".to_string(),
            base_dir: PathBuf::new(),
        };
        assert!(matches!(
            registry.create_service(&ctx, "postgres", &Value::Null),
            Err(Error::UnknownServiceType(_))
        ));
        assert!(matches!(
            registry.requester_factory("rest"),
            Err(Error::UnknownRequesterType(_))
        ));
        assert!(matches!(
            registry.create_initializer("timezone", &Value::Null),
            Err(Error::UnknownInitializer(_))
        ));
    }

    #[test]
    fn test_double_registration_rejected() {
        let mut registry = Registry::builtin();
        let result = registry.register_initializer("clocks", |params: &Value| {
            super::super::clocks::ClocksInitializer::from_params(params)
                .map(|i| Arc::new(i) as Arc<dyn EnvironmentInitializer>)
        });
        assert!(result.is_err());
    }
}
