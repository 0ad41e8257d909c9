//! Flattening of the test case tree
//!
//! Walks the joined case tree depth-first and emits one [`ResolvedTestCase`]
//! per node that defines a request, plus one per general case leaf a node
//! selects. Preparers and checkers accumulate down the tree: a child gets its
//! parent's list followed by its own, and siblings never see each other's.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;

use super::config::{qualify, Config, GeneralCasesSelector, TestCaseNode};
use super::tester::ResolvedTestCase;
use crate::common::{Error, Result, Value};
use crate::plugins::registry::RequesterFactory;
use crate::plugins::{
    EnvironmentInitializer, Registry, Requester, Service, ServiceChecker, ServiceContext,
    ServicePreparer,
};

/// Output of [`resolve`]
pub struct Resolved {
    pub tests: Vec<ResolvedTestCase>,
    /// Initializers run before every test, in declaration order
    pub environment: Vec<Arc<dyn EnvironmentInitializer>>,
}

impl Resolved {
    pub fn names(&self) -> Vec<&str> {
        self.tests.iter().map(|t| t.name.as_str()).collect()
    }
}

/// Build every collaborator the configuration names and flatten the case tree
pub fn resolve(config: &Config, registry: &Registry) -> Result<Resolved> {
    let mut environment = Vec::with_capacity(config.environment.len());
    for (name, params) in &config.environment {
        environment.push(registry.create_initializer(name, params)?);
    }

    let mut services = IndexMap::new();
    for (name, service) in &config.services {
        let ctx = ServiceContext {
            name: name.clone(),
            base_dir: config.base_dir.clone(),
        };
        let built = registry
            .create_service(&ctx, &service.service_type, &service.params_value())
            .map_err(|e| match e {
                Error::UnknownServiceType(_) => e,
                other => Error::Config(format!("unable to create service '{}': {}", name, other)),
            })?;
        services.insert(name.clone(), built);
    }

    let resolver = Resolver {
        config,
        services,
        new_requester: registry.requester_factory(&config.application.request_type)?,
        only: collect_only(&config.cases, ""),
    };
    if !resolver.only.is_empty() {
        tracing::info!(only = ?resolver.only, "Restricting run to cases marked 'only'");
    }

    let mut tests = Vec::new();
    resolver.walk(&config.cases, "", &[], &[], false, &mut tests)?;
    tracing::info!(tests = tests.len(), "Test cases resolved");
    Ok(Resolved { tests, environment })
}

/// Qualified names of every node marked `only`
fn collect_only(cases: &IndexMap<String, TestCaseNode>, prefix: &str) -> HashSet<String> {
    let mut only = HashSet::new();
    for (name, node) in cases {
        let qualified = qualify(prefix, name);
        only.extend(collect_only(&node.cases, &qualified));
        if node.is_only() {
            only.insert(qualified);
        }
    }
    only
}

struct Resolver<'a> {
    config: &'a Config,
    services: IndexMap<String, Arc<dyn Service>>,
    new_requester: RequesterFactory,
    only: HashSet<String>,
}

impl Resolver<'_> {
    fn walk(
        &self,
        cases: &IndexMap<String, TestCaseNode>,
        prefix: &str,
        inherited_preparers: &[Arc<dyn ServicePreparer>],
        inherited_checkers: &[Arc<dyn ServiceChecker>],
        ignore_only: bool,
        out: &mut Vec<ResolvedTestCase>,
    ) -> Result<()> {
        for (name, node) in cases {
            let qualified = qualify(prefix, name);
            if node.is_skipped() {
                tracing::debug!(case = %qualified, "Skipping case");
                continue;
            }
            let eligible = ignore_only || self.only.is_empty() || self.only.contains(&qualified);

            let preparers = self.extend_preparers(&qualified, inherited_preparers, node)?;
            let checkers = self.extend_checkers(&qualified, inherited_checkers, node)?;

            if eligible {
                if let Some(selector) = &node.general_cases {
                    self.emit_general(&qualified, selector, &preparers, &checkers, out)?;
                }
                if node.defines_request() {
                    let requester = self.node_requester(&qualified, node)?;
                    out.push(build_test(qualified.clone(), &preparers, &checkers, requester, node));
                }
            }

            self.walk(&node.cases, &qualified, &preparers, &checkers, eligible, out)?;
        }
        Ok(())
    }

    fn service(&self, name: &str) -> Result<&Arc<dyn Service>> {
        self.services
            .get(name)
            .ok_or_else(|| Error::ServiceNotFound(name.to_string()))
    }

    fn extend_preparers(
        &self,
        case: &str,
        inherited: &[Arc<dyn ServicePreparer>],
        node: &TestCaseNode,
    ) -> Result<Vec<Arc<dyn ServicePreparer>>> {
        let mut preparers = inherited.to_vec();
        for (service, params) in &node.prepare_services {
            let preparer = self.service(service)?.preparer(params).map_err(|e| {
                Error::resolve(case, format!("unable to create preparer for service '{}': {}", service, e))
            })?;
            preparers.push(preparer);
        }
        Ok(preparers)
    }

    fn extend_checkers(
        &self,
        case: &str,
        inherited: &[Arc<dyn ServiceChecker>],
        node: &TestCaseNode,
    ) -> Result<Vec<Arc<dyn ServiceChecker>>> {
        let mut checkers = inherited.to_vec();
        for entry in &node.check_services {
            for (service, params) in entry {
                let checker = self.service(service)?.checker(params).map_err(|e| {
                    Error::resolve(case, format!("unable to create checker for service '{}': {}", service, e))
                })?;
                checkers.push(checker);
            }
        }
        Ok(checkers)
    }

    fn requester(&self, case: &str, request: &Value) -> Result<Arc<dyn Requester>> {
        (self.new_requester)(request, &self.config.application.request_defaults)
            .map_err(|e| Error::resolve(case, format!("unable to create requester: {}", e)))
    }

    /// Requester of a node's own test: `request`, with `modify_request` joined over it
    fn node_requester(&self, case: &str, node: &TestCaseNode) -> Result<Arc<dyn Requester>> {
        let request = node
            .request
            .as_ref()
            .ok_or_else(|| Error::resolve(case, "request should be set"))?;
        let requester = self.requester(case, request)?;
        match &node.modify_request {
            Some(modify) => {
                let modify = self.requester(case, modify)?;
                requester
                    .join(modify.as_ref())
                    .map_err(|e| Error::resolve(case, format!("unable to apply modify_request: {}", e)))
            }
            None => Ok(requester),
        }
    }

    fn emit_general(
        &self,
        case: &str,
        selector: &GeneralCasesSelector,
        preparers: &[Arc<dyn ServicePreparer>],
        checkers: &[Arc<dyn ServiceChecker>],
        out: &mut Vec<ResolvedTestCase>,
    ) -> Result<()> {
        for name in selector.include.iter().chain(&selector.exclude) {
            if !self.config.general_cases.contains_key(name) {
                return Err(Error::GeneralCaseNotFound(name.clone()));
            }
        }

        let selector_requester = selector
            .request
            .as_ref()
            .map(|request| self.requester(case, request))
            .transpose()?;

        for (general_name, general) in &self.config.general_cases {
            if !selector.selects(general_name, general) {
                continue;
            }
            for (leaf_name, leaf) in &general.cases {
                let name = format!("{} {} {}", case, general_name, leaf_name);
                let request = leaf.request.as_ref().ok_or_else(|| {
                    Error::resolve(&name, "general case leaf should define request")
                })?;
                let mut requester = self.requester(&name, request)?;
                if let Some(over) = &selector_requester {
                    requester = requester.join(over.as_ref()).map_err(|e| {
                        Error::resolve(&name, format!("unable to join selector request: {}", e))
                    })?;
                }

                let preparers = self.extend_preparers(&name, preparers, leaf)?;
                let checkers = self.extend_checkers(&name, checkers, leaf)?;
                tracing::debug!(test = %name, "General case selected");
                out.push(build_test(name, &preparers, &checkers, requester, leaf));
            }
        }
        Ok(())
    }
}

fn build_test(
    name: String,
    preparers: &[Arc<dyn ServicePreparer>],
    checkers: &[Arc<dyn ServiceChecker>],
    requester: Arc<dyn Requester>,
    node: &TestCaseNode,
) -> ResolvedTestCase {
    ResolvedTestCase {
        name,
        preparers: preparers.to_vec(),
        checkers: checkers.to_vec(),
        requester,
        expected_response: node.expected_response.clone(),
        expected_code: node.expected_code(),
        save_response_to: node.save_response_to.clone(),
    }
}
