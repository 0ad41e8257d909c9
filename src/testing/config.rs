//! Test suite configuration types
//!
//! Defines the data structures for deserializing YAML configuration fragments
//! and the rules for joining several fragments into one suite.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};

use crate::common::{Error, Result, Value};

/// One YAML file of a suite; fragments are joined into a [`Config`]
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFragment {
    /// How requests are sent to the application under test
    pub application: Option<ApplicationConfig>,
    /// Dependent services, keyed by the name test cases refer to
    #[serde(default)]
    pub services: IndexMap<String, ServiceConfig>,
    /// Environment initializers, keyed by initializer name
    #[serde(default)]
    pub environment: IndexMap<String, Value>,
    /// Reusable test cases that nodes can pull in through a selector
    #[serde(default)]
    pub general_cases: IndexMap<String, GeneralCaseDefinition>,
    /// Root of the test case tree
    #[serde(default)]
    pub cases: IndexMap<String, TestCaseNode>,
}

/// A complete suite after all fragments were joined and validated
#[derive(Debug)]
pub struct Config {
    pub application: ApplicationConfig,
    pub services: IndexMap<String, ServiceConfig>,
    pub environment: IndexMap<String, Value>,
    pub general_cases: IndexMap<String, GeneralCaseDefinition>,
    pub cases: IndexMap<String, TestCaseNode>,
    /// Directory relative service paths are resolved against
    pub base_dir: PathBuf,
}

/// Application section
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ApplicationConfig {
    /// Requester type used for every request (e.g. "graphql")
    pub request_type: String,
    /// Values used when a request leaves a field unset
    #[serde(default)]
    pub request_defaults: RequestDefaults,
}

/// Request fields shared by all requests of a suite
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RequestDefaults {
    pub url: Option<String>,
    pub method: Option<String>,
    #[serde(default)]
    pub headers: IndexMap<String, Value>,
}

/// Declaration of a dependent service
#[derive(Deserialize, Debug, Clone)]
pub struct ServiceConfig {
    /// Service type the registry builds the service from (e.g. "filesystem")
    #[serde(rename = "type")]
    pub service_type: String,
    /// Remaining keys, handed to the service factory as an object
    #[serde(flatten)]
    pub params: IndexMap<String, Value>,
}

impl ServiceConfig {
    pub fn params_value(&self) -> Value {
        Value::Object(self.params.clone())
    }
}

/// A named, reusable set of test cases
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct GeneralCaseDefinition {
    /// Include into every selector unless excluded there
    #[serde(default)]
    pub auto_include: bool,
    /// Leaf cases, one test per leaf and selecting node
    #[serde(default)]
    pub cases: IndexMap<String, TestCaseNode>,
}

/// Chooses general cases for a node and overrides their request
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GeneralCasesSelector {
    /// Request fragment that wins over the general case's own request
    pub request: Option<Value>,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl GeneralCasesSelector {
    /// Whether a general case takes part for this selector
    pub fn selects(&self, name: &str, definition: &GeneralCaseDefinition) -> bool {
        let included = definition.auto_include || self.include.iter().any(|n| n == name);
        included && !self.exclude.iter().any(|n| n == name)
    }
}

/// What the response body is asserted against
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ExpectedResponse {
    /// `expected_response` not written: body is not asserted
    #[default]
    Absent,
    /// `expected_response: null`: body must be empty
    ExplicitNull,
    /// Body must match the pattern
    Pattern(Value),
}

impl ExpectedResponse {
    pub fn is_absent(&self) -> bool {
        matches!(self, ExpectedResponse::Absent)
    }
}

/// Only called when the key is present, so a missing key stays `Absent`
fn deserialize_expected_response<'de, D>(
    deserializer: D,
) -> std::result::Result<ExpectedResponse, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => ExpectedResponse::ExplicitNull,
        Some(pattern) => ExpectedResponse::Pattern(pattern),
    })
}

/// A node of the test case tree
///
/// Every field is optional so that fragments can contribute to the same node
/// from different files; [`TestCaseNode::merge`] refuses to let a field be
/// defined twice.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct TestCaseNode {
    /// Service name → preparer params
    #[serde(default)]
    pub prepare_services: IndexMap<String, Value>,
    /// Request params, interpreted by the requester type
    pub request: Option<Value>,
    /// Fragment joined over `request`
    pub modify_request: Option<Value>,
    #[serde(default, deserialize_with = "deserialize_expected_response")]
    pub expected_response: ExpectedResponse,
    /// Expected HTTP status; 0 means not asserted
    pub expected_code: Option<u16>,
    /// Ordered service name → checker params entries
    #[serde(default)]
    pub check_services: Vec<IndexMap<String, Value>>,
    pub only: Option<bool>,
    pub skip: Option<bool>,
    pub general_cases: Option<GeneralCasesSelector>,
    /// Extra variable name the decoded response is saved under
    pub save_response_to: Option<String>,
    /// Child nodes, in declaration order
    #[serde(default)]
    pub cases: IndexMap<String, TestCaseNode>,
}

impl TestCaseNode {
    pub fn is_only(&self) -> bool {
        self.only.unwrap_or(false)
    }

    pub fn is_skipped(&self) -> bool {
        self.skip.unwrap_or(false)
    }

    pub fn expected_code(&self) -> Option<u16> {
        self.expected_code.filter(|code| *code != 0)
    }

    /// Whether the node asks for a test of its own
    pub fn defines_request(&self) -> bool {
        self.request.is_some()
            || self.modify_request.is_some()
            || self.expected_code().is_some()
            || !self.expected_response.is_absent()
    }

    /// Merge another definition of the same node into this one
    pub fn merge(&mut self, other: TestCaseNode, path: &str) -> Result<()> {
        for (service, params) in other.prepare_services {
            if self.prepare_services.contains_key(&service) {
                return Err(Error::conflict(path, &format!("prepare_services.{service}")));
            }
            self.prepare_services.insert(service, params);
        }
        merge_field(&mut self.request, other.request, path, "request")?;
        merge_field(&mut self.modify_request, other.modify_request, path, "modify_request")?;
        if !other.expected_response.is_absent() {
            if !self.expected_response.is_absent() {
                return Err(Error::conflict(path, "expected_response"));
            }
            self.expected_response = other.expected_response;
        }
        merge_field(&mut self.expected_code, other.expected_code, path, "expected_code")?;
        if !other.check_services.is_empty() {
            if !self.check_services.is_empty() {
                return Err(Error::conflict(path, "check_services"));
            }
            self.check_services = other.check_services;
        }
        merge_field(&mut self.only, other.only, path, "only")?;
        merge_field(&mut self.skip, other.skip, path, "skip")?;
        merge_field(&mut self.general_cases, other.general_cases, path, "general_cases")?;
        merge_field(
            &mut self.save_response_to,
            other.save_response_to,
            path,
            "save_response_to",
        )?;
        merge_cases(&mut self.cases, other.cases, path)
    }
}

fn merge_field<T>(dst: &mut Option<T>, src: Option<T>, path: &str, field: &str) -> Result<()> {
    if let Some(value) = src {
        if dst.is_some() {
            return Err(Error::conflict(path, field));
        }
        *dst = Some(value);
    }
    Ok(())
}

/// Merge a mapping of nodes; `prefix` is the qualified name of their parent
pub fn merge_cases(
    dst: &mut IndexMap<String, TestCaseNode>,
    src: IndexMap<String, TestCaseNode>,
    prefix: &str,
) -> Result<()> {
    for (name, node) in src {
        let path = qualify(prefix, &name);
        match dst.get_mut(&name) {
            Some(existing) => existing.merge(node, &path)?,
            None => {
                dst.insert(name, node);
            }
        }
    }
    Ok(())
}

/// Space-joined qualified name of a child node
pub fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix} {name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(yaml: &str) -> TestCaseNode {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_expected_response_tri_state() {
        assert_eq!(node("request: {}").expected_response, ExpectedResponse::Absent);
        assert_eq!(
            node("expected_response: null").expected_response,
            ExpectedResponse::ExplicitNull
        );
        match node("expected_response: {data: 1}").expected_response {
            ExpectedResponse::Pattern(p) => assert_eq!(p.get("data"), Some(&Value::Integer(1))),
            other => panic!("Expected Pattern, got {:?}", other),
        }
    }

    #[test]
    fn test_defines_request() {
        assert!(!node("only: true").defines_request());
        assert!(!node("expected_code: 0").defines_request());
        assert!(node("expected_code: 200").defines_request());
        assert!(node("expected_response: null").defines_request());
        assert!(node("modify_request: {query: x}").defines_request());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: std::result::Result<TestCaseNode, _> = serde_yaml::from_str("requset: {}");
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_disjoint_fields() {
        let mut a = node("request: {query: q}\ncases: {x: {expected_code: 200}}");
        let b = node("expected_code: 201\ncases: {x: {request: {query: x}}, y: {skip: true}}");
        a.merge(b, "root").unwrap();
        assert_eq!(a.expected_code(), Some(201));
        assert_eq!(a.cases.len(), 2);
        assert!(a.cases["x"].request.is_some());
        assert_eq!(a.cases["x"].expected_code(), Some(200));
    }

    #[test]
    fn test_merge_conflict_reports_path() {
        let mut a = node("cases: {x: {expected_code: 200}}");
        let b = node("cases: {x: {expected_code: 201}}");
        let err = a.merge(b, "root").unwrap_err();
        match err {
            Error::ConfigConflict { path, field } => {
                assert_eq!(path, "root x");
                assert_eq!(field, "expected_code");
            }
            other => panic!("Expected ConfigConflict, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_prepare_services_conflict() {
        let mut a = node("prepare_services: {db: [clear]}");
        let b = node("prepare_services: {files: [clear]}");
        a.merge(b, "n").unwrap();
        assert_eq!(a.prepare_services.len(), 2);

        let c = node("prepare_services: {db: [clear]}");
        assert!(matches!(a.merge(c, "n"), Err(Error::ConfigConflict { .. })));
    }

    #[test]
    fn test_selector_selects() {
        let auto = GeneralCaseDefinition {
            auto_include: true,
            cases: IndexMap::new(),
        };
        let manual = GeneralCaseDefinition::default();
        let selector: GeneralCasesSelector =
            serde_yaml::from_str("include: [manual]\nexclude: [other]").unwrap();
        assert!(selector.selects("auth", &auto));
        assert!(selector.selects("manual", &manual));
        assert!(!selector.selects("missing", &manual));
        assert!(!selector.selects("other", &auto));
    }
}
