//! Execution of a single resolved test
//!
//! A test walks through fixed stages; the first failing stage ends it:
//! environment init → service prepare → request → response assert → service check.

use std::fmt;
use std::sync::Arc;

use super::config::ExpectedResponse;
use super::equality::is_equal;
use super::interpolation::interpolate;
use super::variables::{VariableStore, RESPONSE_KEY};
use crate::common::{Error, Result, Value};
use crate::plugins::{EnvironmentInitializer, Requester, ServiceChecker, ServicePreparer};

/// A flattened, executable test
#[derive(Clone)]
pub struct ResolvedTestCase {
    /// Space-joined path of the node, including any general case segment
    pub name: String,
    /// Inherited preparers first, then the node's own
    pub preparers: Vec<Arc<dyn ServicePreparer>>,
    /// Inherited checkers first, then the node's own
    pub checkers: Vec<Arc<dyn ServiceChecker>>,
    pub requester: Arc<dyn Requester>,
    pub expected_response: ExpectedResponse,
    pub expected_code: Option<u16>,
    pub save_response_to: Option<String>,
}

impl fmt::Debug for ResolvedTestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedTestCase")
            .field("name", &self.name)
            .field("preparers", &self.preparers.len())
            .field("checkers", &self.checkers.len())
            .field("requester", &self.requester)
            .field("expected_response", &self.expected_response)
            .field("expected_code", &self.expected_code)
            .field("save_response_to", &self.save_response_to)
            .finish()
    }
}

/// Stage of a test run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    EnvironmentInit,
    ServicePrepare,
    Request,
    ResponseAssert,
    ServiceCheck,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::EnvironmentInit => write!(f, "unable to initialize environment"),
            Stage::ServicePrepare => write!(f, "unable to prepare service"),
            Stage::Request => write!(f, "unable to make request"),
            Stage::ResponseAssert => write!(f, "invalid response"),
            Stage::ServiceCheck => write!(f, "unable to check service"),
        }
    }
}

/// Why a test failed
#[derive(Debug)]
pub struct TestFailure {
    pub stage: Stage,
    pub error: Error,
}

impl fmt::Display for TestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.error)
    }
}

impl std::error::Error for TestFailure {}

trait StageExt<T> {
    fn stage(self, stage: Stage) -> std::result::Result<T, TestFailure>;
}

impl<T> StageExt<T> for Result<T> {
    fn stage(self, stage: Stage) -> std::result::Result<T, TestFailure> {
        self.map_err(|error| TestFailure { stage, error })
    }
}

impl ResolvedTestCase {
    /// Run the test with a fresh variable store
    pub async fn exec(
        &self,
        environment: &[Arc<dyn EnvironmentInitializer>],
    ) -> std::result::Result<VariableStore, TestFailure> {
        for initializer in environment {
            initializer.init_environment().await.stage(Stage::EnvironmentInit)?;
        }

        for preparer in &self.preparers {
            preparer.prepare().await.stage(Stage::ServicePrepare)?;
        }

        let mut variables = VariableStore::new();

        let response = self.requester.make_request().await.stage(Stage::Request)?;
        tracing::debug!(test = %self.name, status = response.status, bytes = response.body.len(), "Response received");

        self.check_response(&response.body, response.status, &mut variables)
            .stage(Stage::ResponseAssert)?;

        for checker in &self.checkers {
            checker.check(&mut variables).await.stage(Stage::ServiceCheck)?;
        }

        Ok(variables)
    }

    fn check_response(&self, body: &[u8], status: u16, variables: &mut VariableStore) -> Result<()> {
        let actual = if body.is_empty() {
            Value::Null
        } else {
            Value::from_json_slice(body).map_err(|e| {
                Error::TestAssertion(format!(
                    "unable to decode response body {}: {}",
                    String::from_utf8_lossy(body),
                    e
                ))
            })?
        };

        match &self.expected_response {
            ExpectedResponse::Absent => {}
            ExpectedResponse::ExplicitNull => {
                if !body.is_empty() {
                    return Err(Error::TestAssertion(format!(
                        "expected empty response, got {}",
                        String::from_utf8_lossy(body)
                    )));
                }
            }
            ExpectedResponse::Pattern(pattern) => {
                let expected = interpolate(pattern, variables)?;
                is_equal(&actual, &expected)?;
            }
        }

        if let Some(code) = self.expected_code {
            if status != code {
                return Err(Error::TestAssertion(format!(
                    "expected status code {}, got {}",
                    code, status
                )));
            }
        }

        if let Some(key) = &self.save_response_to {
            variables.save(key.clone(), actual.clone());
        }
        variables.save(RESPONSE_KEY, actual);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::Response;
    use async_trait::async_trait;
    use std::any::Any;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct FixedRequester {
        body: &'static str,
        status: u16,
    }

    #[async_trait]
    impl Requester for FixedRequester {
        async fn make_request(&self) -> Result<Response> {
            Ok(Response {
                body: self.body.as_bytes().to_vec(),
                status: self.status,
            })
        }

        fn join(&self, _other: &dyn Requester) -> Result<Arc<dyn Requester>> {
            Err(Error::Config("not joinable".to_string()))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct Recorder {
        log: Arc<Mutex<Vec<String>>>,
        label: &'static str,
        fail: bool,
    }

    #[async_trait]
    impl ServicePreparer for Recorder {
        async fn prepare(&self) -> Result<()> {
            self.log.lock().unwrap().push(format!("prepare {}", self.label));
            if self.fail {
                return Err(Error::service(self.label, "boom"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ServiceChecker for Recorder {
        async fn check(&self, variables: &mut VariableStore) -> Result<()> {
            self.log.lock().unwrap().push(format!("check {}", self.label));
            assert!(variables.get(RESPONSE_KEY).is_some());
            variables.save(self.label, Value::Bool(true));
            Ok(())
        }
    }

    fn test_case(body: &'static str, status: u16, expected: ExpectedResponse) -> ResolvedTestCase {
        ResolvedTestCase {
            name: "t".to_string(),
            preparers: Vec::new(),
            checkers: Vec::new(),
            requester: Arc::new(FixedRequester { body, status }),
            expected_response: expected,
            expected_code: Some(200),
            save_response_to: None,
        }
    }

    fn pattern(yaml: &str) -> ExpectedResponse {
        ExpectedResponse::Pattern(serde_yaml::from_str(yaml).unwrap())
    }

    #[tokio::test]
    async fn test_pattern_and_code() {
        let ok = test_case(r#"{"data":{"ping":true}}"#, 200, pattern("data: {ping: true}"));
        let vars = ok.exec(&[]).await.unwrap();
        assert_eq!(
            vars.lookup("response.data.ping").unwrap(),
            &Value::Bool(true)
        );

        let wrong_body = test_case(r#"{"data":{"ping":false}}"#, 200, pattern("data: {ping: true}"));
        let failure = wrong_body.exec(&[]).await.unwrap_err();
        assert_eq!(failure.stage, Stage::ResponseAssert);
        assert!(matches!(failure.error, Error::Mismatch { .. }));

        let wrong_code = test_case(r#"{"data":{"ping":true}}"#, 500, pattern("data: {ping: true}"));
        let failure = wrong_code.exec(&[]).await.unwrap_err();
        assert!(failure.to_string().contains("expected status code 200, got 500"));
    }

    #[tokio::test]
    async fn test_explicit_null_and_absent() {
        test_case("", 200, ExpectedResponse::ExplicitNull).exec(&[]).await.unwrap();
        assert!(test_case("{}", 200, ExpectedResponse::ExplicitNull)
            .exec(&[])
            .await
            .is_err());
        test_case(r#"[1, 2]"#, 200, ExpectedResponse::Absent).exec(&[]).await.unwrap();
        let failure = test_case("<html>", 200, ExpectedResponse::Absent)
            .exec(&[])
            .await
            .unwrap_err();
        assert_eq!(failure.stage, Stage::ResponseAssert);
    }

    #[tokio::test]
    async fn test_stage_order_and_variables() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let recorder = |label, fail| {
            Arc::new(Recorder {
                log: log.clone(),
                label,
                fail,
            })
        };
        let mut t = test_case(r#"{"id": 5}"#, 200, ExpectedResponse::Absent);
        t.preparers = vec![
            recorder("parent", false) as Arc<dyn ServicePreparer>,
            recorder("local", false),
        ];
        t.checkers = vec![
            recorder("first", false) as Arc<dyn ServiceChecker>,
            recorder("second", false),
        ];
        t.save_response_to = Some("created".to_string());

        let vars = t.exec(&[]).await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["prepare parent", "prepare local", "check first", "check second"]
        );
        assert_eq!(vars.lookup("created.id").unwrap(), &Value::Integer(5));
        assert_eq!(vars.get("first"), Some(&Value::Bool(true)));
    }

    #[tokio::test]
    async fn test_failing_preparer_stops_test() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut t = test_case("{}", 200, ExpectedResponse::Absent);
        t.preparers = vec![Arc::new(Recorder {
            log: log.clone(),
            label: "db",
            fail: true,
        }) as Arc<dyn ServicePreparer>];
        t.checkers = vec![Arc::new(Recorder {
            log: log.clone(),
            label: "never",
            fail: false,
        }) as Arc<dyn ServiceChecker>];
        let failure = t.exec(&[]).await.unwrap_err();
        assert_eq!(failure.stage, Stage::ServicePrepare);
        assert_eq!(*log.lock().unwrap(), vec!["prepare db"]);
    }

    #[tokio::test]
    async fn test_expected_response_interpolates_earlier_values() {
        // `response` is not yet set while the response itself is asserted
        let t = test_case(r#"{"a": 1}"#, 200, pattern("a: '{{ response.a }}'"));
        let failure = t.exec(&[]).await.unwrap_err();
        assert!(matches!(failure.error, Error::Interpolation { .. }));
    }
}
