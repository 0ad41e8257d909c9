//! `graphql` requester
//!
//! Request params:
//! ```yaml
//! request:
//!   query: "{ users { id } }"
//!   headers: { Authorization: "Bearer x" }
//!   method: POST        # optional, falls back to request_defaults
//!   url: http://...     # optional, falls back to request_defaults
//! ```

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;

use super::{Requester, Response};
use crate::common::{Error, Result, Value};
use crate::testing::RequestDefaults;

const DEFAULT_METHOD: &str = "POST";

#[derive(Debug, Clone, Default)]
pub struct GraphqlRequester {
    query: Option<String>,
    headers: Option<IndexMap<String, String>>,
    method: Option<String>,
    url: Option<String>,
    defaults: RequestDefaults,
    client: reqwest::Client,
}

impl GraphqlRequester {
    /// Build a requester from a `request` block
    pub fn from_params(request: &Value, defaults: &RequestDefaults) -> Result<Self> {
        let map = request
            .as_object()
            .ok_or_else(|| Error::Config(format!("graphql request should be a map, got {}", request)))?;

        let mut requester = GraphqlRequester {
            defaults: defaults.clone(),
            ..Default::default()
        };

        for (key, value) in map {
            match key.as_str() {
                "query" => requester.query = Some(string_field(key, value)?),
                "method" => requester.method = Some(string_field(key, value)?),
                "url" => requester.url = Some(string_field(key, value)?),
                "headers" => {
                    let headers = value.as_object().ok_or_else(|| {
                        Error::Config(format!("graphql request headers should be a map, got {}", value))
                    })?;
                    requester.headers = Some(
                        headers
                            .iter()
                            .map(|(name, v)| (name.clone(), v.to_text()))
                            .collect(),
                    );
                }
                other => {
                    return Err(Error::Config(format!(
                        "Unknown graphql request field '{}'",
                        other
                    )))
                }
            }
        }
        Ok(requester)
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Headers sent with the request; the request's own headers replace the defaults
    pub fn effective_headers(&self) -> IndexMap<String, String> {
        match &self.headers {
            Some(headers) => headers.clone(),
            None => self
                .defaults
                .headers
                .iter()
                .map(|(name, v)| (name.clone(), v.to_text()))
                .collect(),
        }
    }

    pub fn effective_method(&self) -> &str {
        self.method
            .as_deref()
            .or(self.defaults.method.as_deref())
            .unwrap_or(DEFAULT_METHOD)
    }

    pub fn effective_url(&self) -> Option<&str> {
        self.url.as_deref().or(self.defaults.url.as_deref())
    }
}

fn string_field(key: &str, value: &Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::Config(format!("graphql request '{}' should be a string, got {}", key, value)))
}

#[async_trait]
impl Requester for GraphqlRequester {
    async fn make_request(&self) -> Result<Response> {
        let url = self
            .effective_url()
            .ok_or_else(|| Error::Request("url is not set and request_defaults.url is empty".to_string()))?;
        let method = reqwest::Method::from_bytes(self.effective_method().as_bytes())
            .map_err(|e| Error::Request(format!("invalid method '{}': {}", self.effective_method(), e)))?;

        tracing::debug!(%url, %method, query = ?self.query, "Sending graphql request");

        let payload = serde_json::json!({ "query": self.query.clone().unwrap_or_default() });
        let mut request = self.client.request(method, url).json(&payload);
        for (name, value) in self.effective_headers() {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Request(format!("unable to make request to application: {}", e)))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Request(format!("unable to read response body: {}", e)))?;

        tracing::debug!(status, bytes = body.len(), "Received graphql response");
        Ok(Response {
            body: body.to_vec(),
            status,
        })
    }

    fn join(&self, other: &dyn Requester) -> Result<Arc<dyn Requester>> {
        let other = other
            .as_any()
            .downcast_ref::<GraphqlRequester>()
            .ok_or_else(|| Error::Config(format!("cannot join graphql requester with {:?}", other)))?;

        let mut joined = self.clone();
        if other.query.is_some() {
            joined.query = other.query.clone();
        }
        if let Some(headers) = &other.headers {
            let merged = joined.headers.get_or_insert_with(IndexMap::new);
            for (name, value) in headers {
                merged.insert(name.clone(), value.clone());
            }
        }
        if other.method.is_some() {
            joined.method = other.method.clone();
        }
        if other.url.is_some() {
            joined.url = other.url.clone();
        }
        Ok(Arc::new(joined))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn defaults() -> RequestDefaults {
        serde_yaml::from_str("url: http://localhost:8080/graphql\nheaders: {X-Default: 1}").unwrap()
    }

    #[test]
    fn test_from_params_applies_defaults() {
        let r = GraphqlRequester::from_params(&value("query: '{ ping }'"), &defaults()).unwrap();
        assert_eq!(r.query(), Some("{ ping }"));
        assert_eq!(r.effective_method(), "POST");
        assert_eq!(r.effective_url(), Some("http://localhost:8080/graphql"));
        assert_eq!(r.effective_headers().get("X-Default").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_from_params_rejects_bad_shapes() {
        assert!(GraphqlRequester::from_params(&value("'{ ping }'"), &defaults()).is_err());
        assert!(GraphqlRequester::from_params(&value("query: 1"), &defaults()).is_err());
        assert!(GraphqlRequester::from_params(&value("qeury: x"), &defaults()).is_err());
    }

    #[test]
    fn test_join_overrides_field_wise() {
        let base = GraphqlRequester::from_params(
            &value("query: base\nheaders: {Authorization: '', X-Trace: a}"),
            &defaults(),
        )
        .unwrap();
        let over = GraphqlRequester::from_params(
            &value("query: override\nheaders: {X-Trace: b}"),
            &defaults(),
        )
        .unwrap();

        let joined = base.join(&over).unwrap();
        let joined = joined.as_any().downcast_ref::<GraphqlRequester>().unwrap();
        assert_eq!(joined.query(), Some("override"));
        let headers = joined.effective_headers();
        assert_eq!(headers.get("Authorization").map(String::as_str), Some(""));
        assert_eq!(headers.get("X-Trace").map(String::as_str), Some("b"));

        // sources untouched
        assert_eq!(base.query(), Some("base"));
        assert_eq!(base.effective_headers().get("X-Trace").map(String::as_str), Some("a"));
    }

    #[test]
    fn test_join_keeps_base_when_override_is_empty() {
        let base = GraphqlRequester::from_params(&value("query: base\nmethod: GET"), &defaults()).unwrap();
        let over = GraphqlRequester::from_params(&value("{}"), &defaults()).unwrap();
        let joined = base.join(&over).unwrap();
        let joined = joined.as_any().downcast_ref::<GraphqlRequester>().unwrap();
        assert_eq!(joined.query(), Some("base"));
        assert_eq!(joined.effective_method(), "GET");
    }

    #[tokio::test]
    async fn test_request_without_url_fails() {
        let r = GraphqlRequester::from_params(&value("query: x"), &RequestDefaults::default()).unwrap();
        assert!(matches!(r.make_request().await, Err(Error::Request(_))));
    }
}
