//! `{{ path }}` substitution inside value trees
//!
//! Strings anywhere in a tree may reference variables captured earlier in the
//! same test. A string that is exactly one marker takes the referenced value
//! as is (an object stays an object, a number stays a number); a marker inside
//! a longer string is replaced by the value's text. Object keys are strings
//! too and get text substitution.
//!
//! ```yaml
//! expected_response:
//!   data:
//!     user: "{{ created.data.user }}"          # whole value
//!     greeting: "hello {{ created.data.user.name }}"
//!     id: "{{ created.data.user.id | string }}"
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use regex::{Captures, Regex};

use super::variables::VariableStore;
use crate::common::{Error, Result, Value};

lazy_static::lazy_static! {
    static ref MARKER: Regex =
        Regex::new(r"\{\{\s*([\w.]+)\s*(?:\|\s*(\w+)\s*)?\}\}").expect("marker regex is valid");
    static ref DEFAULT: Interpolator = Interpolator::new();
}

/// A named transformation applied with `{{ path | name }}`
pub type Helper = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

/// Substitutes markers using a set of helpers
#[derive(Clone)]
pub struct Interpolator {
    helpers: HashMap<String, Helper>,
}

impl Default for Interpolator {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpolator {
    /// Interpolator with the built-in `string`, `quote` and `singlequote` helpers
    pub fn new() -> Self {
        Self {
            helpers: HashMap::new(),
        }
        .with_helper("string", |v| Ok(Value::String(v.to_text())))
        .with_helper("quote", |v| {
            Ok(Value::String(
                serde_json::Value::String(v.to_text()).to_string(),
            ))
        })
        .with_helper("singlequote", |v| {
            Ok(Value::String(format!("'{}'", v.to_text().replace('\'', "\\'"))))
        })
    }

    /// Add or replace a helper
    pub fn with_helper<F>(mut self, name: &str, helper: F) -> Self
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.helpers.insert(name.to_string(), Arc::new(helper));
        self
    }

    /// Return a copy of `value` with every marker substituted
    ///
    /// Fails on the first unresolvable marker; nothing is partially replaced.
    pub fn interpolate(&self, value: &Value, variables: &VariableStore) -> Result<Value> {
        match value {
            Value::String(s) => self.interpolate_str(s, variables),
            Value::List(items) => items
                .iter()
                .map(|item| self.interpolate(item, variables))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            Value::Object(map) => {
                let mut out = crate::common::value::Map::with_capacity(map.len());
                for (key, item) in map {
                    let key = self.interpolate_text(key, variables)?;
                    out.insert(key, self.interpolate(item, variables)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn interpolate_str(&self, s: &str, variables: &VariableStore) -> Result<Value> {
        if let Some(caps) = MARKER.captures(s) {
            let whole = caps.get(0).is_some_and(|m| m.start() == 0 && m.end() == s.len());
            if whole {
                return self.resolve(&caps, variables);
            }
            return self.interpolate_text(s, variables).map(Value::String);
        }
        Ok(Value::String(s.to_string()))
    }

    fn interpolate_text(&self, s: &str, variables: &VariableStore) -> Result<String> {
        let mut out = String::with_capacity(s.len());
        let mut last = 0;
        for caps in MARKER.captures_iter(s) {
            let Some(m) = caps.get(0) else { continue };
            out.push_str(&s[last..m.start()]);
            out.push_str(&self.resolve(&caps, variables)?.to_text());
            last = m.end();
        }
        out.push_str(&s[last..]);
        Ok(out)
    }

    fn resolve(&self, caps: &Captures<'_>, variables: &VariableStore) -> Result<Value> {
        let path = caps.get(1).map_or("", |m| m.as_str());
        let value = variables.lookup(path)?;
        match caps.get(2) {
            None => Ok(value.clone()),
            Some(name) => {
                let helper = self.helpers.get(name.as_str()).ok_or_else(|| {
                    Error::interpolation(path, format!("unknown helper '{}'", name.as_str()))
                })?;
                helper(value)
            }
        }
    }
}

/// Interpolate with the default helpers
pub fn interpolate(value: &Value, variables: &VariableStore) -> Result<Value> {
    DEFAULT.interpolate(value, variables)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> VariableStore {
        let mut vars = VariableStore::new();
        vars.save("user", serde_json::json!([{"name": "alice", "id": 7}]).into());
        vars.save("token", Value::from("abc"));
        vars
    }

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn test_whole_marker_preserves_type() {
        let vars = vars();
        assert_eq!(
            interpolate(&Value::from("{{ user.0.name }}"), &vars).unwrap(),
            Value::from("alice")
        );
        assert_eq!(
            interpolate(&Value::from("{{user.0.id}}"), &vars).unwrap(),
            Value::Integer(7)
        );
        let whole = interpolate(&Value::from("{{ user.0 }}"), &vars).unwrap();
        assert_eq!(whole.get("name"), Some(&Value::from("alice")));
    }

    #[test]
    fn test_embedded_markers_render_text() {
        let vars = vars();
        let v = interpolate(&Value::from("Bearer {{ token }} for #{{ user.0.id }}"), &vars).unwrap();
        assert_eq!(v, Value::from("Bearer abc for #7"));
    }

    #[test]
    fn test_nested_structures_and_keys() {
        let vars = vars();
        let v = interpolate(
            &yaml("headers: {Authorization: 'Bearer {{ token }}'}\nids: ['{{ user.0.id }}', 2]\n'{{ token }}': 1"),
            &vars,
        )
        .unwrap();
        assert_eq!(
            v.get("headers").and_then(|h| h.get("Authorization")),
            Some(&Value::from("Bearer abc"))
        );
        assert_eq!(
            v.get("ids"),
            Some(&Value::List(vec![Value::Integer(7), Value::Integer(2)]))
        );
        assert_eq!(v.get("abc"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_helpers() {
        let vars = vars();
        assert_eq!(
            interpolate(&Value::from("{{ user.0.id | string }}"), &vars).unwrap(),
            Value::from("7")
        );
        assert_eq!(
            interpolate(&Value::from("{{ token | quote }}"), &vars).unwrap(),
            Value::from("\"abc\"")
        );
        assert_eq!(
            interpolate(&Value::from("name = {{ token | singlequote }}"), &vars).unwrap(),
            Value::from("name = 'abc'")
        );

        let custom = Interpolator::new().with_helper("upper", |v| Ok(Value::from(v.to_text().to_uppercase())));
        assert_eq!(
            custom.interpolate(&Value::from("{{ token | upper }}"), &vars).unwrap(),
            Value::from("ABC")
        );
        assert!(matches!(
            interpolate(&Value::from("{{ token | upper }}"), &vars),
            Err(Error::Interpolation { .. })
        ));
    }

    #[test]
    fn test_missing_path_is_error() {
        let vars = vars();
        let err = interpolate(&yaml("a: [ok, 'x {{ user.0.email }}']"), &vars).unwrap_err();
        match err {
            Error::Interpolation { path, .. } => assert_eq!(path, "user.0.email"),
            other => panic!("Expected Interpolation error, got {:?}", other),
        }
    }

    #[test]
    fn test_values_without_markers_unchanged() {
        let v = yaml("a: {b: [1, 2.5, true, null, 'plain {text}']}");
        assert_eq!(interpolate(&v, &VariableStore::new()).unwrap(), v);
    }
}
