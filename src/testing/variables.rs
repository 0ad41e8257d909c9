//! Per-test variable store
//!
//! Holds values captured while a single test runs (the decoded response,
//! checker results) so later steps of the same test can refer to them.

use indexmap::IndexMap;

use crate::common::{Error, Result, Value};

/// Reserved key the decoded response body is stored under
pub const RESPONSE_KEY: &str = "response";

/// Scratch space of one test execution
#[derive(Debug, Default, Clone)]
pub struct VariableStore {
    values: IndexMap<String, Value>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save a value, replacing any earlier value under the same key
    pub fn save(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        tracing::trace!(key = %key, "Saving variable");
        self.values.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Resolve a dotted path such as `user.0.name`
    ///
    /// The first segment names a variable; later segments are object keys or,
    /// for lists, numeric indices.
    pub fn lookup(&self, path: &str) -> Result<&Value> {
        let mut segments = path.split('.');
        let root = segments.next().unwrap_or_default();
        let mut current = self
            .values
            .get(root)
            .ok_or_else(|| Error::interpolation(path, format!("variable '{}' is not defined", root)))?;

        let mut walked = root.to_string();
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment).ok_or_else(|| {
                    Error::interpolation(path, format!("key '{}' not found in '{}'", segment, walked))
                })?,
                Value::List(items) => {
                    let index: usize = segment.parse().map_err(|_| {
                        Error::interpolation(
                            path,
                            format!("'{}' is a list, '{}' is not an index", walked, segment),
                        )
                    })?;
                    items.get(index).ok_or_else(|| {
                        Error::interpolation(
                            path,
                            format!(
                                "index {} out of range for '{}' ({} items)",
                                index,
                                walked,
                                items.len()
                            ),
                        )
                    })?
                }
                other => {
                    return Err(Error::interpolation(
                        path,
                        format!("cannot read '{}' of {} '{}'", segment, other.kind(), walked),
                    ))
                }
            };
            walked.push('.');
            walked.push_str(segment);
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> VariableStore {
        let mut vars = VariableStore::new();
        vars.save(
            "user",
            serde_json::json!([{"name": "alice", "tags": ["a", "b"]}]).into(),
        );
        vars.save("count", Value::Integer(3));
        vars
    }

    #[test]
    fn test_lookup_nested() {
        let vars = store();
        assert_eq!(vars.lookup("user.0.name").unwrap(), &Value::from("alice"));
        assert_eq!(vars.lookup("user.0.tags.1").unwrap(), &Value::from("b"));
        assert_eq!(vars.lookup("count").unwrap(), &Value::Integer(3));
    }

    #[test]
    fn test_lookup_errors_are_path_qualified() {
        let vars = store();
        for path in ["missing", "user.0.email", "user.7", "user.first", "count.x"] {
            match vars.lookup(path) {
                Err(Error::Interpolation { path: p, .. }) => assert_eq!(p, path),
                other => panic!("Expected Interpolation error for {}, got {:?}", path, other),
            }
        }
    }

    #[test]
    fn test_save_overwrites() {
        let mut vars = store();
        vars.save("count", Value::Integer(4));
        assert_eq!(vars.get("count"), Some(&Value::Integer(4)));
    }
}
