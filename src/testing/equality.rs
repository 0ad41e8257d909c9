//! Pattern matching of actual values against expected trees
//!
//! The expected side drives traversal. Objects match when every expected key
//! matches (extra actual keys are fine), lists must have the same length, and
//! scalars compare with a few coercions: integers and floats by numeric value,
//! strings against timestamps, numbers and bytes by their text.
//!
//! A map containing a `$$_<name>` key is a predicate instead of a literal:
//!
//! | marker                      | meaning                                         |
//! |-----------------------------|-------------------------------------------------|
//! | `$$_exists: bool`           | actual is (not) null; `false` also allows a missing key |
//! | `$$_exist: bool`            | same as `$$_exists`                             |
//! | `$$_convert: json`          | decode actual as JSON, match the sibling keys   |
//! | `$$_regexp: "<re>"`         | actual string contains a match                  |

use std::fmt;

use indexmap::IndexMap;
use regex::Regex;

use crate::common::error::display_path;
use crate::common::{parse_time, Error, Result, Value, TIME_LAYOUT};

lazy_static::lazy_static! {
    static ref MARKER_KEY: Regex = Regex::new(r"^\$\$_([\w.]+)$").expect("marker key regex is valid");
}

/// Compiled expected tree
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Scalar compared with coercions
    Literal(Value),
    List(Vec<Pattern>),
    Object(IndexMap<String, Pattern>),
    /// Null / not null
    Exists(bool),
    /// Actual is JSON text (or an object) matched against the inner pattern
    JsonEmbedded(Box<Pattern>),
    Regexp(Regex),
}

impl Pattern {
    /// Compile an expected value; the value itself is left untouched
    pub fn compile(expected: &Value) -> Result<Pattern> {
        compile_at(expected, "")
    }

    /// Match an actual value, reporting the first difference
    pub fn matches(&self, actual: &Value) -> Result<()> {
        self.matches_at(actual, "")
    }

    /// Whether the key holding this pattern may be missing from actual
    fn allows_missing(&self) -> bool {
        matches!(self, Pattern::Exists(false))
    }

    fn matches_at(&self, actual: &Value, path: &str) -> Result<()> {
        match self {
            Pattern::Literal(expected) => literal_matches(actual, expected, path),
            Pattern::List(items) => {
                let actual_items = actual
                    .as_list()
                    .ok_or_else(|| mismatch(path, actual, self))?;
                if actual_items.len() != items.len() {
                    return Err(Error::Mismatch {
                        path: display_path(path),
                        actual: format!("{} items", actual_items.len()),
                        expected: format!("{} items", items.len()),
                    });
                }
                for (i, (pattern, item)) in items.iter().zip(actual_items).enumerate() {
                    pattern.matches_at(item, &index_path(path, i))?;
                }
                Ok(())
            }
            Pattern::Object(fields) => match actual {
                Value::Object(map) => {
                    for (key, pattern) in fields {
                        let key_path = key_path(path, key);
                        match map.get(key) {
                            Some(value) => pattern.matches_at(value, &key_path)?,
                            None if pattern.allows_missing() => {}
                            None => {
                                return Err(Error::Mismatch {
                                    path: key_path,
                                    actual: "<missing>".to_string(),
                                    expected: pattern.to_string(),
                                })
                            }
                        }
                    }
                    Ok(())
                }
                Value::String(_) | Value::Bytes(_) => {
                    let decoded = decode_json(actual, path)?;
                    if decoded.as_object().is_none() {
                        return Err(mismatch(path, actual, self));
                    }
                    self.matches_at(&decoded, path)
                }
                _ => Err(mismatch(path, actual, self)),
            },
            Pattern::Exists(expected) => {
                if actual.is_null() == *expected {
                    return Err(mismatch(path, actual, self));
                }
                Ok(())
            }
            Pattern::JsonEmbedded(inner) => match actual {
                Value::Object(_) => inner.matches_at(actual, path),
                Value::String(_) | Value::Bytes(_) => {
                    inner.matches_at(&decode_json(actual, path)?, path)
                }
                _ => Err(mismatch(path, actual, self)),
            },
            Pattern::Regexp(re) => {
                let matched = match actual {
                    Value::String(s) => re.is_match(s),
                    Value::Bytes(b) => re.is_match(&String::from_utf8_lossy(b)),
                    _ => false,
                };
                if matched {
                    Ok(())
                } else {
                    Err(mismatch(path, actual, self))
                }
            }
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Literal(v) => write!(f, "{}", v),
            Pattern::List(items) => write!(f, "list of {} items", items.len()),
            Pattern::Object(fields) => {
                let keys: Vec<&str> = fields.keys().map(String::as_str).collect();
                write!(f, "object with keys [{}]", keys.join(", "))
            }
            Pattern::Exists(true) => write!(f, "any non-null value"),
            Pattern::Exists(false) => write!(f, "null or missing"),
            Pattern::JsonEmbedded(inner) => write!(f, "JSON encoded {}", inner),
            Pattern::Regexp(re) => write!(f, "match of /{}/", re.as_str()),
        }
    }
}

fn compile_at(expected: &Value, path: &str) -> Result<Pattern> {
    match expected {
        Value::List(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| compile_at(item, &index_path(path, i)))
            .collect::<Result<Vec<_>>>()
            .map(Pattern::List),
        Value::Object(map) => {
            let marker = map.iter().find_map(|(key, value)| {
                MARKER_KEY
                    .captures(key)
                    .and_then(|caps| caps.get(1))
                    .map(|name| (key.as_str(), name.as_str(), value))
            });
            match marker {
                Some((key, name, value)) => compile_marker(map, key, name, value, path),
                None => compile_object(map.iter(), path),
            }
        }
        scalar => Ok(Pattern::Literal(scalar.clone())),
    }
}

fn compile_object<'a>(
    fields: impl Iterator<Item = (&'a String, &'a Value)>,
    path: &str,
) -> Result<Pattern> {
    let mut out = IndexMap::new();
    for (key, value) in fields {
        out.insert(key.clone(), compile_at(value, &key_path(path, key))?);
    }
    Ok(Pattern::Object(out))
}

fn compile_marker(
    map: &IndexMap<String, Value>,
    key: &str,
    name: &str,
    value: &Value,
    path: &str,
) -> Result<Pattern> {
    match name {
        "exist" | "exists" => {
            only_key(map, key, path)?;
            let exists = value.as_bool().ok_or_else(|| {
                Error::pattern(path, format!("{} value should be bool, got {}", key, value))
            })?;
            Ok(Pattern::Exists(exists))
        }
        "convert" => match value.as_str() {
            Some("json") => {
                if let Some(other) = map.keys().find(|k| k.as_str() != key && MARKER_KEY.is_match(k)) {
                    return Err(Error::pattern(
                        path,
                        format!("{} cannot be combined with {}", key, other),
                    ));
                }
                let inner = compile_object(map.iter().filter(|(k, _)| k.as_str() != key), path)?;
                Ok(Pattern::JsonEmbedded(Box::new(inner)))
            }
            Some(format) => Err(Error::pattern(
                path,
                format!("unknown format to convert to: '{}'", format),
            )),
            None => Err(Error::pattern(
                path,
                format!("format to convert to should be string, got {}", value),
            )),
        },
        "regexp" => {
            only_key(map, key, path)?;
            let source = value.as_str().ok_or_else(|| {
                Error::pattern(path, format!("{} value should be string, got {}", key, value))
            })?;
            Regex::new(source)
                .map(Pattern::Regexp)
                .map_err(|e| Error::pattern(path, format!("unable to compile '{}': {}", source, e)))
        }
        other => Err(Error::pattern(path, format!("unknown marker '$$_{}'", other))),
    }
}

/// `$$_exists` and `$$_regexp` replace the whole map, so siblings would be ignored
fn only_key(map: &IndexMap<String, Value>, key: &str, path: &str) -> Result<()> {
    if map.len() > 1 {
        return Err(Error::pattern(
            path,
            format!("{} cannot be combined with other keys", key),
        ));
    }
    Ok(())
}

fn literal_matches(actual: &Value, expected: &Value, path: &str) -> Result<()> {
    let equal = match (expected, actual) {
        (Value::Null, Value::Null) => true,
        (Value::Null, Value::Bytes(b)) => b.is_empty(),
        (Value::Integer(e), Value::Integer(a)) => e == a,
        (Value::Integer(_) | Value::Float(_), _) => {
            matches!((expected.as_f64(), actual.as_f64()), (Some(e), Some(a)) if e == a)
        }
        (Value::String(e), Value::Timestamp(t)) => parse_timestamp(e, path)? == *t,
        (Value::Timestamp(t), Value::String(a)) => parse_time(a).is_some_and(|a| a == *t),
        (Value::String(e), Value::Integer(_) | Value::Float(_)) => match (e.trim().parse::<i64>(), actual) {
            (Ok(e), Value::Integer(a)) => e == *a,
            _ => matches!((e.trim().parse::<f64>().ok(), actual.as_f64()), (Some(e), Some(a)) if e == a),
        },
        (Value::String(e), Value::Bytes(b)) => e.as_bytes() == b.as_slice(),
        (e, a) => e == a,
    };
    if equal {
        Ok(())
    } else {
        Err(Error::Mismatch {
            path: display_path(path),
            actual: actual.to_string(),
            expected: expected.to_string(),
        })
    }
}

fn parse_timestamp(raw: &str, path: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    parse_time(raw).ok_or_else(|| {
        Error::pattern(
            path,
            format!("'{}' does not match timestamp layout {}", raw, TIME_LAYOUT),
        )
    })
}

fn decode_json(actual: &Value, path: &str) -> Result<Value> {
    let bytes = match actual {
        Value::String(s) => s.as_bytes(),
        Value::Bytes(b) => b.as_slice(),
        _ => return Ok(actual.clone()),
    };
    Value::from_json_slice(bytes).map_err(|e| {
        Error::TestAssertion(format!(
            "value of '{}' is not valid JSON: {}",
            display_path(path),
            e
        ))
    })
}

fn mismatch(path: &str, actual: &Value, expected: &Pattern) -> Error {
    Error::Mismatch {
        path: display_path(path),
        actual: actual.to_string(),
        expected: expected.to_string(),
    }
}

fn key_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn index_path(path: &str, index: usize) -> String {
    format!("{}[{}]", path, index)
}

/// Check `actual` against the expected pattern tree
pub fn is_equal(actual: &Value, expected: &Value) -> Result<()> {
    Pattern::compile(expected)?.matches(actual)
}
