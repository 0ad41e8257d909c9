//! `clocks` environment initializer
//!
//! Pins the time the application under test should observe. The instant is
//! validated when the suite is resolved so a typo fails before any test runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::EnvironmentInitializer;
use crate::common::{parse_time, Error, Result, Value, TIME_LAYOUT};

#[derive(Debug, Clone)]
pub struct ClocksInitializer {
    time: DateTime<Utc>,
}

impl ClocksInitializer {
    pub fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }

    /// Params must be a non-empty timestamp string in the fixed layout
    pub fn from_params(params: &Value) -> Result<Self> {
        let raw = params
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Config(format!("clocks param should be non-empty string, got {}", params)))?;
        let time = parse_time(raw).ok_or_else(|| {
            Error::Config(format!(
                "clocks param '{}' does not match layout {}",
                raw, TIME_LAYOUT
            ))
        })?;
        Ok(Self::new(time))
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }
}

#[async_trait]
impl EnvironmentInitializer for ClocksInitializer {
    async fn init_environment(&self) -> Result<()> {
        tracing::debug!(fake_time = %self.time.format(TIME_LAYOUT), "Clocks pinned");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_params() {
        let init = ClocksInitializer::from_params(&Value::from("2020-01-01T10:00:00Z")).unwrap();
        assert_eq!(init.time().format(TIME_LAYOUT).to_string(), "2020-01-01T10:00:00Z");
    }

    #[test]
    fn test_from_params_rejects_bad_values() {
        assert!(ClocksInitializer::from_params(&Value::from("")).is_err());
        assert!(ClocksInitializer::from_params(&Value::Integer(1)).is_err());
        assert!(ClocksInitializer::from_params(&Value::from("yesterday")).is_err());
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let init = ClocksInitializer::from_params(&Value::from("2020-01-01T10:00:00Z")).unwrap();
        init.init_environment().await.unwrap();
        init.init_environment().await.unwrap();
    }
}
