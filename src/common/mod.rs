//! Common utilities shared by the loader, resolver and executor

pub mod error;
pub mod logging;
pub mod value;

pub use error::{Error, Result};
pub use value::Value;

/// Fixed timestamp layout used by configuration and time comparisons
pub const TIME_LAYOUT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Parse a timestamp written in [`TIME_LAYOUT`] as a UTC instant
pub fn parse_time(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::NaiveDateTime::parse_from_str(s, TIME_LAYOUT)
        .ok()
        .map(|naive| naive.and_utc())
}
