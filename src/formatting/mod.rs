//! Wire formatters for forwarded events.
//!
//! Formatters are stateless: they take a normalized event plus its already
//! interpolated message and return one line for a given protocol.

mod gelf;
mod syslog;

pub use gelf::GelfFormatter;
pub use syslog::{Rfc5424Formatter, APP_NAME, SD_ID};

use crate::core::{is_scalar, Event, Level, EVENT_DATE_FORMAT};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Context keys forwarded to external systems, in output order.
pub const ESSENTIAL_FIELDS: [&str; 5] = [
    "_message_key",
    "_server_remote_addr",
    "_user_id",
    "_user_login",
    "_user_email",
];

/// A trait for rendering one event into a protocol line.
pub trait EventFormatter: Send + Sync {
    fn format(&self, event: &Event, formatted_message: &str) -> String;
}

/// The wire formats a destination can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    #[default]
    Rfc5424,
    Gelf,
}

impl WireFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rfc5424" | "syslog" => Some(Self::Rfc5424),
            "gelf" | "jsonl" => Some(Self::Gelf),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rfc5424 => "rfc5424",
            Self::Gelf => "gelf",
        }
    }
}

/// Create a formatter for the given wire format.
pub fn create_formatter(format: WireFormat, hostname: &str) -> Box<dyn EventFormatter> {
    match format {
        WireFormat::Rfc5424 => Box::new(Rfc5424Formatter::new(hostname)),
        WireFormat::Gelf => Box::new(GelfFormatter::new(hostname)),
    }
}

/// Maps a level name to its syslog severity, case-insensitively.
/// Unknown levels map to informational (6).
pub fn syslog_severity(level: &str) -> u8 {
    Level::parse(level).unwrap_or(Level::Info).syslog_severity()
}

/// Extracts the essential context fields that hold scalar values.
///
/// Keys are returned without their leading underscore, in declaration
/// order.
pub fn essential_fields(event: &Event) -> Vec<(&'static str, &Value)> {
    ESSENTIAL_FIELDS
        .iter()
        .filter_map(|key| {
            event
                .context
                .get(*key)
                .filter(|v| is_scalar(v))
                .map(|v| (key.trim_start_matches('_'), v))
        })
        .collect()
}

/// Renders a value as text for structured output.
///
/// Non-scalar values fall back to their JSON encoding.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Parses an event date as UTC. Falls back to the current time.
pub fn parse_event_date(date: &str) -> DateTime<Utc> {
    let date = date.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(date, EVENT_DATE_FORMAT) {
        return naive.and_utc();
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(date) {
        return parsed.with_timezone(&Utc);
    }
    tracing::debug!(date, "Unparsable event date, using current time");
    Utc::now()
}

/// The local hostname, or `localhost` when it cannot be resolved.
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
