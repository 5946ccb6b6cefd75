//! Core domain types for the forwarding pipeline.
//!
//! This module defines the normalized event record that flows through the
//! rules engine, the formatters and the destinations.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Context key/value mapping attached to an event.
pub type Context = Map<String, Value>;

/// Date layout used by the event store.
pub const EVENT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The eight RFC 5424 severities, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

impl Level {
    pub const ALL: [Level; 8] = [
        Level::Emergency,
        Level::Alert,
        Level::Critical,
        Level::Error,
        Level::Warning,
        Level::Notice,
        Level::Info,
        Level::Debug,
    ];

    /// Parses a level name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "emergency" => Some(Self::Emergency),
            "alert" => Some(Self::Alert),
            "critical" => Some(Self::Critical),
            "error" => Some(Self::Error),
            "warning" => Some(Self::Warning),
            "notice" => Some(Self::Notice),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emergency => "emergency",
            Self::Alert => "alert",
            Self::Critical => "critical",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Notice => "notice",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }

    /// Syslog severity code (0 = emergency ... 7 = debug).
    pub fn syslog_severity(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque back-reference to the logger that produced an event.
///
/// Never serialized and never handed to a formatter.
#[derive(Clone)]
pub struct LoggerRef(Arc<dyn Any + Send + Sync>);

impl LoggerRef {
    pub fn new<T: Any + Send + Sync>(logger: T) -> Self {
        Self(Arc::new(logger))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for LoggerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LoggerRef(..)")
    }
}

/// A logged audit event, normalized for delivery.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Event {
    /// Store-assigned id, present once the event has been persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// UTC date as written by the store (`YYYY-MM-DD HH:MM:SS`).
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub logger: String,
    /// Raw level string. Unknown values are kept and treated as `info`.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub initiator: String,
    /// Message template with `{placeholder}` tokens.
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub context: Context,
    #[serde(skip)]
    pub logger_ref: Option<LoggerRef>,
}

fn default_level() -> String {
    Level::Info.as_str().to_string()
}

impl Event {
    /// The store-assigned id of a raw row, as a number or a numeric string.
    pub fn id_from_raw(data: &Map<String, Value>) -> Option<i64> {
        data.get("id").and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    /// Builds a normalized event from a raw stored row and its context.
    ///
    /// Missing dates default to the current UTC time and missing levels to
    /// `info`. Nothing here rejects an event.
    pub fn from_raw(context: Context, data: &Map<String, Value>, logger_ref: Option<LoggerRef>) -> Self {
        let id = Self::id_from_raw(data);

        let date = data
            .get("date")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Utc::now().format(EVENT_DATE_FORMAT).to_string());

        let level = data
            .get("level")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(default_level);

        Self {
            id,
            date,
            logger: string_field(data, "logger"),
            level,
            initiator: string_field(data, "initiator"),
            message: string_field(data, "message"),
            context,
            logger_ref,
        }
    }

    /// The parsed level, if the raw string is one of the eight known values.
    pub fn parsed_level(&self) -> Option<Level> {
        Level::parse(&self.level)
    }

    /// Syslog severity for this event. Unknown levels map to `info` (6).
    pub fn syslog_severity(&self) -> u8 {
        self.parsed_level()
            .unwrap_or(Level::Info)
            .syslog_severity()
    }

    /// Returns a context value by key.
    pub fn context_value(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    /// The message with `{key}` tokens replaced from the context.
    pub fn formatted_message(&self) -> String {
        interpolate(&self.message, &self.context)
    }
}

fn string_field(data: &Map<String, Value>, key: &str) -> String {
    match data.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Replaces every `{key}` token whose context value is a string or a number.
///
/// Tokens referring to missing or non-scalar values are left as written.
pub fn interpolate(template: &str, context: &Context) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find(|c| c == '{' || c == '}') {
            Some(close) if after.as_bytes()[close] == b'}' => {
                let key = &after[..close];
                match context.get(key) {
                    Some(Value::String(s)) => out.push_str(s),
                    Some(Value::Number(n)) => out.push_str(&n.to_string()),
                    _ => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            _ => {
                // Unterminated or nested brace: emit it literally and move on.
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// True when a JSON value counts as scalar (string, number or boolean).
pub fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}
