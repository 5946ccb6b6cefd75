//! GELF 1.1 formatter producing one JSON object per line.

use super::{essential_fields, parse_event_date, value_to_string, EventFormatter};
use crate::core::Event;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

/// Formats events as GELF-compatible JSON Lines.
#[derive(Debug, Clone)]
pub struct GelfFormatter {
    hostname: String,
}

impl Default for GelfFormatter {
    fn default() -> Self {
        Self::new(super::local_hostname())
    }
}

impl GelfFormatter {
    pub fn new(hostname: impl Into<String>) -> Self {
        let hostname = hostname.into();
        let hostname = if hostname.trim().is_empty() {
            "localhost".to_string()
        } else {
            hostname
        };
        Self { hostname }
    }
}

/// GELF payload. Field order matches the wire layout.
#[derive(Debug, Serialize)]
struct GelfMessage<'a> {
    version: &'static str,
    host: &'a str,
    short_message: &'a str,
    timestamp: f64,
    level: u8,
    #[serde(rename = "_logger")]
    logger: &'a str,
    #[serde(rename = "_initiator")]
    initiator: &'a str,
    #[serde(flatten)]
    extra: IndexMap<String, Value>,
}

impl EventFormatter for GelfFormatter {
    fn format(&self, event: &Event, formatted_message: &str) -> String {
        let date = parse_event_date(&event.date);
        let timestamp = date.timestamp() as f64 + f64::from(date.timestamp_subsec_millis()) / 1000.0;

        let extra = essential_fields(event)
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(_) | Value::Number(_) => value.clone(),
                    other => Value::String(value_to_string(other)),
                };
                (format!("_{}", key), value)
            })
            .collect();

        let message = GelfMessage {
            version: "1.1",
            host: &self.hostname,
            short_message: formatted_message,
            timestamp,
            level: event.syslog_severity(),
            logger: &event.logger,
            initiator: &event.initiator,
            extra,
        };

        // serde_json leaves `/` and non-ASCII characters unescaped.
        match serde_json::to_string(&message) {
            Ok(json) => format!("{}\n", json),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode GELF message");
                format!(
                    "{{\"version\":\"1.1\",\"host\":{},\"short_message\":{},\"level\":{}}}\n",
                    Value::String(self.hostname.clone()),
                    Value::String(formatted_message.to_string()),
                    event.syslog_severity()
                )
            }
        }
    }
}
