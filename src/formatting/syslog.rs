//! Syslog RFC 5424 formatter.

use super::{essential_fields, parse_event_date, value_to_string, EventFormatter};
use crate::core::Event;

/// APP-NAME written into every message.
pub const APP_NAME: &str = "audit-relay";

/// SD-ID of the structured data element.
pub const SD_ID: &str = "auditrelay@32473";

/// User-level messages.
const FACILITY_USER: u8 = 1;

const NILVALUE: &str = "-";

/// Longest MSGID RFC 5424 allows.
const MSGID_MAX_LEN: usize = 32;

/// Formats events as RFC 5424 lines:
/// `<PRI>1 TIMESTAMP HOSTNAME APP-NAME PROCID MSGID SD MSG`.
#[derive(Debug, Clone)]
pub struct Rfc5424Formatter {
    hostname: String,
}

impl Default for Rfc5424Formatter {
    fn default() -> Self {
        Self::new(super::local_hostname())
    }
}

impl Rfc5424Formatter {
    pub fn new(hostname: impl Into<String>) -> Self {
        let hostname = hostname.into();
        let hostname = if hostname.trim().is_empty() {
            "localhost".to_string()
        } else {
            hostname
        };
        Self { hostname }
    }

    /// Calculate PRI value (facility * 8 + severity).
    fn pri(&self, event: &Event) -> u8 {
        FACILITY_USER * 8 + event.syslog_severity()
    }

    fn structured_data(&self, event: &Event) -> String {
        let mut params = vec![
            ("level", event.level.clone()),
            ("logger", event.logger.clone()),
            ("initiator", event.initiator.clone()),
        ];
        params.extend(
            essential_fields(event)
                .into_iter()
                .map(|(key, value)| (key, value_to_string(value))),
        );

        let rendered: Vec<String> = params
            .iter()
            .map(|(key, value)| format!("{}=\"{}\"", key, escape_param_value(value)))
            .collect();

        format!("[{} {}]", SD_ID, rendered.join(" "))
    }
}

impl EventFormatter for Rfc5424Formatter {
    fn format(&self, event: &Event, formatted_message: &str) -> String {
        let timestamp = parse_event_date(&event.date).format("%Y-%m-%dT%H:%M:%SZ");
        let msgid = event
            .context
            .get("_message_key")
            .map(|key| sanitize_msgid(&value_to_string(key)))
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| NILVALUE.to_string());

        format!(
            "<{}>1 {} {} {} {} {} {} {}\n",
            self.pri(event),
            timestamp,
            self.hostname,
            APP_NAME,
            NILVALUE,
            msgid,
            self.structured_data(event),
            formatted_message
        )
    }
}

/// Keeps only printable US-ASCII without spaces, capped at 32 characters.
fn sanitize_msgid(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_graphic())
        .take(MSGID_MAX_LEN)
        .collect()
}

/// Escapes a PARAM-VALUE per RFC 5424 section 6.3.3.
///
/// Backslash is handled first so that the escapes added for `"` and `]`
/// are not escaped again.
pub(crate) fn escape_param_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(']', "\\]")
}
