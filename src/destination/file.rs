//! Local log file destination.
//!
//! Appends one RFC 5424 or GELF line per event to a file, creating parent
//! directories as needed.

use super::Destination;
use crate::core::Event;
use crate::formatting::{create_formatter, WireFormat};
use crate::settings::{FieldDescriptor, FieldKind, SettingsHandle, SettingsStore};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

pub const SLUG: &str = "file";

/// Writes formatted events to a local file.
#[derive(Debug)]
pub struct FileDestination {
    settings: SettingsHandle,
    hostname: String,
}

impl FileDestination {
    /// `hostname` is the site hostname written into each line.
    pub fn new(store: Arc<dyn SettingsStore>, hostname: impl Into<String>) -> Self {
        Self {
            settings: SettingsHandle::new(SLUG, store),
            hostname: hostname.into(),
        }
    }

    fn configured_path(&self) -> Option<PathBuf> {
        match self.get_settings().get("path") {
            Some(Value::String(path)) if !path.trim().is_empty() => Some(PathBuf::from(path.trim())),
            _ => None,
        }
    }

    fn configured_format(&self) -> WireFormat {
        self.get_settings()
            .get("format")
            .and_then(Value::as_str)
            .and_then(WireFormat::parse)
            .unwrap_or_default()
    }

    async fn append(&self, path: &PathBuf, line: &str) -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

#[async_trait]
impl Destination for FileDestination {
    fn slug(&self) -> &str {
        SLUG
    }

    fn name(&self) -> &str {
        "Log file"
    }

    fn description(&self) -> &str {
        "Append events to a local file as syslog (RFC 5424) or GELF JSON lines"
    }

    fn custom_fields(&self) -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::new("path", "Log file path", FieldKind::Text)
                .description("Absolute path of the file to append to")
                .required(),
            FieldDescriptor::new(
                "format",
                "Format",
                FieldKind::Select {
                    options: vec![
                        (WireFormat::Rfc5424.as_str().to_string(), "Syslog (RFC 5424)".to_string()),
                        (WireFormat::Gelf.as_str().to_string(), "GELF JSON lines".to_string()),
                    ],
                },
            )
            .default_value(WireFormat::Rfc5424.as_str()),
        ]
    }

    fn settings_handle(&self) -> &SettingsHandle {
        &self.settings
    }

    async fn send_event(&self, event: &Event, formatted_message: &str) -> bool {
        let Some(path) = self.configured_path() else {
            error!(destination = SLUG, "No log file path configured");
            return false;
        };

        let line = create_formatter(self.configured_format(), &self.hostname)
            .format(event, formatted_message);

        match self.append(&path, &line).await {
            Ok(()) => {
                debug!(destination = SLUG, path = %path.display(), "Wrote event");
                true
            }
            Err(e) => {
                error!(destination = SLUG, path = %path.display(), error = %e, "Failed to write event");
                false
            }
        }
    }
}
