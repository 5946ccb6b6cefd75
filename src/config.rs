//! Configuration management for audit-relay
//!
//! Layered with `figment`: serialized defaults, then the TOML file, then
//! `AUDIT_RELAY_` environment variables, then command-line arguments.

use crate::cli::Cli;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Default configuration file, used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "audit-relay.toml";

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    /// Site hostname for formatted output. Falls back to the machine name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Raw settings keyed by destination slug.
    ///
    /// An optional `alert_rules` table inside each entry holds the rule set.
    #[serde(default)]
    pub destinations: BTreeMap<String, Map<String, Value>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            hostname: None,
            destinations: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Loads the configuration, with `cli` taking precedence over everything.
    pub fn load(cli: &Cli) -> Result<Self> {
        let path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let config: Config = Self::figment(path).merge(cli.clone()).extract()?;
        Ok(config)
    }

    fn figment(path: PathBuf) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            // e.g. AUDIT_RELAY_DESTINATIONS__FILE__PATH=/var/log/audit.log
            .merge(Env::prefixed("AUDIT_RELAY_").split("__"))
    }
}
