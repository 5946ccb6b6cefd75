//! Command-Line Interface (CLI) argument parsing.
//!
//! The arguments are parsed at startup and merged, with the highest priority,
//! over the `audit-relay.toml` file and environment variables.

use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Forwards audit log events to syslog and GELF destinations.
#[derive(Parser, Debug, Default, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Site hostname written into formatted events.
    #[arg(long, value_name = "HOST")]
    pub hostname: Option<String>,

    /// Read newline-delimited JSON events from this file instead of stdin.
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        if let Some(hostname) = &self.hostname {
            dict.insert("hostname".into(), Value::from(hostname.clone()));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
