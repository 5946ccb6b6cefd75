//! audit-relay - forwards audit log events to external destinations
//!
//! Each logged event is checked against every enabled destination's alert
//! rules, rendered as RFC 5424 syslog or GELF, and delivered inline or
//! through the delivery queue.

pub mod cli;
pub mod config;
pub mod core;
pub mod destination;
pub mod dispatch;
pub mod error;
pub mod formatting;
pub mod internal_metrics;
pub mod rules;
pub mod services;
pub mod settings;

// Re-export core types for convenience
pub use crate::core::{Context, Event, Level, LoggerRef};
pub use destination::{Destination, DestinationProvider, DestinationRegistry};
pub use dispatch::{DeliveryWorker, DispatchManager, DispatchReport};
pub use rules::{Operator, RuleSet, RuleType, RulesEngine};
