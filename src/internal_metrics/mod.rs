//! # Internal Metrics Module
//!
//! Counters for the dispatch pipeline, recorded through the `metrics` facade.
//! No exporter is installed by this crate; the embedding application decides
//! where the numbers go by installing a recorder.

use metrics::{Counter, Unit};

/// Label values for `deliveries_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Queued,
    Failed,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered => "delivered",
            DeliveryOutcome::Queued => "queued",
            DeliveryOutcome::Failed => "failed",
        }
    }
}

/// The public API for the metrics system.
///
/// Cloneable handles bound to whichever recorder was active at construction.
#[derive(Clone)]
pub struct Metrics {
    pub events_processed_total: Counter,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Registers descriptions for all pipeline metrics and returns handles.
    pub fn new() -> Self {
        metrics::describe_counter!("events_processed_total", Unit::Count, "Total number of logged events handed to the dispatch manager.");
        metrics::describe_counter!("deliveries_total", Unit::Count, "Delivery attempts per destination, labeled by outcome.");
        metrics::describe_counter!("deliveries_skipped_total", Unit::Count, "Events a destination declined because it was disabled or its alert rules did not match.");
        metrics::describe_counter!("rule_evaluation_failures_total", Unit::Count, "Rule evaluations that errored or panicked, labeled by rule type.");

        Self {
            events_processed_total: metrics::counter!("events_processed_total"),
        }
    }

    pub fn increment_delivery(&self, destination: &str, outcome: DeliveryOutcome) {
        metrics::counter!(
            "deliveries_total",
            "destination" => destination.to_string(),
            "outcome" => outcome.as_str()
        )
        .increment(1);
    }

    pub fn increment_skipped(&self, destination: &str) {
        metrics::counter!("deliveries_skipped_total", "destination" => destination.to_string()).increment(1);
    }
}
