//! Fan-out of logged events to the registered destinations.
//!
//! `DispatchManager` walks each enabled destination in registration order,
//! asks it whether it wants the event, and then either hands the delivery to a
//! `DeliveryQueue` or sends it inline. Every destination is isolated from the
//! others: a destination that reports failure, errors out while filtering, or
//! panics while sending is logged and counted, and the loop moves on.

use crate::core::{Context, Event, LoggerRef};
use crate::destination::{Destination, DestinationRegistry};
use crate::error::QueueError;
use crate::internal_metrics::{DeliveryOutcome, Metrics};
use crate::rules::{panic_message, RulesEngine};
use futures::FutureExt;
use serde_json::{Map, Value};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// A delivery deferred to the background worker.
#[derive(Debug, Clone)]
pub struct QueuedDelivery {
    pub destination: String,
    pub event: Event,
    pub formatted_message: String,
}

/// Accepts deferred deliveries.
pub trait DeliveryQueue: Send + Sync {
    fn enqueue(&self, delivery: QueuedDelivery) -> Result<(), QueueError>;
}

/// In-process queue backed by an unbounded channel.
#[derive(Debug, Clone)]
pub struct MemoryDeliveryQueue {
    tx: mpsc::UnboundedSender<QueuedDelivery>,
}

impl MemoryDeliveryQueue {
    /// Returns the queue and the receiving half for a `DeliveryWorker`.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<QueuedDelivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DeliveryQueue for MemoryDeliveryQueue {
    fn enqueue(&self, delivery: QueuedDelivery) -> Result<(), QueueError> {
        self.tx.send(delivery).map_err(|_| QueueError::Closed)
    }
}

/// What happened to one event, per destination slug.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub event_id: Option<i64>,
    pub delivered: Vec<String>,
    pub queued: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

impl DispatchReport {
    /// True when no destination was attempted at all.
    pub fn is_noop(&self) -> bool {
        self.delivered.is_empty() && self.queued.is_empty() && self.skipped.is_empty() && self.failed.is_empty()
    }
}

/// Sends one event to one destination, turning a `false` return or a panic
/// into an error string.
pub(crate) async fn guarded_send(
    destination: &dyn Destination,
    event: &Event,
    formatted_message: &str,
) -> Result<(), String> {
    match AssertUnwindSafe(destination.send_event(event, formatted_message))
        .catch_unwind()
        .await
    {
        Ok(true) => Ok(()),
        Ok(false) => Err("destination reported failure".to_string()),
        Err(panic) => Err(format!("destination panicked: {}", panic_message(panic.as_ref()))),
    }
}

/// Routes logged events to destinations.
pub struct DispatchManager {
    registry: Arc<DestinationRegistry>,
    rules: Arc<RulesEngine>,
    queue: Arc<dyn DeliveryQueue>,
    metrics: Metrics,
}

impl std::fmt::Debug for DispatchManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchManager")
            .field("destinations", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl DispatchManager {
    pub fn new(
        registry: Arc<DestinationRegistry>,
        rules: Arc<RulesEngine>,
        queue: Arc<dyn DeliveryQueue>,
        metrics: Metrics,
    ) -> Self {
        Self {
            registry,
            rules,
            queue,
            metrics,
        }
    }

    pub fn registry(&self) -> &Arc<DestinationRegistry> {
        &self.registry
    }

    pub fn rules(&self) -> &Arc<RulesEngine> {
        &self.rules
    }

    /// Entry point for the logging system's "event logged" notification.
    ///
    /// Returns immediately when no destination is enabled. Otherwise builds the
    /// `Event` from `context` and `data` and dispatches it. Never fails.
    pub async fn process_logged_event(
        &self,
        context: Context,
        data: &Map<String, Value>,
        logger_ref: Option<LoggerRef>,
    ) -> DispatchReport {
        let enabled = self.registry.enabled();
        if enabled.is_empty() {
            debug!("No enabled destinations, skipping event");
            return DispatchReport {
                event_id: Event::id_from_raw(data),
                ..Default::default()
            };
        }

        let event = Event::from_raw(context, data, logger_ref);
        self.dispatch_to(&enabled, &event).await
    }

    /// Dispatches an already-built event to every enabled destination.
    pub async fn dispatch(&self, event: &Event) -> DispatchReport {
        let enabled = self.registry.enabled();
        if enabled.is_empty() {
            return DispatchReport {
                event_id: event.id,
                ..Default::default()
            };
        }
        self.dispatch_to(&enabled, event).await
    }

    /// Whether a delivery should be deferred to the queue.
    ///
    /// Destinations that support deferred delivery always use it.
    pub fn use_async_for(&self, destination: &dyn Destination) -> bool {
        destination.supports_async()
    }

    async fn dispatch_to(&self, destinations: &[Arc<dyn Destination>], event: &Event) -> DispatchReport {
        self.metrics.events_processed_total.increment(1);

        let mut report = DispatchReport {
            event_id: event.id,
            ..Default::default()
        };
        let mut formatted: Option<String> = None;

        for destination in destinations {
            let slug = destination.slug().to_string();

            let wants = catch_unwind(AssertUnwindSafe(|| {
                destination.should_send_event(event, &self.rules)
            }));
            match wants {
                Ok(true) => {}
                Ok(false) => {
                    debug!(destination = %slug, "Event filtered out");
                    self.metrics.increment_skipped(&slug);
                    report.skipped.push(slug);
                    continue;
                }
                Err(panic) => {
                    error!(destination = %slug, error = %panic_message(panic.as_ref()), "Filtering panicked");
                    self.metrics.increment_delivery(&slug, DeliveryOutcome::Failed);
                    report.failed.push(slug);
                    continue;
                }
            }

            let message = formatted.get_or_insert_with(|| event.formatted_message()).clone();

            if self.use_async_for(destination.as_ref()) {
                let delivery = QueuedDelivery {
                    destination: slug.clone(),
                    event: event.clone(),
                    formatted_message: message,
                };
                match self.queue.enqueue(delivery) {
                    Ok(()) => {
                        debug!(destination = %slug, "Delivery queued");
                        self.metrics.increment_delivery(&slug, DeliveryOutcome::Queued);
                        report.queued.push(slug);
                    }
                    Err(e) => {
                        error!(destination = %slug, error = %e, "Failed to queue delivery");
                        self.metrics.increment_delivery(&slug, DeliveryOutcome::Failed);
                        report.failed.push(slug);
                    }
                }
                continue;
            }

            match guarded_send(destination.as_ref(), event, &message).await {
                Ok(()) => {
                    debug!(destination = %slug, "Event delivered");
                    self.metrics.increment_delivery(&slug, DeliveryOutcome::Delivered);
                    report.delivered.push(slug);
                }
                Err(e) => {
                    error!(destination = %slug, error = %e, "Failed to deliver event");
                    self.metrics.increment_delivery(&slug, DeliveryOutcome::Failed);
                    report.failed.push(slug);
                }
            }
        }

        report
    }
}

/// Drains queued deliveries and sends them to their destinations.
pub struct DeliveryWorker {
    registry: Arc<DestinationRegistry>,
    rx: mpsc::UnboundedReceiver<QueuedDelivery>,
    metrics: Metrics,
}

impl DeliveryWorker {
    pub fn new(
        registry: Arc<DestinationRegistry>,
        rx: mpsc::UnboundedReceiver<QueuedDelivery>,
        metrics: Metrics,
    ) -> Self {
        Self { registry, rx, metrics }
    }

    /// Sends everything currently in the queue and returns how many
    /// deliveries succeeded.
    pub async fn run_pending(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(delivery) = self.rx.try_recv() {
            if self.deliver(delivery).await {
                delivered += 1;
            }
        }
        delivered
    }

    /// Runs until the shutdown signal fires or every queue handle is dropped.
    /// Whatever is still queued at shutdown is sent before returning.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Delivery worker received shutdown signal.");
                    let drained = self.run_pending().await;
                    debug!(delivered = drained, "Drained pending deliveries");
                    break;
                }
                delivery = self.rx.recv() => {
                    match delivery {
                        Some(delivery) => {
                            self.deliver(delivery).await;
                        }
                        None => {
                            info!("Delivery queue closed. Shutting down worker.");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn deliver(&self, delivery: QueuedDelivery) -> bool {
        let slug = delivery.destination;
        let Some(destination) = self.registry.get(&slug) else {
            warn!(destination = %slug, "Queued delivery for unknown destination dropped");
            self.metrics.increment_delivery(&slug, DeliveryOutcome::Failed);
            return false;
        };

        match guarded_send(destination.as_ref(), &delivery.event, &delivery.formatted_message).await {
            Ok(()) => {
                debug!(destination = %slug, "Queued event delivered");
                self.metrics.increment_delivery(&slug, DeliveryOutcome::Delivered);
                true
            }
            Err(e) => {
                error!(destination = %slug, error = %e, "Failed to deliver queued event");
                self.metrics.increment_delivery(&slug, DeliveryOutcome::Failed);
                false
            }
        }
    }
}
