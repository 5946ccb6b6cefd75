#[path = "../helpers/mod.rs"]
mod helpers;

use audit_relay::destination::Destination;
use audit_relay::rules::{Operator, RuleSet, RulesEngine};
use audit_relay::settings::{MemorySettingsStore, SettingsStore};
use audit_relay::destination::DestinationRegistry;
use audit_relay::dispatch::{DispatchManager, MemoryDeliveryQueue};
use audit_relay::internal_metrics::Metrics;
use helpers::mock_destination::{Behavior, Fault, FaultyDestination, RecordingDestination};
use helpers::test_metrics::TestMetrics;
use helpers::{object, pipeline, rule};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;

fn store() -> Arc<dyn SettingsStore> {
    Arc::new(MemorySettingsStore::new())
}

fn raw_event() -> (serde_json::Map<String, serde_json::Value>, serde_json::Map<String, serde_json::Value>) {
    let context = object(json!({"_message_key": "user_logged_in", "user": "ann"}));
    let data = object(json!({
        "id": 12,
        "logger": "SimpleUserLogger",
        "level": "info",
        "initiator": "wp_user",
        "message": "Logged in as {user}",
    }));
    (context, data)
}

#[tokio::test]
async fn panicking_destination_does_not_block_the_next_one() {
    let store = store();
    let first = Arc::new(RecordingDestination::new("first", store.clone()).with_behavior(Behavior::Panic).enabled());
    let second = Arc::new(RecordingDestination::new("second", store.clone()).enabled());
    let (manager, _worker, _registry) = pipeline(
        vec![first.clone(), second.clone()],
        RulesEngine::with_core_rule_types(),
    );

    let (context, data) = raw_event();
    let report = manager.process_logged_event(context, &data, None).await;

    assert_eq!(first.call_count(), 1);
    assert_eq!(second.messages(), vec!["Logged in as ann"]);
    assert_eq!(report.failed, vec!["first"]);
    assert_eq!(report.delivered, vec!["second"]);
    assert_eq!(report.event_id, Some(12));
}

fn manager_over(destinations: Vec<Arc<dyn Destination>>) -> DispatchManager {
    let mut registry = DestinationRegistry::new();
    for destination in destinations {
        registry.register(destination).unwrap();
    }
    let (queue, _rx) = MemoryDeliveryQueue::new();
    DispatchManager::new(
        Arc::new(registry),
        Arc::new(RulesEngine::with_core_rule_types()),
        Arc::new(queue),
        Metrics::new(),
    )
}

#[tokio::test]
async fn panicking_settings_fields_do_not_block_the_next_one() {
    let store = store();
    let broken = Arc::new(FaultyDestination::new("broken", store.clone(), Fault::Fields));
    let good = Arc::new(RecordingDestination::new("good", store.clone()).enabled());
    let manager = manager_over(vec![broken.clone() as Arc<dyn Destination>, good.clone() as Arc<dyn Destination>]);

    let (context, data) = raw_event();
    let report = manager.process_logged_event(context, &data, None).await;

    assert_eq!(broken.call_count(), 0);
    assert_eq!(good.messages(), vec!["Logged in as ann"]);
    assert_eq!(report.delivered, vec!["good"]);
    assert!(report.failed.is_empty());
}

#[tokio::test]
async fn only_destination_panicking_on_settings_is_a_noop() {
    let broken = Arc::new(FaultyDestination::new("broken", store(), Fault::Fields));
    let manager = manager_over(vec![broken.clone() as Arc<dyn Destination>]);

    let (context, data) = raw_event();
    let report = manager.process_logged_event(context, &data, None).await;

    assert!(report.is_noop());
    assert_eq!(report.event_id, Some(12));
}

#[tokio::test]
async fn panicking_filter_counts_as_failed_and_moves_on() {
    let store = store();
    let broken = Arc::new(FaultyDestination::new("broken", store.clone(), Fault::AlertRules));
    let good = Arc::new(RecordingDestination::new("good", store.clone()).enabled());
    let manager = manager_over(vec![broken.clone() as Arc<dyn Destination>, good.clone() as Arc<dyn Destination>]);

    let (context, data) = raw_event();
    let report = manager.process_logged_event(context, &data, None).await;

    assert_eq!(report.failed, vec!["broken"]);
    assert_eq!(broken.call_count(), 0);
    assert_eq!(report.delivered, vec!["good"]);
    assert_eq!(good.call_count(), 1);
}

#[tokio::test]
async fn false_return_is_a_failure_not_an_abort() {
    let store = store();
    let first = Arc::new(RecordingDestination::new("first", store.clone()).with_behavior(Behavior::ReturnFalse).enabled());
    let second = Arc::new(RecordingDestination::new("second", store.clone()).enabled());
    let (manager, _worker, _registry) = pipeline(
        vec![first.clone(), second.clone()],
        RulesEngine::with_core_rule_types(),
    );

    let (context, data) = raw_event();
    let report = manager.process_logged_event(context, &data, None).await;

    assert_eq!(report.failed, vec!["first"]);
    assert_eq!(second.call_count(), 1);
}

#[tokio::test]
async fn destinations_are_filtered_by_their_own_rules() {
    let store = store();
    let errors_only = Arc::new(RecordingDestination::new("errors", store.clone()).enabled());
    let everything = Arc::new(RecordingDestination::new("all", store.clone()).enabled());
    let disabled = Arc::new(RecordingDestination::new("off", store.clone()));
    errors_only
        .set_alert_rules(&RuleSet::new(
            vec![rule(json!({"type": "level", "levels": ["error"]}))],
            Operator::And,
        ))
        .unwrap();

    let (manager, _worker, _registry) = pipeline(
        vec![errors_only.clone(), everything.clone(), disabled.clone()],
        RulesEngine::with_core_rule_types(),
    );

    let (context, data) = raw_event();
    let report = manager.process_logged_event(context, &data, None).await;

    assert_eq!(report.skipped, vec!["errors"]);
    assert_eq!(report.delivered, vec!["all"]);
    assert_eq!(errors_only.call_count(), 0);
    assert_eq!(disabled.call_count(), 0);
}

#[tokio::test]
async fn async_capable_destinations_are_queued_then_drained() {
    let store = store();
    let queued = Arc::new(RecordingDestination::new("queued", store.clone()).deferred().enabled());
    let inline = Arc::new(RecordingDestination::new("inline", store.clone()).enabled());
    let (manager, mut worker, _registry) = pipeline(
        vec![queued.clone(), inline.clone()],
        RulesEngine::with_core_rule_types(),
    );

    let (context, data) = raw_event();
    let report = manager.process_logged_event(context, &data, None).await;

    assert_eq!(report.queued, vec!["queued"]);
    assert_eq!(report.delivered, vec!["inline"]);
    assert_eq!(queued.call_count(), 0);

    assert_eq!(worker.run_pending().await, 1);
    assert_eq!(queued.messages(), vec!["Logged in as ann"]);
}

#[tokio::test]
async fn worker_survives_a_panicking_destination() {
    let store = store();
    let bad = Arc::new(RecordingDestination::new("bad", store.clone()).deferred().with_behavior(Behavior::Panic).enabled());
    let good = Arc::new(RecordingDestination::new("good", store.clone()).deferred().enabled());
    let (manager, worker, _registry) = pipeline(vec![bad.clone(), good.clone()], RulesEngine::with_core_rule_types());

    let (context, data) = raw_event();
    manager.process_logged_event(context, &data, None).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(worker.run(shutdown_rx));
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    assert_eq!(bad.call_count(), 1);
    assert_eq!(good.call_count(), 1);
}

#[tokio::test]
async fn no_enabled_destinations_is_a_noop() {
    let store = store();
    let off = Arc::new(RecordingDestination::new("off", store));
    let (manager, _worker, _registry) = pipeline(vec![off.clone()], RulesEngine::with_core_rule_types());

    let (context, data) = raw_event();
    let report = manager.process_logged_event(context, &data, None).await;

    assert!(report.is_noop());
    assert_eq!(off.call_count(), 0);
}

#[test]
fn delivery_outcomes_are_counted() {
    let metrics = TestMetrics::new();

    metrics::with_local_recorder(&metrics, || {
        tokio_test::block_on(async {
            let store = store();
            let ok = Arc::new(RecordingDestination::new("ok", store.clone()).enabled());
            let broken = Arc::new(RecordingDestination::new("broken", store.clone()).with_behavior(Behavior::ReturnFalse).enabled());
            let picky = Arc::new(RecordingDestination::new("picky", store.clone()).enabled());
            picky
                .set_alert_rules(&RuleSet::new(
                    vec![rule(json!({"type": "logger", "loggers": ["Other"]}))],
                    Operator::Or,
                ))
                .unwrap();
            let (manager, _worker, _registry) =
                pipeline(vec![ok, broken, picky], RulesEngine::with_core_rule_types());

            let (context, data) = raw_event();
            manager.process_logged_event(context, &data, None).await;
        })
    });

    assert_eq!(metrics.get_counter("events_processed_total"), 1);
    assert_eq!(metrics.get_counter("deliveries_total{destination=ok,outcome=delivered}"), 1);
    assert_eq!(metrics.get_counter("deliveries_total{destination=broken,outcome=failed}"), 1);
    assert_eq!(metrics.get_counter("deliveries_skipped_total{destination=picky}"), 1);
}
