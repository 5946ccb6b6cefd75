#![allow(dead_code)]
use async_trait::async_trait;
use audit_relay::core::Event;
use audit_relay::destination::Destination;
use audit_relay::error::SettingsError;
use audit_relay::rules::RuleSet;
use audit_relay::settings::{FieldDescriptor, FieldKind, SettingsHandle, SettingsStore};
use serde_json::json;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

/// How a mock destination reacts to `send_event`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    ReturnFalse,
    Panic,
}

/// A mock Destination that records every message it is asked to send.
#[derive(Debug)]
pub struct RecordingDestination {
    slug: &'static str,
    settings: SettingsHandle,
    behavior: Behavior,
    supports_async: bool,
    pub calls: AtomicUsize,
    pub messages: Mutex<Vec<String>>,
}

impl RecordingDestination {
    pub fn new(slug: &'static str, store: Arc<dyn SettingsStore>) -> Self {
        Self {
            slug,
            settings: SettingsHandle::new(slug, store),
            behavior: Behavior::Succeed,
            supports_async: false,
            calls: AtomicUsize::new(0),
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn deferred(mut self) -> Self {
        self.supports_async = true;
        self
    }

    /// Marks the destination enabled without going through field validation.
    pub fn enabled(self) -> Self {
        self.settings.put("enabled", json!(true)).unwrap();
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Destination for RecordingDestination {
    fn slug(&self) -> &str {
        self.slug
    }

    fn name(&self) -> &str {
        "Recording mock"
    }

    fn description(&self) -> &str {
        "Records messages in memory"
    }

    fn supports_async(&self) -> bool {
        self.supports_async
    }

    fn custom_fields(&self) -> Vec<FieldDescriptor> {
        vec![FieldDescriptor::new("endpoint", "Endpoint", FieldKind::Url)]
    }

    fn settings_handle(&self) -> &SettingsHandle {
        &self.settings
    }

    async fn send_event(&self, _event: &Event, formatted_message: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Succeed => {
                self.messages.lock().unwrap().push(formatted_message.to_string());
                true
            }
            Behavior::ReturnFalse => false,
            Behavior::Panic => panic!("{} exploded", self.slug),
        }
    }
}

/// Which part of the destination contract blows up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    /// `custom_fields` panics, so every settings read does too.
    Fields,
    /// `get_alert_rules` panics while the event is being filtered.
    AlertRules,
}

/// An enabled destination that panics outside `send_event`.
#[derive(Debug)]
pub struct FaultyDestination {
    slug: &'static str,
    settings: SettingsHandle,
    fault: Fault,
    pub calls: AtomicUsize,
}

impl FaultyDestination {
    pub fn new(slug: &'static str, store: Arc<dyn SettingsStore>, fault: Fault) -> Self {
        let settings = SettingsHandle::new(slug, store);
        settings.put("enabled", json!(true)).unwrap();
        Self {
            slug,
            settings,
            fault,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Destination for FaultyDestination {
    fn slug(&self) -> &str {
        self.slug
    }

    fn name(&self) -> &str {
        "Faulty mock"
    }

    fn description(&self) -> &str {
        "Panics outside of delivery"
    }

    fn custom_fields(&self) -> Vec<FieldDescriptor> {
        if self.fault == Fault::Fields {
            panic!("{} has no fields", self.slug);
        }
        Vec::new()
    }

    fn settings_handle(&self) -> &SettingsHandle {
        &self.settings
    }

    fn get_alert_rules(&self) -> Result<RuleSet, SettingsError> {
        if self.fault == Fault::AlertRules {
            panic!("{} lost its rules", self.slug);
        }
        Ok(RuleSet::default())
    }

    async fn send_event(&self, _event: &Event, _formatted_message: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        true
    }
}
