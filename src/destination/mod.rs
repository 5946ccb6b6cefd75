//! Destinations: configured external sinks for forwarded events.
//!
//! A destination declares its settings fields and knows how to accept an
//! already interpolated message. Enablement, stored settings and the alert
//! rule set are provided by the trait's default methods on top of a
//! [`SettingsHandle`].

pub mod file;

pub use file::FileDestination;

use crate::core::Event;
use crate::error::{RegistryError, SettingsError};
use crate::rules::{panic_message, RuleSet, RulesEngine};
use crate::settings::{
    enabled_field, is_empty, FieldDescriptor, Settings, SettingsHandle, SettingsStore,
    ALERT_RULES_KEY, ENABLED_KEY,
};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// An external sink for audit events.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Unique, stable identifier.
    fn slug(&self) -> &str;

    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Whether deliveries may be deferred to the delivery queue.
    fn supports_async(&self) -> bool {
        false
    }

    /// Destination-specific fields, declared after the shared `enabled` flag.
    fn custom_fields(&self) -> Vec<FieldDescriptor> {
        Vec::new()
    }

    fn settings_handle(&self) -> &SettingsHandle;

    /// Delivers one event. Failures are reported as `false`, never raised.
    async fn send_event(&self, event: &Event, formatted_message: &str) -> bool;

    /// All declared fields: `enabled` followed by [`Destination::custom_fields`].
    fn settings_fields(&self) -> Vec<FieldDescriptor> {
        let mut fields = vec![enabled_field()];
        fields.extend(self.custom_fields());
        fields
    }

    /// Declared defaults merged with the persisted values.
    fn get_settings(&self) -> Settings {
        self.settings_handle().load(&self.settings_fields())
    }

    /// Validates every declared field and persists only if all pass.
    fn save_settings(&self, raw: &Settings) -> Result<Settings, SettingsError> {
        let saved = self.settings_handle().save(&self.settings_fields(), raw)?;
        debug!(destination = %self.slug(), "Saved destination settings");
        Ok(saved)
    }

    fn is_enabled(&self) -> bool {
        self.get_settings()
            .get(ENABLED_KEY)
            .is_some_and(|v| !is_empty(v))
    }

    /// The stored rule set. An absent payload is the empty set.
    fn get_alert_rules(&self) -> Result<RuleSet, SettingsError> {
        match self.settings_handle().stored().and_then(|s| s.get(ALERT_RULES_KEY).cloned()) {
            None => Ok(RuleSet::default()),
            Some(value) => serde_json::from_value(value).map_err(|e| {
                SettingsError::Store(format!("stored alert rules are malformed: {}", e))
            }),
        }
    }

    fn set_alert_rules(&self, rules: &RuleSet) -> Result<(), SettingsError> {
        let value = serde_json::to_value(rules)
            .map_err(|e| SettingsError::Store(format!("failed to encode alert rules: {}", e)))?;
        self.settings_handle().put(ALERT_RULES_KEY, value)
    }

    /// Disabled destinations never receive events; enabled ones defer to
    /// the rules engine with their stored rule set.
    fn should_send_event(&self, event: &Event, engine: &RulesEngine) -> bool {
        if !self.is_enabled() {
            return false;
        }
        match self.get_alert_rules() {
            Ok(rule_set) => engine.evaluate_rule_set(&rule_set, event),
            Err(e) => {
                warn!(destination = %self.slug(), error = %e, "Unreadable alert rules, not sending");
                false
            }
        }
    }
}

/// Contributes destinations from outside the core set.
pub trait DestinationProvider: Send + Sync {
    fn destinations(&self, store: Arc<dyn SettingsStore>) -> Vec<Arc<dyn Destination>>;
}

/// What a configuration surface needs to render one destination.
#[derive(Debug, Clone, Serialize)]
pub struct DestinationSummary {
    pub slug: String,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub supports_async: bool,
    pub fields: Vec<FieldDescriptor>,
}

type RegistrationHook = Box<dyn Fn(&dyn Destination) + Send + Sync>;

/// Destinations keyed by slug, kept in registration order.
#[derive(Default)]
pub struct DestinationRegistry {
    destinations: Vec<Arc<dyn Destination>>,
    hooks: Vec<RegistrationHook>,
}

impl fmt::Debug for DestinationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slugs: Vec<&str> = self.destinations.iter().map(|d| d.slug()).collect();
        f.debug_struct("DestinationRegistry")
            .field("destinations", &slugs)
            .finish_non_exhaustive()
    }
}

impl DestinationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a callback invoked after each successful registration.
    pub fn on_registered<F>(&mut self, hook: F)
    where
        F: Fn(&dyn Destination) + Send + Sync + 'static,
    {
        self.hooks.push(Box::new(hook));
    }

    /// Registers a destination. A taken slug is rejected and the existing
    /// registration is left untouched.
    pub fn register(&mut self, destination: Arc<dyn Destination>) -> Result<(), RegistryError> {
        if self.get(destination.slug()).is_some() {
            return Err(RegistryError::DuplicateDestination(destination.slug().to_string()));
        }
        debug!(destination = %destination.slug(), "Registered destination");
        for hook in &self.hooks {
            hook(destination.as_ref());
        }
        self.destinations.push(destination);
        Ok(())
    }

    pub fn get(&self, slug: &str) -> Option<&Arc<dyn Destination>> {
        self.destinations.iter().find(|d| d.slug() == slug)
    }

    fn require(&self, slug: &str) -> Result<&Arc<dyn Destination>, RegistryError> {
        self.get(slug)
            .ok_or_else(|| RegistryError::UnknownDestination(slug.to_string()))
    }

    /// All destinations in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Destination>> {
        self.destinations.iter()
    }

    /// Enabled destinations in registration order. A destination that panics
    /// while reporting its state is logged and left out.
    pub fn enabled(&self) -> Vec<Arc<dyn Destination>> {
        self.destinations
            .iter()
            .filter(|d| guarded_is_enabled(d.as_ref()))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    pub fn summaries(&self) -> Vec<DestinationSummary> {
        self.destinations
            .iter()
            .map(|d| DestinationSummary {
                slug: d.slug().to_string(),
                name: d.name().to_string(),
                description: d.description().to_string(),
                enabled: guarded_is_enabled(d.as_ref()),
                supports_async: d.supports_async(),
                fields: d.settings_fields(),
            })
            .collect()
    }

    pub fn save_settings(&self, slug: &str, raw: &Settings) -> Result<Settings, SettingsError> {
        self.require(slug)?.save_settings(raw)
    }

    pub fn get_settings(&self, slug: &str) -> Result<Settings, RegistryError> {
        Ok(self.require(slug)?.get_settings())
    }

    pub fn get_alert_rules(&self, slug: &str) -> Result<RuleSet, SettingsError> {
        self.require(slug)?.get_alert_rules()
    }

    pub fn set_alert_rules(&self, slug: &str, rules: &RuleSet) -> Result<(), SettingsError> {
        self.require(slug)?.set_alert_rules(rules)
    }
}

fn guarded_is_enabled(destination: &dyn Destination) -> bool {
    match catch_unwind(AssertUnwindSafe(|| destination.is_enabled())) {
        Ok(enabled) => enabled,
        Err(panic) => {
            error!(
                destination = %destination.slug(),
                error = %panic_message(panic.as_ref()),
                "Enablement check panicked, treating destination as disabled"
            );
            false
        }
    }
}
