//! Startup wiring.
//!
//! Registration order is fixed: core rule types and destinations first, then
//! extension contributions, then the settings carried by the configuration.
//! The resulting registries are frozen behind `Arc` for request handling.

use crate::{
    config::Config,
    destination::{DestinationProvider, DestinationRegistry, FileDestination},
    dispatch::{DeliveryWorker, DispatchManager, MemoryDeliveryQueue},
    formatting::local_hostname,
    internal_metrics::Metrics,
    rules::{RuleSet, RuleType, RulesEngine},
    settings::{SettingsStore, ALERT_RULES_KEY},
};
use anyhow::{anyhow, bail, Context, Result};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Externally contributed variants, registered after the core ones.
#[derive(Default)]
pub struct Extensions {
    pub destinations: Vec<Box<dyn DestinationProvider>>,
    pub rule_types: Vec<Arc<dyn RuleType>>,
}

/// Everything the driver needs to process events.
pub struct Pipeline {
    pub manager: DispatchManager,
    pub worker: DeliveryWorker,
    pub registry: Arc<DestinationRegistry>,
    pub rules: Arc<RulesEngine>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("registry", &self.registry)
            .field("rule_types", &self.rules.rule_types().len())
            .finish_non_exhaustive()
    }
}

/// Builds the registries, applies configured settings and wires the
/// dispatch manager to an in-memory delivery queue.
pub fn build(config: &Config, store: Arc<dyn SettingsStore>, extensions: Extensions) -> Result<Pipeline> {
    let hostname = config.hostname.clone().unwrap_or_else(local_hostname);

    let mut rules = RulesEngine::with_core_rule_types();
    for rule_type in extensions.rule_types {
        let identifier = rule_type.identifier().to_string();
        if !rules.register_rule_type(rule_type) {
            warn!(rule_type = %identifier, "Duplicate rule type ignored");
        }
    }

    let mut registry = DestinationRegistry::new();
    registry
        .register(Arc::new(FileDestination::new(store.clone(), hostname.clone())))
        .context("Failed to register core destinations")?;

    for provider in &extensions.destinations {
        for destination in provider.destinations(store.clone()) {
            if let Err(e) = registry.register(destination) {
                warn!(error = %e, "Skipping contributed destination");
            }
        }
    }

    apply_destination_config(config, &registry, &rules)?;

    info!(
        destinations = registry.len(),
        enabled = registry.enabled().len(),
        rule_types = rules.rule_types().len(),
        hostname = %hostname,
        "Pipeline ready"
    );

    let registry = Arc::new(registry);
    let rules = Arc::new(rules);
    let metrics = Metrics::new();
    let (queue, rx) = MemoryDeliveryQueue::new();

    Ok(Pipeline {
        manager: DispatchManager::new(registry.clone(), rules.clone(), Arc::new(queue), metrics.clone()),
        worker: DeliveryWorker::new(registry.clone(), rx, metrics),
        registry,
        rules,
    })
}

/// Saves each `[destinations.<slug>]` table through the regular settings
/// path and installs its rule set.
fn apply_destination_config(config: &Config, registry: &DestinationRegistry, rules: &RulesEngine) -> Result<()> {
    for (slug, raw) in &config.destinations {
        let mut raw = raw.clone();
        let rule_set = match raw.remove(ALERT_RULES_KEY) {
            Some(value) => Some(
                serde_json::from_value::<RuleSet>(value)
                    .with_context(|| format!("Invalid alert_rules for destination '{}'", slug))?,
            ),
            None => None,
        };

        registry
            .save_settings(slug, &raw)
            .with_context(|| format!("Invalid settings for destination '{}'", slug))?;

        if let Some(rule_set) = rule_set {
            let validation = rules.validate_rules(&rule_set.rules);
            if !validation.valid {
                bail!(
                    "Invalid alert_rules for destination '{}': {}",
                    slug,
                    validation.errors.join("; ")
                );
            }
            registry
                .set_alert_rules(slug, &rule_set)
                .map_err(|e| anyhow!("Failed to store alert_rules for destination '{}': {}", slug, e))?;
        }
    }
    Ok(())
}
