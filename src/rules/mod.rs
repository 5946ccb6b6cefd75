//! The alert rules engine.
//!
//! A destination carries an ordered list of rule configurations and an
//! operator. Each configuration names a pluggable [`RuleType`] through its
//! `type` key; the engine looks the type up, evaluates it, and combines the
//! results with AND/OR short-circuiting. Anything that goes wrong while
//! evaluating a rule counts as "no match".

pub mod types;

use crate::core::Event;
use crate::error::RuleError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// One rule configuration: a `type` key plus predicate-specific keys.
pub type RuleConfig = Map<String, Value>;

/// Description used when a destination has no rules.
pub const SEND_ALL_DESCRIPTION: &str = "Send all events";

/// Description used when none of the configured rules resolve to a type.
pub const NO_VALID_RULES_DESCRIPTION: &str = "No valid rules configured";

/// How the results of several rules are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Operator {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::And => "AND",
            Operator::Or => "OR",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered list of rules with the operator that combines them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
    #[serde(default)]
    pub operator: Operator,
}

impl RuleSet {
    pub fn new(rules: Vec<RuleConfig>, operator: Operator) -> Self {
        Self { rules, operator }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Outcome of validating one rule or a whole rule set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl RuleValidation {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// A pluggable rule predicate, registered under a stable identifier.
pub trait RuleType: Send + Sync {
    /// The identifier used in the `type` key of a rule configuration.
    fn identifier(&self) -> &str;

    /// Display name for admin surfaces.
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Evaluates the predicate. Errors are treated as "no match".
    fn evaluate(&self, event: &Event, config: &RuleConfig) -> Result<bool, RuleError>;

    /// Checks the predicate-specific keys of a configuration.
    fn validate_config(&self, config: &RuleConfig) -> RuleValidation;

    /// A human-readable sentence describing the configured rule.
    fn readable_description(&self, config: &RuleConfig) -> String;
}

/// Identifier, name and description of a registered rule type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleTypeInfo {
    pub identifier: String,
    pub name: String,
    pub description: String,
}

type RegistrationHook = Box<dyn Fn(&dyn RuleType) + Send + Sync>;

/// Combines rule evaluations and owns the rule-type registry.
///
/// Populate it once at startup: [`RulesEngine::with_core_rule_types`]
/// registers the built-in predicates, after which external types can be
/// added with [`RulesEngine::register_rule_type`].
#[derive(Default)]
pub struct RulesEngine {
    rule_types: BTreeMap<String, Arc<dyn RuleType>>,
    hooks: Vec<RegistrationHook>,
}

impl fmt::Debug for RulesEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RulesEngine")
            .field("rule_types", &self.rule_types.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl RulesEngine {
    /// Creates an engine with no rule types registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine with the built-in rule types registered.
    pub fn with_core_rule_types() -> Self {
        let mut engine = Self::new();
        for rule_type in types::core_rule_types() {
            engine.register_rule_type(rule_type);
        }
        engine
    }

    /// Adds a callback invoked after each successful registration.
    pub fn on_rule_type_registered<F>(&mut self, hook: F)
    where
        F: Fn(&dyn RuleType) + Send + Sync + 'static,
    {
        self.hooks.push(Box::new(hook));
    }

    /// Registers a rule type.
    ///
    /// Returns `false` and leaves the registry untouched when the
    /// identifier is already taken.
    pub fn register_rule_type(&mut self, rule_type: Arc<dyn RuleType>) -> bool {
        let identifier = rule_type.identifier().to_string();
        if self.rule_types.contains_key(&identifier) {
            warn!(rule_type = %identifier, "Rule type already registered, ignoring");
            return false;
        }

        self.rule_types.insert(identifier.clone(), rule_type.clone());
        debug!(rule_type = %identifier, "Registered rule type");
        for hook in &self.hooks {
            hook(rule_type.as_ref());
        }
        true
    }

    pub fn rule_type(&self, identifier: &str) -> Option<&Arc<dyn RuleType>> {
        self.rule_types.get(identifier)
    }

    /// Lists registered rule types in identifier order.
    pub fn rule_types(&self) -> Vec<RuleTypeInfo> {
        self.rule_types
            .values()
            .map(|t| RuleTypeInfo {
                identifier: t.identifier().to_string(),
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect()
    }

    /// Evaluates a rule list against an event.
    ///
    /// An empty list matches everything. `OR` stops at the first match and
    /// `AND` stops at the first miss.
    pub fn evaluate_rules(&self, rules: &[RuleConfig], event: &Event, operator: Operator) -> bool {
        if rules.is_empty() {
            return true;
        }

        for rule in rules {
            let matched = self.evaluate_single_rule(rule, event);
            match (operator, matched) {
                (Operator::Or, true) => return true,
                (Operator::And, false) => return false,
                _ => {}
            }
        }

        // Every rule agreed with the operator's identity element.
        operator == Operator::And
    }

    /// Evaluates a [`RuleSet`] with its own operator.
    pub fn evaluate_rule_set(&self, rule_set: &RuleSet, event: &Event) -> bool {
        self.evaluate_rules(&rule_set.rules, event, rule_set.operator)
    }

    /// Evaluates one rule configuration, failing closed.
    pub fn evaluate_single_rule(&self, rule: &RuleConfig, event: &Event) -> bool {
        let Some(type_id) = rule_type_of(rule) else {
            warn!("Rule configuration has no type, treating as no match");
            return false;
        };

        let Some(rule_type) = self.rule_types.get(type_id) else {
            warn!(rule_type = %type_id, "Unknown rule type, treating as no match");
            return false;
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| rule_type.evaluate(event, rule)));
        match outcome {
            Ok(Ok(matched)) => matched,
            Ok(Err(e)) => {
                warn!(rule_type = %type_id, error = %e, "Rule evaluation failed, treating as no match");
                metrics::counter!("rule_evaluation_failures_total", "rule_type" => type_id.to_string())
                    .increment(1);
                false
            }
            Err(panic) => {
                warn!(
                    rule_type = %type_id,
                    error = %panic_message(panic.as_ref()),
                    "Rule evaluation panicked, treating as no match"
                );
                metrics::counter!("rule_evaluation_failures_total", "rule_type" => type_id.to_string())
                    .increment(1);
                false
            }
        }
    }

    /// Structural validation of one rule configuration.
    pub fn validate_rule(&self, rule: &RuleConfig) -> RuleValidation {
        let type_id = match rule.get("type") {
            None | Some(Value::Null) => {
                return RuleValidation::from_errors(vec!["Rule type is required".to_string()])
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                return RuleValidation::from_errors(vec!["Rule type is required".to_string()])
            }
            Some(Value::String(s)) => s.as_str(),
            Some(_) => {
                return RuleValidation::from_errors(vec!["Rule type must be a string".to_string()])
            }
        };

        match self.rule_types.get(type_id) {
            Some(rule_type) => rule_type.validate_config(rule),
            None => RuleValidation::from_errors(vec![format!("Unknown rule type: {}", type_id)]),
        }
    }

    /// Validates every rule, collecting all errors with 1-based positions.
    pub fn validate_rules(&self, rules: &[RuleConfig]) -> RuleValidation {
        let errors = rules
            .iter()
            .enumerate()
            .flat_map(|(index, rule)| {
                self.validate_rule(rule)
                    .errors
                    .into_iter()
                    .map(move |e| format!("Rule {}: {}", index + 1, e))
            })
            .collect();
        RuleValidation::from_errors(errors)
    }

    /// Joins each rule's description with the operator.
    pub fn get_rules_description(&self, rules: &[RuleConfig], operator: Operator) -> String {
        if rules.is_empty() {
            return SEND_ALL_DESCRIPTION.to_string();
        }

        let descriptions: Vec<String> = rules
            .iter()
            .filter_map(|rule| {
                let rule_type = self.rule_types.get(rule_type_of(rule)?)?;
                Some(rule_type.readable_description(rule))
            })
            .collect();

        if descriptions.is_empty() {
            return NO_VALID_RULES_DESCRIPTION.to_string();
        }

        descriptions.join(&format!(" {} ", operator))
    }
}

fn rule_type_of(rule: &RuleConfig) -> Option<&str> {
    rule.get("type")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
