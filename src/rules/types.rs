//! Built-in rule predicates.
//!
//! Each one matches a single event attribute against a configured list.

use super::{RuleConfig, RuleType, RuleValidation};
use crate::core::Event;
use crate::error::RuleError;
use crate::formatting::value_to_string;
use serde_json::Value;
use std::sync::Arc;

/// The rule types registered before any external ones.
pub fn core_rule_types() -> Vec<Arc<dyn RuleType>> {
    vec![
        Arc::new(LoggerRule),
        Arc::new(LevelRule),
        Arc::new(InitiatorRule),
        Arc::new(MessageKeyRule),
        Arc::new(UserRule),
    ]
}

/// Reads a list of scalar values from a rule configuration.
fn list_values(config: &RuleConfig, key: &str) -> Result<Vec<String>, RuleError> {
    match config.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(_) | Value::Number(_) => Ok(value_to_string(item)),
                other => Err(RuleError::InvalidConfig(format!(
                    "'{}' contains a non-scalar value: {}",
                    key, other
                ))),
            })
            .collect(),
        Some(_) => Err(RuleError::InvalidConfig(format!("'{}' must be a list", key))),
        None => Err(RuleError::InvalidConfig(format!("'{}' is missing", key))),
    }
}

fn validate_list(config: &RuleConfig, key: &str) -> RuleValidation {
    match list_values(config, key) {
        Ok(values) if values.is_empty() => {
            RuleValidation::from_errors(vec![format!("At least one value is required for '{}'", key)])
        }
        Ok(_) => RuleValidation::ok(),
        Err(e) => RuleValidation::from_errors(vec![e.to_string()]),
    }
}

fn describe_list(label: &str, config: &RuleConfig, key: &str) -> String {
    match list_values(config, key) {
        Ok(values) if !values.is_empty() => format!("{} is one of: {}", label, values.join(", ")),
        _ => format!("{} (not configured)", label),
    }
}

/// Matches the originating logger.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggerRule;

impl RuleType for LoggerRule {
    fn identifier(&self) -> &str {
        "logger"
    }

    fn name(&self) -> &str {
        "Logger"
    }

    fn description(&self) -> &str {
        "Match events from specific loggers"
    }

    fn evaluate(&self, event: &Event, config: &RuleConfig) -> Result<bool, RuleError> {
        Ok(list_values(config, "loggers")?.iter().any(|l| *l == event.logger))
    }

    fn validate_config(&self, config: &RuleConfig) -> RuleValidation {
        validate_list(config, "loggers")
    }

    fn readable_description(&self, config: &RuleConfig) -> String {
        describe_list("Logger", config, "loggers")
    }
}

/// Matches the event level, case-insensitively.
#[derive(Debug, Clone, Copy, Default)]
pub struct LevelRule;

impl RuleType for LevelRule {
    fn identifier(&self) -> &str {
        "level"
    }

    fn name(&self) -> &str {
        "Level"
    }

    fn description(&self) -> &str {
        "Match events with specific log levels"
    }

    fn evaluate(&self, event: &Event, config: &RuleConfig) -> Result<bool, RuleError> {
        Ok(list_values(config, "levels")?
            .iter()
            .any(|l| l.eq_ignore_ascii_case(event.level.trim())))
    }

    fn validate_config(&self, config: &RuleConfig) -> RuleValidation {
        let mut result = validate_list(config, "levels");
        if let Ok(values) = list_values(config, "levels") {
            for value in values {
                if crate::core::Level::parse(&value).is_none() {
                    result.errors.push(format!("Unknown level: {}", value));
                }
            }
        }
        RuleValidation::from_errors(result.errors)
    }

    fn readable_description(&self, config: &RuleConfig) -> String {
        describe_list("Level", config, "levels")
    }
}

/// Matches who or what initiated the event.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitiatorRule;

impl RuleType for InitiatorRule {
    fn identifier(&self) -> &str {
        "initiator"
    }

    fn name(&self) -> &str {
        "Initiator"
    }

    fn description(&self) -> &str {
        "Match events by initiator"
    }

    fn evaluate(&self, event: &Event, config: &RuleConfig) -> Result<bool, RuleError> {
        Ok(list_values(config, "initiators")?
            .iter()
            .any(|i| *i == event.initiator))
    }

    fn validate_config(&self, config: &RuleConfig) -> RuleValidation {
        validate_list(config, "initiators")
    }

    fn readable_description(&self, config: &RuleConfig) -> String {
        describe_list("Initiator", config, "initiators")
    }
}

/// Matches the `_message_key` context value.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageKeyRule;

impl RuleType for MessageKeyRule {
    fn identifier(&self) -> &str {
        "message_key"
    }

    fn name(&self) -> &str {
        "Message type"
    }

    fn description(&self) -> &str {
        "Match events by message key"
    }

    fn evaluate(&self, event: &Event, config: &RuleConfig) -> Result<bool, RuleError> {
        let keys = list_values(config, "message_keys")?;
        Ok(match event.context_value("_message_key") {
            Some(Value::String(key)) => keys.iter().any(|k| k == key),
            _ => false,
        })
    }

    fn validate_config(&self, config: &RuleConfig) -> RuleValidation {
        validate_list(config, "message_keys")
    }

    fn readable_description(&self, config: &RuleConfig) -> String {
        describe_list("Message type", config, "message_keys")
    }
}

/// Matches the acting user by id or login.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserRule;

impl RuleType for UserRule {
    fn identifier(&self) -> &str {
        "user"
    }

    fn name(&self) -> &str {
        "User"
    }

    fn description(&self) -> &str {
        "Match events performed by specific users"
    }

    fn evaluate(&self, event: &Event, config: &RuleConfig) -> Result<bool, RuleError> {
        let users = list_values(config, "users")?;
        let actor: Vec<String> = ["_user_id", "_user_login"]
            .iter()
            .filter_map(|key| event.context_value(key))
            .filter(|v| matches!(v, Value::String(_) | Value::Number(_)))
            .map(value_to_string)
            .collect();
        Ok(users.iter().any(|u| actor.contains(u)))
    }

    fn validate_config(&self, config: &RuleConfig) -> RuleValidation {
        validate_list(config, "users")
    }

    fn readable_description(&self, config: &RuleConfig) -> String {
        describe_list("User", config, "users")
    }
}
