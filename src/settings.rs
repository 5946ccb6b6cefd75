//! Destination settings: declarative field descriptors, per-kind
//! validation, and the store the values are persisted in.
//!
//! Each [`FieldKind`] maps to one pure validation function through
//! [`FieldKind::validator`]. Saving runs every declared field through its
//! validator, then checks `required`, and writes nothing unless all fields
//! pass.

use crate::error::{FieldError, SettingsError, ValidationErrors};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

/// A destination's settings payload.
pub type Settings = Map<String, Value>;

/// Payload key under which a destination's rule set is stored.
pub const ALERT_RULES_KEY: &str = "alert_rules";

/// Payload key for the enabled flag shared by all destinations.
pub const ENABLED_KEY: &str = "enabled";

/// Field types and their type-specific constraints.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    Checkbox,
    Text,
    Textarea,
    Url,
    Email,
    /// `min`/`max` are advisory and are not enforced.
    Number {
        #[serde(skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    Select {
        options: Vec<(String, String)>,
    },
    /// Any other field type; values pass through unvalidated.
    Other,
}

type Validator = fn(&Value, &FieldDescriptor) -> Result<Value, String>;

impl FieldKind {
    /// The validation function for this kind.
    pub fn validator(&self) -> Validator {
        match self {
            FieldKind::Checkbox => validate_checkbox,
            FieldKind::Text => validate_text,
            FieldKind::Textarea => validate_textarea,
            FieldKind::Url => validate_url,
            FieldKind::Email => validate_email,
            FieldKind::Number { .. } => validate_number,
            FieldKind::Select { .. } => validate_select,
            FieldKind::Other => pass_through,
        }
    }
}

/// Describes one settings field, for rendering and for validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub title: String,
    pub description: String,
    pub default: Value,
    pub required: bool,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, title: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            description: String::new(),
            default: Value::Null,
            required: false,
            kind,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn default_value(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Runs the kind validator and then the required check.
    pub fn validate(&self, raw: &Value) -> Result<Value, String> {
        let value = (self.kind.validator())(raw, self)?;
        if self.required && is_empty(&value) {
            return Err(format!("{} is required.", self.title));
        }
        Ok(value)
    }
}

/// The `enabled` checkbox every destination declares first.
pub fn enabled_field() -> FieldDescriptor {
    FieldDescriptor::new(ENABLED_KEY, "Enabled", FieldKind::Checkbox)
        .description("Forward events to this destination")
        .default_value(false)
}

/// Emptiness as understood by the settings layer: null, false, zero,
/// `"0"`, the empty string and empty collections.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn validate_checkbox(raw: &Value, _field: &FieldDescriptor) -> Result<Value, String> {
    Ok(Value::Bool(!is_empty(raw)))
}

fn raw_text(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "1".to_string(),
        _ => String::new(),
    }
}

fn tag_pattern() -> &'static Regex {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"<[^>]*>").expect("static tag pattern"))
}

/// Strips tags, folds whitespace (including line breaks) and trims.
pub fn sanitize_text(input: &str) -> String {
    let stripped = tag_pattern().replace_all(input, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strips tags and trims, keeping line breaks.
pub fn sanitize_textarea(input: &str) -> String {
    let stripped = tag_pattern().replace_all(input, "");
    stripped
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn validate_text(raw: &Value, _field: &FieldDescriptor) -> Result<Value, String> {
    Ok(Value::String(sanitize_text(&raw_text(raw))))
}

fn validate_textarea(raw: &Value, _field: &FieldDescriptor) -> Result<Value, String> {
    Ok(Value::String(sanitize_textarea(&raw_text(raw))))
}

/// Returns the trimmed URL, or an empty string when it does not parse as
/// an absolute URL.
pub fn sanitize_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return String::new();
    }
    match url::Url::parse(trimmed) {
        Ok(parsed) if parsed.has_host() || parsed.scheme() == "mailto" => trimmed.to_string(),
        _ => String::new(),
    }
}

fn validate_url(raw: &Value, field: &FieldDescriptor) -> Result<Value, String> {
    let input = raw_text(raw);
    let sanitized = sanitize_url(&input);
    if !input.trim().is_empty() && sanitized.is_empty() {
        return Err(format!("{} must be a valid URL.", field.title));
    }
    Ok(Value::String(sanitized))
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(
            r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~.-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)+$",
        )
        .expect("static email pattern")
    })
}

/// Email syntax check.
pub fn is_email(input: &str) -> bool {
    input.len() >= 6 && email_pattern().is_match(input)
}

fn validate_email(raw: &Value, field: &FieldDescriptor) -> Result<Value, String> {
    let input = raw_text(raw).trim().to_string();
    if input.is_empty() {
        return Ok(Value::String(input));
    }
    if !is_email(&input) {
        return Err(format!("{} must be a valid email address.", field.title));
    }
    Ok(Value::String(input))
}

fn validate_number(raw: &Value, field: &FieldDescriptor) -> Result<Value, String> {
    let value = match raw {
        Value::Number(_) => raw.clone(),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                Value::from(i)
            } else if let Some(n) = s.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
                Value::Number(n)
            } else {
                field.default.clone()
            }
        }
        _ => field.default.clone(),
    };
    Ok(value)
}

fn validate_select(raw: &Value, field: &FieldDescriptor) -> Result<Value, String> {
    let input = raw_text(raw);
    if input.is_empty() {
        return Ok(field.default.clone());
    }
    match &field.kind {
        FieldKind::Select { options } if !options.iter().any(|(value, _)| *value == input) => {
            Err(format!("{} has an unsupported value: {}", field.title, input))
        }
        _ => Ok(Value::String(input)),
    }
}

fn pass_through(raw: &Value, _field: &FieldDescriptor) -> Result<Value, String> {
    Ok(raw.clone())
}

/// Validates raw settings against the declared fields.
///
/// Fields missing from `raw` are validated as if they held their default.
/// Keys not declared by any field are dropped.
pub fn validate_settings(fields: &[FieldDescriptor], raw: &Settings) -> Result<Settings, ValidationErrors> {
    let mut clean = Settings::new();
    let mut errors = ValidationErrors::default();

    for field in fields {
        let input = raw.get(&field.name).unwrap_or(&field.default);
        match field.validate(input) {
            Ok(value) => {
                clean.insert(field.name.clone(), value);
            }
            Err(message) => errors.push(FieldError::new(&field.name, message)),
        }
    }

    if errors.is_empty() {
        Ok(clean)
    } else {
        Err(errors)
    }
}

/// Defaults for every declared field, overlaid with stored values.
pub fn merge_with_defaults(fields: &[FieldDescriptor], stored: Option<&Settings>) -> Settings {
    let mut merged: Settings = fields
        .iter()
        .map(|f| (f.name.clone(), f.default.clone()))
        .collect();
    if let Some(stored) = stored {
        for (key, value) in stored {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Persistence for destination settings. Implementations live outside the
/// pipeline; [`MemorySettingsStore`] is provided for tests and the CLI.
pub trait SettingsStore: Send + Sync {
    fn load(&self, slug: &str) -> Option<Settings>;

    fn save(&self, slug: &str, settings: Settings) -> Result<(), SettingsError>;
}

/// In-memory settings store.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    entries: RwLock<HashMap<String, Settings>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self, slug: &str) -> Option<Settings> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(slug).cloned())
    }

    fn save(&self, slug: &str, settings: Settings) -> Result<(), SettingsError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| SettingsError::Store(format!("settings store lock poisoned: {}", e)))?;
        entries.insert(slug.to_string(), settings);
        Ok(())
    }
}

/// A destination's view of the settings store, bound to its slug.
#[derive(Clone)]
pub struct SettingsHandle {
    slug: String,
    store: Arc<dyn SettingsStore>,
}

impl std::fmt::Debug for SettingsHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsHandle")
            .field("slug", &self.slug)
            .finish_non_exhaustive()
    }
}

impl SettingsHandle {
    pub fn new(slug: impl Into<String>, store: Arc<dyn SettingsStore>) -> Self {
        Self {
            slug: slug.into(),
            store,
        }
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// The raw stored payload, without defaults.
    pub fn stored(&self) -> Option<Settings> {
        self.store.load(&self.slug)
    }

    /// Defaults merged with the stored payload.
    pub fn load(&self, fields: &[FieldDescriptor]) -> Settings {
        merge_with_defaults(fields, self.stored().as_ref())
    }

    /// Validates and persists. Nothing is written if any field fails.
    ///
    /// A stored rule set is kept unless `raw` carries its own.
    pub fn save(&self, fields: &[FieldDescriptor], raw: &Settings) -> Result<Settings, SettingsError> {
        let mut clean = validate_settings(fields, raw).map_err(SettingsError::Validation)?;

        let rules = raw
            .get(ALERT_RULES_KEY)
            .cloned()
            .or_else(|| self.stored().and_then(|s| s.get(ALERT_RULES_KEY).cloned()));
        if let Some(rules) = rules {
            clean.insert(ALERT_RULES_KEY.to_string(), rules);
        }

        self.store.save(&self.slug, clean.clone())?;
        Ok(clean)
    }

    /// Writes one key into the stored payload without revalidating fields.
    pub fn put(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        let mut stored = self.stored().unwrap_or_default();
        stored.insert(key.to_string(), value);
        self.store.save(&self.slug, stored)
    }
}
