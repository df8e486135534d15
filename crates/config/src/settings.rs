//! Typed module settings and the resolved per-invocation settings record.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Setting id conventionally used for a module's key binding.
pub const BIND_SETTING: &str = "bind";

/// Sentinel binding value meaning "no key bound".
pub const UNBOUND: &str = "none";

/// Declared kind of a setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingKind {
    Boolean,
    Number,
    String,
    Enumeration,
    Keybinding,
}

impl fmt::Display for SettingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Enumeration => "enumeration",
            Self::Keybinding => "keybinding",
        };
        f.write_str(s)
    }
}

/// A setting value. Serialized as a bare JSON boolean, number or string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl SettingValue {
    /// Convert a persisted JSON value, rejecting anything that is not a scalar.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// JSON form used for persistence.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Text(s) => Value::String(s.clone()),
        }
    }

    /// Short description of the value's runtime type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Text(_) => "string",
        }
    }

    /// Borrow the text payload if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for SettingValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for SettingValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for SettingValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// Normalize a raw key name as reported by an input source.
///
/// Key names are compared lowercase; the space bar arrives as `" "` and is
/// stored as `space`.
pub fn normalize_key(key: &str) -> String {
    if key == " " {
        return "space".to_string();
    }
    key.trim().to_lowercase()
}

/// Check that `value` is a storable key binding: the sentinel or one key name.
pub fn validate_binding(value: &str) -> Result<()> {
    if value == UNBOUND {
        return Ok(());
    }
    let ok = !value.is_empty()
        && !value.contains('+')
        && !value.chars().any(char::is_whitespace)
        && value.to_lowercase() == value;
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidBinding(value.to_string()))
    }
}

/// One typed setting attached to a module: its declaration and current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingSpec {
    /// Unique within the owning module.
    pub id: String,
    /// Display label.
    pub label: String,
    /// Declared kind.
    pub kind: SettingKind,
    /// Current value (the default, for specs in the static registry).
    pub value: SettingValue,
    /// Allowed values for enumerations; empty otherwise.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl SettingSpec {
    fn new(id: &str, label: &str, kind: SettingKind, value: SettingValue) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            kind,
            value,
            options: Vec::new(),
        }
    }

    pub fn boolean(id: &str, label: &str, value: bool) -> Self {
        Self::new(id, label, SettingKind::Boolean, SettingValue::Bool(value))
    }

    pub fn number(id: &str, label: &str, value: f64) -> Self {
        Self::new(id, label, SettingKind::Number, SettingValue::Number(value))
    }

    pub fn string(id: &str, label: &str, value: &str) -> Self {
        Self::new(id, label, SettingKind::String, value.into())
    }

    /// An enumeration whose default is `value`, chosen from `options`.
    pub fn enumeration(id: &str, label: &str, value: &str, options: &[&str]) -> Self {
        let mut spec = Self::new(id, label, SettingKind::Enumeration, value.into());
        spec.options = options.iter().map(|o| o.to_string()).collect();
        spec
    }

    /// The conventional `bind` setting, initially unbound.
    pub fn keybinding() -> Self {
        Self::key(BIND_SETTING, "bind", UNBOUND)
    }

    /// A key binding setting under any id.
    pub fn key(id: &str, label: &str, value: &str) -> Self {
        Self::new(id, label, SettingKind::Keybinding, value.into())
    }

    /// Return true when `value` is acceptable for this setting's kind.
    pub fn accepts(&self, value: &SettingValue) -> bool {
        match (self.kind, value) {
            (SettingKind::Boolean, SettingValue::Bool(_)) => true,
            (SettingKind::Number, SettingValue::Number(n)) => n.is_finite(),
            (SettingKind::String, SettingValue::Text(_)) => true,
            (SettingKind::Enumeration, SettingValue::Text(s)) => self.options.contains(s),
            (SettingKind::Keybinding, SettingValue::Text(s)) => validate_binding(s).is_ok(),
            _ => false,
        }
    }

    /// Replace the value after checking it against the declared kind.
    pub fn set(&mut self, module: &str, value: SettingValue) -> Result<()> {
        if !self.accepts(&value) {
            return Err(Error::TypeMismatch {
                module: module.to_string(),
                setting: self.id.clone(),
                expected: self.kind.to_string(),
                found: format!("{} {}", value.type_name(), value.to_json()),
            });
        }
        self.value = value;
        Ok(())
    }
}

/// Immutable snapshot of one module's setting values, handed to its action.
///
/// Every accessor takes a fallback that is returned when the setting is
/// missing or holds a value of another kind.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Settings {
    values: BTreeMap<String, SettingValue>,
    binding_id: Option<String>,
}

impl Settings {
    /// Build a record from a module's setting specs.
    pub fn from_specs(specs: &[SettingSpec]) -> Self {
        Self {
            values: specs
                .iter()
                .map(|s| (s.id.clone(), s.value.clone()))
                .collect(),
            binding_id: specs
                .iter()
                .find(|s| s.kind == SettingKind::Keybinding)
                .map(|s| s.id.clone()),
        }
    }

    pub fn get(&self, id: &str) -> Option<&SettingValue> {
        self.values.get(id)
    }

    pub fn flag(&self, id: &str, fallback: bool) -> bool {
        match self.values.get(id) {
            Some(SettingValue::Bool(b)) => *b,
            _ => fallback,
        }
    }

    pub fn number(&self, id: &str, fallback: f64) -> f64 {
        match self.values.get(id) {
            Some(SettingValue::Number(n)) if n.is_finite() => *n,
            _ => fallback,
        }
    }

    /// A non-negative whole number; negative values fall back.
    pub fn count(&self, id: &str, fallback: u64) -> u64 {
        match self.values.get(id) {
            Some(SettingValue::Number(n)) if n.is_finite() && *n >= 0.0 => n.trunc() as u64,
            _ => fallback,
        }
    }

    pub fn text(&self, id: &str, fallback: &str) -> String {
        match self.values.get(id) {
            Some(SettingValue::Text(s)) => s.clone(),
            _ => fallback.to_string(),
        }
    }

    /// An enumeration value parsed into `T`; unparseable text falls back.
    pub fn choice<T: FromStr>(&self, id: &str, fallback: T) -> T {
        match self.values.get(id) {
            Some(SettingValue::Text(s)) => s.parse().unwrap_or(fallback),
            _ => fallback,
        }
    }

    /// Comma-separated text split into trimmed, non-empty entries.
    pub fn list(&self, id: &str, fallback: &str) -> Vec<String> {
        self.text(id, fallback)
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// The bound key, or `None` when the module is unbound.
    pub fn binding(&self) -> Option<&str> {
        let id = self.binding_id.as_deref()?;
        match self.values.get(id) {
            Some(SettingValue::Text(s)) if s != UNBOUND => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_checks_kind_and_options() {
        let mode = SettingSpec::enumeration("mode", "Mode", "normal", &["normal", "all"]);
        assert!(mode.accepts(&"all".into()));
        assert!(!mode.accepts(&"sometimes".into()));
        assert!(!mode.accepts(&SettingValue::Number(1.0)));

        let bind = SettingSpec::keybinding();
        assert!(bind.accepts(&"q".into()));
        assert!(bind.accepts(&"none".into()));
        assert!(!bind.accepts(&"ctrl+q".into()));
        assert!(!bind.accepts(&"Q".into()));
    }

    #[test]
    fn settings_fall_back_on_missing_or_mismatched() {
        let specs = vec![
            SettingSpec::number("count", "Count", 5.0),
            SettingSpec::string("prefix", "Prefix", "worker "),
            SettingSpec::boolean("on", "On", true),
        ];
        let s = Settings::from_specs(&specs);
        assert_eq!(s.count("count", 1), 5);
        assert_eq!(s.count("missing", 7), 7);
        assert_eq!(s.text("count", "x"), "x");
        assert!(s.flag("on", false));
        assert_eq!(s.binding(), None);
    }

    #[test]
    fn binding_found_by_kind() {
        let s = Settings::from_specs(&[
            SettingSpec::string("bind", "Not a key", "q"),
            SettingSpec::key("hotkey", "Hotkey", "h"),
        ]);
        assert_eq!(s.binding(), Some("h"));
        let unbound = Settings::from_specs(&[SettingSpec::key("hotkey", "Hotkey", UNBOUND)]);
        assert_eq!(unbound.binding(), None);
    }

    #[test]
    fn choice_parses_or_falls_back() {
        let s = Settings::from_specs(&[
            SettingSpec::enumeration("n", "N", "3", &["3", "6"]),
            SettingSpec::enumeration("bad", "Bad", "x", &["x"]),
        ]);
        assert_eq!(s.choice::<u32>("n", 1), 3);
        assert_eq!(s.choice::<u32>("bad", 1), 1);
        assert_eq!(s.choice::<u32>("missing", 9), 9);
    }

    #[test]
    fn list_splits_commas() {
        let s = Settings::from_specs(&[SettingSpec::string("ex", "Exclude", "a, b,,c")]);
        assert_eq!(s.list("ex", ""), vec!["a", "b", "c"]);
    }

    #[test]
    fn normalize_key_handles_space_and_case() {
        assert_eq!(normalize_key(" "), "space");
        assert_eq!(normalize_key("Q"), "q");
        assert_eq!(normalize_key("Escape"), "escape");
    }
}
