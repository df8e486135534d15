//! Static module declarations: identity, trigger type, page scope and settings.

use serde::{Deserialize, Serialize};

use crate::settings::{SettingKind, SettingSpec, Settings, UNBOUND};

/// How a module is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerType {
    /// Runs its action once per click or key press.
    FireOnce,
    /// Toggled active/inactive; runs on every scheduler tick while active.
    Continuous,
}

/// A page path pattern restricting where a module may be triggered.
///
/// Patterns ending in `*` match by prefix; everything else matches when the
/// pattern occurs anywhere in the path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ScopeRule {
    Prefix(String),
    Contains(String),
}

impl ScopeRule {
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(base) => Self::Prefix(base.to_string()),
            None => Self::Contains(pattern.to_string()),
        }
    }

    /// Check `path` against this rule.
    ///
    /// A prefix rule `"/workspace/*"` also matches the bare `"/workspace"`.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Prefix(base) => {
                path.starts_with(base.as_str())
                    || base
                        .strip_suffix('/')
                        .is_some_and(|bare| !bare.is_empty() && path == bare)
            }
            Self::Contains(needle) => path.contains(needle.as_str()),
        }
    }

    pub fn pattern(&self) -> String {
        match self {
            Self::Prefix(base) => format!("{base}*"),
            Self::Contains(needle) => needle.clone(),
        }
    }
}

impl From<String> for ScopeRule {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<ScopeRule> for String {
    fn from(rule: ScopeRule) -> Self {
        rule.pattern()
    }
}

/// Return true when any rule in `rules` matches `path`.
pub fn scope_matches(rules: &[ScopeRule], path: &str) -> bool {
    rules.iter().any(|r| r.matches(path))
}

/// Declaration of a module in the static registry, carrying its settings.
///
/// The executable action is attached by the engine; this type holds only the
/// data that persists and drives dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSpec {
    /// Globally unique, stable across versions.
    pub id: String,
    pub label: String,
    pub trigger: TriggerType,
    pub scope: Vec<ScopeRule>,
    #[serde(default)]
    pub hidden: bool,
    pub settings: Vec<SettingSpec>,
}

impl ModuleSpec {
    pub fn new(id: &str, label: &str, trigger: TriggerType) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            trigger,
            scope: Vec::new(),
            hidden: false,
            settings: Vec::new(),
        }
    }

    /// Append scope patterns.
    pub fn scope<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.scope
            .extend(patterns.into_iter().map(|p| ScopeRule::parse(p.as_ref())));
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn setting(mut self, spec: SettingSpec) -> Self {
        self.settings.push(spec);
        self
    }

    /// The module's key binding setting, if it declares one.
    pub fn binding_setting(&self) -> Option<&SettingSpec> {
        self.settings
            .iter()
            .find(|s| s.kind == SettingKind::Keybinding)
    }

    /// Current key of the binding setting, whatever its id. Unbound modules
    /// have none.
    pub fn binding(&self) -> Option<&str> {
        self.binding_setting()
            .and_then(|s| s.value.as_text())
            .filter(|key| *key != UNBOUND)
    }

    pub fn in_scope(&self, path: &str) -> bool {
        scope_matches(&self.scope, path)
    }

    /// Resolve the current setting values into an immutable record.
    pub fn resolved(&self) -> Settings {
        Settings::from_specs(&self.settings)
    }
}
