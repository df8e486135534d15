//! Versioned, persisted configuration for the module registry.
//!
//! Hydration merges stored values into the current registry shape: modules and
//! settings that no longer exist are dropped, new ones start at their
//! defaults, and values whose type no longer matches are discarded. A missing,
//! malformed or differently-versioned blob resets everything to defaults.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    Result,
    module::ModuleSpec,
    settings::{SettingValue, Settings},
    storage::Storage,
};

/// Current schema version of the persisted configuration.
pub const CONFIG_VERSION: u32 = 20;

/// Storage key for the configuration blob.
pub const CONFIG_KEY: &str = "NTR_ToolBox_Config";

/// Persisted `(id, value)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSetting {
    pub id: String,
    pub value: Value,
}

/// Persisted module record: id plus setting values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredModule {
    pub id: String,
    #[serde(default)]
    pub settings: Vec<StoredSetting>,
}

/// On-disk form of the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredConfig {
    pub schema_version: u32,
    pub modules: Vec<StoredModule>,
}

/// Hydrated configuration: one entry per registry module, in registry order.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub schema_version: u32,
    pub modules: Vec<ModuleSpec>,
}

impl Configuration {
    /// The configuration made entirely of registry defaults.
    pub fn defaults(registry: &[ModuleSpec]) -> Self {
        Self {
            schema_version: CONFIG_VERSION,
            modules: registry.to_vec(),
        }
    }

    pub fn module(&self, id: &str) -> Option<&ModuleSpec> {
        self.modules.iter().find(|m| m.id == id)
    }

    /// Project to the persisted form.
    pub fn to_stored(&self) -> StoredConfig {
        StoredConfig {
            schema_version: self.schema_version,
            modules: self
                .modules
                .iter()
                .map(|m| StoredModule {
                    id: m.id.clone(),
                    settings: m
                        .settings
                        .iter()
                        .map(|s| StoredSetting {
                            id: s.id.clone(),
                            value: s.value.to_json(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Merge stored values into the registry defaults.
///
/// A stored value is taken only when both ids still exist and the value is
/// acceptable for the default's declared kind.
pub fn merge(registry: &[ModuleSpec], stored: &StoredConfig) -> Configuration {
    let mut merged = Configuration::defaults(registry);
    for module in &mut merged.modules {
        let Some(saved) = stored.modules.iter().find(|m| m.id == module.id) else {
            continue;
        };
        for setting in &mut module.settings {
            let candidate = saved
                .settings
                .iter()
                .find(|s| s.id == setting.id)
                .and_then(|s| SettingValue::from_json(&s.value));
            match candidate {
                Some(value) if setting.accepts(&value) => setting.value = value,
                Some(value) => debug!(
                    module = %module.id,
                    setting = %setting.id,
                    found = value.type_name(),
                    "discarding stored value of wrong type"
                ),
                None => {}
            }
        }
    }
    merged
}

/// Why a hydrate fell back to defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hydration {
    /// Stored values were merged.
    Merged,
    /// Nothing was stored.
    Absent,
    /// The stored blob failed to parse.
    Malformed,
    /// The stored blob carried a different schema version.
    VersionMismatch(u32),
}

/// Process-wide configuration container with write-through persistence.
pub struct ConfigStore {
    storage: Arc<dyn Storage>,
    registry: Vec<ModuleSpec>,
    current: Configuration,
    last_hydration: Hydration,
}

impl ConfigStore {
    /// Read persisted configuration and merge it into `registry`.
    pub fn hydrate(storage: Arc<dyn Storage>, registry: Vec<ModuleSpec>) -> Self {
        let mut store = Self {
            current: Configuration::defaults(&registry),
            storage,
            registry,
            last_hydration: Hydration::Absent,
        };
        store.reload();
        store
    }

    /// Re-read storage, replacing the in-memory configuration.
    pub fn reload(&mut self) {
        let raw = self.storage.get(CONFIG_KEY);
        let parsed = raw.as_deref().map(serde_json::from_str::<StoredConfig>);
        let outcome = match parsed {
            None => Hydration::Absent,
            Some(Err(e)) => {
                warn!(key = CONFIG_KEY, error = %e, "stored configuration is malformed, resetting");
                Hydration::Malformed
            }
            Some(Ok(stored)) if stored.schema_version != CONFIG_VERSION => {
                info!(
                    found = stored.schema_version,
                    want = CONFIG_VERSION,
                    "configuration version changed, resetting"
                );
                Hydration::VersionMismatch(stored.schema_version)
            }
            Some(Ok(stored)) => {
                self.current = merge(&self.registry, &stored);
                self.last_hydration = Hydration::Merged;
                if self.current.to_stored() != stored {
                    debug!("rewriting stored configuration in canonical shape");
                    self.persist();
                }
                return;
            }
        };
        self.current = Configuration::defaults(&self.registry);
        self.last_hydration = outcome;
        self.persist();
    }

    pub fn last_hydration(&self) -> Hydration {
        self.last_hydration
    }

    pub fn configuration(&self) -> &Configuration {
        &self.current
    }

    pub fn modules(&self) -> &[ModuleSpec] {
        &self.current.modules
    }

    pub fn module(&self, id: &str) -> Option<&ModuleSpec> {
        self.current.module(id)
    }

    /// Resolve a module's settings record.
    pub fn settings(&self, id: &str) -> Option<Settings> {
        self.module(id).map(ModuleSpec::resolved)
    }

    /// Set one setting and persist the whole configuration.
    ///
    /// An unknown `(module, setting)` pair is a no-op; a value of the wrong
    /// kind is rejected.
    pub fn update_setting(
        &mut self,
        module: &str,
        setting: &str,
        value: SettingValue,
    ) -> Result<()> {
        let Some(target) = self
            .current
            .modules
            .iter_mut()
            .find(|m| m.id == module)
            .and_then(|m| m.settings.iter_mut().find(|s| s.id == setting))
        else {
            debug!(module, setting, "update for unknown setting ignored");
            return Ok(());
        };
        target.set(module, value)?;
        debug!(module, setting, "setting updated");
        self.persist();
        Ok(())
    }

    /// Write the current configuration. Failures are logged, not raised.
    fn persist(&self) {
        let json = match serde_json::to_string(&self.current.to_stored()) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to encode configuration");
                return;
            }
        };
        if let Err(e) = self.storage.set(CONFIG_KEY, &json) {
            warn!(error = %e, "failed to persist configuration");
        }
    }
}
