//! Module settings, registry declarations and persisted configuration for the
//! toolbox.
#![allow(missing_docs)]

mod capture;
mod error;
mod module;
mod settings;
pub mod storage;
mod store;

#[cfg(test)]
mod test_merge;

pub use capture::{CaptureResult, CaptureTarget, KeyCapture};
pub use error::{Error, Result};
pub use module::{ModuleSpec, ScopeRule, TriggerType, scope_matches};
pub use settings::{
    BIND_SETTING, SettingKind, SettingSpec, SettingValue, Settings, UNBOUND, normalize_key,
    validate_binding,
};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageChange};
pub use store::{
    CONFIG_KEY, CONFIG_VERSION, ConfigStore, Configuration, Hydration, StoredConfig, StoredModule,
    StoredSetting, merge,
};
