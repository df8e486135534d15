#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::{
        CONFIG_KEY, CONFIG_VERSION, ConfigStore, Hydration, MemoryStorage, ModuleSpec,
        SettingSpec, SettingValue, Storage, StoredConfig, TriggerType,
    };

    fn registry() -> Vec<ModuleSpec> {
        vec![
            ModuleSpec::new("clear_queue", "Clear queue", TriggerType::FireOnce)
                .scope(["/workspace"])
                .setting(SettingSpec::keybinding()),
            ModuleSpec::new("queue_gpt_v2", "Queue GPT", TriggerType::FireOnce)
                .scope(["/wenku", "/novel"])
                .setting(SettingSpec::number("smart_job_limit", "Job cap", 1000.0))
                .setting(SettingSpec::enumeration(
                    "mode",
                    "Mode",
                    "normal",
                    &["normal", "expire", "all"],
                ))
                .setting(SettingSpec::boolean("r18_bypass", "R18", true))
                .setting(SettingSpec::keybinding()),
        ]
    }

    fn stored(storage: &MemoryStorage) -> StoredConfig {
        serde_json::from_str(&storage.get(CONFIG_KEY).unwrap()).unwrap()
    }

    #[test]
    fn absent_config_hydrates_defaults_and_persists() {
        let storage = Arc::new(MemoryStorage::new());
        let store = ConfigStore::hydrate(storage.clone(), registry());
        assert_eq!(store.last_hydration(), Hydration::Absent);
        assert_eq!(store.modules(), registry().as_slice());
        let saved = stored(&storage);
        assert_eq!(saved.schema_version, CONFIG_VERSION);
        assert_eq!(saved.modules.len(), 2);
    }

    #[test]
    fn malformed_config_resets() {
        let storage = Arc::new(MemoryStorage::new());
        storage.seed(CONFIG_KEY, "{not json");
        let store = ConfigStore::hydrate(storage.clone(), registry());
        assert_eq!(store.last_hydration(), Hydration::Malformed);
        assert_eq!(store.modules(), registry().as_slice());
        assert_eq!(stored(&storage), store.configuration().to_stored());
    }

    #[test]
    fn version_mismatch_discards_values() {
        let storage = Arc::new(MemoryStorage::new());
        let old = json!({
            "schemaVersion": CONFIG_VERSION - 1,
            "modules": [{ "id": "clear_queue", "settings": [{ "id": "bind", "value": "c" }] }]
        });
        storage.seed(CONFIG_KEY, &old.to_string());
        let store = ConfigStore::hydrate(storage, registry());
        assert_eq!(
            store.last_hydration(),
            Hydration::VersionMismatch(CONFIG_VERSION - 1)
        );
        assert_eq!(store.settings("clear_queue").unwrap().binding(), None);
    }

    #[test]
    fn merge_keeps_typed_values_and_prunes_unknown_ids() {
        let storage = Arc::new(MemoryStorage::new());
        let saved = json!({
            "schemaVersion": CONFIG_VERSION,
            "modules": [
                { "id": "retired_module", "settings": [{ "id": "bind", "value": "x" }] },
                { "id": "queue_gpt_v2", "settings": [
                    { "id": "smart_job_limit", "value": 50 },
                    { "id": "mode", "value": "all" },
                    { "id": "r18_bypass", "value": "yes" },
                    { "id": "old_setting", "value": 1 },
                    { "id": "bind", "value": "q" }
                ]}
            ]
        });
        storage.seed(CONFIG_KEY, &saved.to_string());
        let store = ConfigStore::hydrate(storage.clone(), registry());
        assert_eq!(store.last_hydration(), Hydration::Merged);

        let ids: Vec<&str> = store.modules().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["clear_queue", "queue_gpt_v2"]);

        let q = store.settings("queue_gpt_v2").unwrap();
        assert_eq!(q.count("smart_job_limit", 0), 50);
        assert_eq!(q.text("mode", ""), "all");
        // Wrong type falls back to the default.
        assert!(q.flag("r18_bypass", false));
        assert_eq!(q.binding(), Some("q"));
        assert!(q.get("old_setting").is_none());

        // Missing module starts at defaults.
        assert_eq!(store.settings("clear_queue").unwrap().binding(), None);

        // Storage was rewritten without the retired ids.
        let rewritten = stored(&storage);
        assert!(rewritten.modules.iter().all(|m| m.id != "retired_module"));
    }

    #[test]
    fn enumeration_outside_options_is_discarded() {
        let storage = Arc::new(MemoryStorage::new());
        let saved = json!({
            "schemaVersion": CONFIG_VERSION,
            "modules": [{ "id": "queue_gpt_v2", "settings": [{ "id": "mode", "value": "常规" }] }]
        });
        storage.seed(CONFIG_KEY, &saved.to_string());
        let store = ConfigStore::hydrate(storage, registry());
        assert_eq!(
            store.settings("queue_gpt_v2").unwrap().text("mode", ""),
            "normal"
        );
    }

    #[test]
    fn hydrate_is_idempotent() {
        let storage = Arc::new(MemoryStorage::new());
        let mut first = ConfigStore::hydrate(storage.clone(), registry());
        first
            .update_setting("queue_gpt_v2", "mode", "expire".into())
            .unwrap();
        let a = ConfigStore::hydrate(storage.clone(), registry());
        let b = ConfigStore::hydrate(storage.clone(), registry());
        assert_eq!(a.configuration(), b.configuration());
        assert_eq!(a.settings("queue_gpt_v2").unwrap().text("mode", ""), "expire");
    }

    #[test]
    fn update_setting_persists_and_ignores_unknown() {
        let storage = Arc::new(MemoryStorage::new());
        let mut store = ConfigStore::hydrate(storage.clone(), registry());
        let mut rx = storage.subscribe();

        store
            .update_setting("clear_queue", "bind", "c".into())
            .unwrap();
        assert!(rx.try_recv().is_ok());
        let saved = stored(&storage);
        assert_eq!(saved.modules[0].settings[0].value, json!("c"));

        store
            .update_setting("nope", "bind", "c".into())
            .unwrap();
        store
            .update_setting("clear_queue", "nope", "c".into())
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn update_setting_rejects_wrong_kind() {
        let storage = Arc::new(MemoryStorage::new());
        let mut store = ConfigStore::hydrate(storage, registry());
        let err = store
            .update_setting("queue_gpt_v2", "smart_job_limit", SettingValue::Bool(true))
            .unwrap_err();
        assert!(err.to_string().contains("smart_job_limit"));
        assert_eq!(
            store.settings("queue_gpt_v2").unwrap().count("smart_job_limit", 0),
            1000
        );
    }

    #[test]
    fn reload_picks_up_external_writes() {
        let storage = Arc::new(MemoryStorage::new());
        let mut store = ConfigStore::hydrate(storage.clone(), registry());
        let mut other = ConfigStore::hydrate(storage.clone(), registry());
        other
            .update_setting("clear_queue", "bind", "z".into())
            .unwrap();
        assert_eq!(store.settings("clear_queue").unwrap().binding(), None);
        store.reload();
        assert_eq!(store.settings("clear_queue").unwrap().binding(), Some("z"));
    }
}
