//! Workspace maintenance modules: add and delete translator workers, clear
//! the job queue and resync cached workspace data.

use async_trait::async_trait;
use config::{ModuleSpec, SettingSpec, TriggerType};
use toolbox_engine::{ActionContext, Module};
use tracing::debug;

use crate::{Services, ids, workspace::Workspace};

const COUNT: &str = "count";
const NAME_PREFIX: &str = "name_prefix";
const MODEL: &str = "model";
const ENDPOINT: &str = "endpoint";
const API_KEY: &str = "api_key";
const EXCLUDE: &str = "exclude";

const DEFAULT_PREFIX: &str = "NTR translator ";

/// Adds Sakura workers to the Sakura workspace.
pub struct AddSakuraTranslator {
    services: Services,
}

impl AddSakuraTranslator {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Module for AddSakuraTranslator {
    fn spec(&self) -> ModuleSpec {
        ModuleSpec::new(
            ids::ADD_SAKURA_TRANSLATOR,
            "Add Sakura translators",
            TriggerType::FireOnce,
        )
        .scope(["/workspace/sakura"])
        .setting(SettingSpec::number(COUNT, "Count", 5.0))
        .setting(SettingSpec::string(NAME_PREFIX, "Name", DEFAULT_PREFIX))
        .setting(SettingSpec::string(
            ENDPOINT,
            "Endpoint",
            "https://sakura-share.one",
        ))
        .setting(SettingSpec::keybinding())
    }

    async fn run(&self, ctx: ActionContext) -> toolbox_engine::Result<()> {
        let s = &ctx.settings;
        let count = s.count(COUNT, 1).max(1);
        self.services.workspace.add_sakura_workers(
            &s.text(NAME_PREFIX, ""),
            &s.text(ENDPOINT, ""),
            count,
        )?;
        ctx.notifier().success(format!("Added {count} Sakura translators"));
        Ok(())
    }
}

/// Adds API workers to the GPT workspace.
pub struct AddGptTranslator {
    services: Services,
}

impl AddGptTranslator {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Module for AddGptTranslator {
    fn spec(&self) -> ModuleSpec {
        ModuleSpec::new(
            ids::ADD_GPT_TRANSLATOR,
            "Add GPT translators",
            TriggerType::FireOnce,
        )
        .scope(["/workspace/gpt"])
        .setting(SettingSpec::number(COUNT, "Count", 5.0))
        .setting(SettingSpec::string(NAME_PREFIX, "Name", DEFAULT_PREFIX))
        .setting(SettingSpec::string(MODEL, "Model", "deepseek-chat"))
        .setting(SettingSpec::string(
            ENDPOINT,
            "Endpoint",
            "https://api.deepseek.com",
        ))
        .setting(SettingSpec::string(API_KEY, "Key", "sk-wait-for-input"))
        .setting(SettingSpec::keybinding())
    }

    async fn run(&self, ctx: ActionContext) -> toolbox_engine::Result<()> {
        let s = &ctx.settings;
        let count = s.count(COUNT, 1).max(1);
        self.services.workspace.add_gpt_workers(
            &s.text(NAME_PREFIX, ""),
            &s.text(MODEL, ""),
            &s.text(ENDPOINT, ""),
            &s.text(API_KEY, ""),
            count,
        )?;
        ctx.notifier().success(format!("Added {count} GPT translators"));
        Ok(())
    }
}

/// Removes every worker of the current workspace except excluded ids.
pub struct DeleteTranslator {
    services: Services,
}

impl DeleteTranslator {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Module for DeleteTranslator {
    fn spec(&self) -> ModuleSpec {
        ModuleSpec::new(
            ids::DELETE_TRANSLATOR,
            "Delete translators",
            TriggerType::FireOnce,
        )
        .scope(["/workspace"])
        .setting(SettingSpec::string(EXCLUDE, "Exclude", "共享,本机,AutoDL"))
        .setting(SettingSpec::keybinding())
    }

    async fn run(&self, ctx: ActionContext) -> toolbox_engine::Result<()> {
        let Some(ws) = Workspace::from_path(&ctx.location.path) else {
            debug!(path = %ctx.location.path, "not a workspace page");
            return Ok(());
        };
        let keep = ctx.settings.list(EXCLUDE, "");
        let removed = self.services.workspace.remove_workers_except(ws, &keep)?;
        debug!(workspace = %ws, removed, "workers removed");
        ctx.notifier().success(format!("Deleted {ws} translators"));
        Ok(())
    }
}

/// Empties the current workspace's job queue.
pub struct ClearQueue {
    services: Services,
}

impl ClearQueue {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Module for ClearQueue {
    fn spec(&self) -> ModuleSpec {
        ModuleSpec::new(ids::CLEAR_QUEUE, "Clear job queue", TriggerType::FireOnce)
            .scope(["/workspace"])
            .setting(SettingSpec::keybinding())
    }

    async fn run(&self, ctx: ActionContext) -> toolbox_engine::Result<()> {
        let Some(ws) = Workspace::from_path(&ctx.location.path) else {
            debug!(path = %ctx.location.path, "not a workspace page");
            return Ok(());
        };
        self.services.workspace.clear_jobs(ws)?;
        ctx.notifier().success(format!("Cleared the {ws} job queue"));
        Ok(())
    }
}

/// Drops cached workspace data and reloads it from storage.
pub struct SyncStorage {
    services: Services,
}

impl SyncStorage {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Module for SyncStorage {
    fn spec(&self) -> ModuleSpec {
        ModuleSpec::new(ids::SYNC_STORAGE, "Sync workspace data", TriggerType::FireOnce)
            .scope(["/workspace/*"])
            .hidden()
            .setting(SettingSpec::keybinding())
    }

    async fn run(&self, ctx: ActionContext) -> toolbox_engine::Result<()> {
        if let Some(ws) = Workspace::from_path(&ctx.location.path) {
            let data = self.services.workspace.refresh(ws);
            debug!(
                workspace = %ws,
                workers = data.workers.len(),
                jobs = data.jobs.len(),
                "workspace resynced"
            );
        }
        Ok(())
    }
}
