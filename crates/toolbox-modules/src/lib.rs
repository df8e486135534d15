//! Toolbox Modules
//!
//! The nine concrete modules of the toolbox and the collaborators they act
//! through:
//! - [`PageInspector`]: reads and clicks the host page
//! - [`RemoteFetch`]: GETs JSON from the site's API
//! - [`WorkspaceStore`]: the persisted translator workers and job queues
//!
//! [`default_registry`] returns the modules in panel order, ready to hand to
//! the engine.
#![allow(missing_docs)]

use std::sync::Arc;

use toolbox_engine::Module;

pub mod api;
mod error;
mod launch;
pub mod page;
mod queue;
mod retry;
mod translators;
pub mod workspace;

pub use api::RemoteFetch;
pub use error::{Error, Result};
pub use launch::{LaunchTranslator, launch_candidates, running_count};
pub use page::{Element, PageDocument, PageInspector, PageView, StaticPage};
pub use queue::{NovelStats, PageKind, QueueModule, QueueOptions, linked_wenku_ids, novel_stats};
pub use retry::{AutoRetry, COOLDOWN, unfinished_rows};
pub use translators::{
    AddGptTranslator, AddSakuraTranslator, ClearQueue, DeleteTranslator, SyncStorage,
};
pub use workspace::{Workspace, WorkspaceData, WorkspaceStore};

/// Module ids. These are persisted in the configuration and must not change.
pub mod ids {
    pub const ADD_SAKURA_TRANSLATOR: &str = "add_sakura_translator";
    pub const ADD_GPT_TRANSLATOR: &str = "add_gpt_translator";
    pub const DELETE_TRANSLATOR: &str = "delete_translator";
    pub const CLEAR_QUEUE: &str = "clear_queue";
    pub const LAUNCH_TRANSLATOR: &str = "launch_translator";
    pub const QUEUE_SAKURA_V2: &str = "queue_sakura_v2";
    pub const QUEUE_GPT_V2: &str = "queue_gpt_v2";
    pub const AUTO_RETRY: &str = "auto_retry";
    pub const SYNC_STORAGE: &str = "sync_storage";
}

/// Collaborators shared by every module.
#[derive(Clone)]
pub struct Services {
    pub page: Arc<dyn PageInspector>,
    pub fetch: Arc<dyn RemoteFetch>,
    pub workspace: Arc<WorkspaceStore>,
}

/// All modules in panel order.
pub fn default_registry(services: &Services) -> Vec<Arc<dyn Module>> {
    vec![
        Arc::new(AddSakuraTranslator::new(services.clone())),
        Arc::new(AddGptTranslator::new(services.clone())),
        Arc::new(DeleteTranslator::new(services.clone())),
        Arc::new(ClearQueue::new(services.clone())),
        Arc::new(LaunchTranslator::new(services.clone())),
        Arc::new(QueueModule::sakura(services.clone())),
        Arc::new(QueueModule::gpt(services.clone())),
        Arc::new(AutoRetry::new(services.clone())),
        Arc::new(SyncStorage::new(services.clone())),
    ]
}
