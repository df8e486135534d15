//! Test support utilities for toolbox-engine unit and integration tests.
//! These helpers are public to avoid dead_code warnings and are lightweight.
//! They are intended for use by the test suite only.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use config::{BIND_SETTING, MemoryStorage, ModuleSpec, SettingSpec, TriggerType};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::{
    ActionContext, DispatchPolicy, Engine, EngineParts, Error, Location, Module, Notification,
    Result, SharedLocation,
};

/// Origin accepted by the default dispatch policy.
pub const TEST_ORIGIN: &str = "https://n.novelia.cc";

/// A module that records each invocation and can be told to fail.
pub struct RecordingModule {
    spec: ModuleSpec,
    calls: AtomicUsize,
    automatic: Mutex<Vec<bool>>,
    fail: bool,
    nested: Option<String>,
}

impl RecordingModule {
    /// A fire-once module bound to `key` within `scope`.
    pub fn fire_once(id: &str, key: &str, scope: &[&str]) -> Arc<Self> {
        Self::build(id, TriggerType::FireOnce, key, scope, false, None)
    }

    /// A fire-once module whose binding lives under setting `setting`.
    pub fn bound_under(id: &str, setting: &str, key: &str) -> Arc<Self> {
        let spec = ModuleSpec::new(id, id, TriggerType::FireOnce)
            .scope(["/"])
            .setting(SettingSpec::string(BIND_SETTING, "unrelated", "x"))
            .setting(SettingSpec::key(setting, setting, key));
        Self::from_spec(spec, false, None)
    }

    /// A continuous module bound to `key` within `scope`.
    pub fn continuous(id: &str, key: &str, scope: &[&str]) -> Arc<Self> {
        Self::build(id, TriggerType::Continuous, key, scope, false, None)
    }

    /// A continuous module whose action always fails.
    pub fn failing(id: &str, scope: &[&str]) -> Arc<Self> {
        Self::build(id, TriggerType::Continuous, "none", scope, true, None)
    }

    /// A fire-once module that invokes `target` from its action.
    pub fn invoking(id: &str, key: &str, target: &str) -> Arc<Self> {
        Self::build(
            id,
            TriggerType::FireOnce,
            key,
            &["/"],
            false,
            Some(target.to_string()),
        )
    }

    fn build(
        id: &str,
        trigger: TriggerType,
        key: &str,
        scope: &[&str],
        fail: bool,
        nested: Option<String>,
    ) -> Arc<Self> {
        let mut bind = SettingSpec::keybinding();
        bind.value = key.into();
        let spec = ModuleSpec::new(id, id, trigger)
            .scope(scope.iter().copied())
            .setting(bind);
        Self::from_spec(spec, fail, nested)
    }

    fn from_spec(spec: ModuleSpec, fail: bool, nested: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            spec,
            calls: AtomicUsize::new(0),
            automatic: Mutex::new(Vec::new()),
            fail,
            nested,
        })
    }

    /// Number of times the action ran.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The `automatic` flag of each invocation, in order.
    pub fn automatic_flags(&self) -> Vec<bool> {
        self.automatic.lock().clone()
    }
}

#[async_trait]
impl Module for RecordingModule {
    fn spec(&self) -> ModuleSpec {
        self.spec.clone()
    }

    async fn run(&self, ctx: ActionContext) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.automatic.lock().push(ctx.automatic);
        if let Some(target) = &self.nested {
            ctx.invoke(target).await?;
        }
        if self.fail {
            return Err(Error::Action(format!("{} failed", ctx.module)));
        }
        Ok(())
    }
}

/// An engine over in-memory storage, plus its handles.
pub struct TestEngine {
    /// The engine under test; not started.
    pub engine: Engine,
    /// Backing storage.
    pub storage: Arc<MemoryStorage>,
    /// Navigate with this to move the engine's page.
    pub location: SharedLocation,
    /// Everything the engine notified.
    pub notifications: UnboundedReceiver<Notification>,
}

/// Build an engine over `modules` at `path` on the default allowed origin.
pub fn test_engine(modules: Vec<Arc<dyn Module>>, path: &str) -> Result<TestEngine> {
    test_engine_with(modules, path, Arc::new(MemoryStorage::new()))
}

/// Like [`test_engine`] with pre-seeded storage.
pub fn test_engine_with(
    modules: Vec<Arc<dyn Module>>,
    path: &str,
    storage: Arc<MemoryStorage>,
) -> Result<TestEngine> {
    let (tx, rx) = mpsc::unbounded_channel();
    let location = SharedLocation::new(Location::new(TEST_ORIGIN, path));
    let engine = Engine::initialize(EngineParts {
        storage: storage.clone(),
        modules,
        location: Arc::new(location.clone()),
        notifications: tx,
        policy: DispatchPolicy::default(),
    })?;
    Ok(TestEngine {
        engine,
        storage,
        location,
        notifications: rx,
    })
}
