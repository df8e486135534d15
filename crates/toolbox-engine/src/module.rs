//! Executable modules and the registry that holds them.

use std::{collections::HashSet, fmt, sync::Arc};

use async_trait::async_trait;
use config::{ModuleSpec, Settings};

use crate::{Engine, Error, NotificationDispatcher, Result, deps::Location};

/// One unit of automation: a static declaration plus an action.
#[async_trait]
pub trait Module: Send + Sync {
    /// Declaration with default settings. Called once when the registry is built.
    fn spec(&self) -> ModuleSpec;

    /// Run the action once.
    ///
    /// Continuous modules are called every scheduler tick and must rate-limit
    /// themselves; ticks do not wait for earlier invocations to finish.
    async fn run(&self, ctx: ActionContext) -> Result<()>;
}

/// Everything an action sees for one invocation.
#[derive(Clone)]
pub struct ActionContext {
    /// Id of the module being run.
    pub module: String,
    /// Settings resolved at invocation time.
    pub settings: Settings,
    /// Page location at invocation time.
    pub location: Location,
    /// True for scheduler ticks and nested invocations.
    pub automatic: bool,
    engine: Engine,
}

impl fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionContext")
            .field("module", &self.module)
            .field("location", &self.location)
            .field("automatic", &self.automatic)
            .finish_non_exhaustive()
    }
}

impl ActionContext {
    pub(crate) fn new(
        module: &str,
        settings: Settings,
        location: Location,
        automatic: bool,
        engine: Engine,
    ) -> Self {
        Self {
            module: module.to_string(),
            settings,
            location,
            automatic,
            engine,
        }
    }

    /// Send notifications to the UI.
    pub fn notifier(&self) -> &NotificationDispatcher {
        self.engine.notifier()
    }

    /// The engine running this action.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Run another module's action as an automatic invocation.
    pub async fn invoke(&self, id: &str) -> Result<()> {
        self.engine.run_module(id, true).await
    }
}

/// Ordered, id-unique collection of modules.
#[derive(Clone, Default)]
pub struct Registry {
    entries: Vec<(ModuleSpec, Arc<dyn Module>)>,
}

impl Registry {
    /// Build a registry, rejecting duplicate ids.
    pub fn new(modules: Vec<Arc<dyn Module>>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(modules.len());
        for module in modules {
            let spec = module.spec();
            if !seen.insert(spec.id.clone()) {
                return Err(Error::DuplicateModule(spec.id));
            }
            entries.push((spec, module));
        }
        Ok(Self { entries })
    }

    /// Declarations in registry order.
    pub fn specs(&self) -> Vec<ModuleSpec> {
        self.entries.iter().map(|(s, _)| s.clone()).collect()
    }

    /// Module with id `id`.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Module>> {
        self.entries
            .iter()
            .find(|(s, _)| s.id == id)
            .map(|(_, m)| m.clone())
    }

    /// Number of modules.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no modules are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
