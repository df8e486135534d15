//! Toolbox Engine
//!
//! The engine crate decides which module runs and when:
//! - matches key events and clicks against bindings, page scope and origin
//! - toggles continuous modules and drives them from a fixed-interval scheduler
//! - routes key presses into an active binding capture
//! - keeps panel visibility and position
//! - emits notifications to the UI layer
//!
//! It exposes a small API:
//! - [`Engine`]: constructed once with [`Engine::initialize`], then driven
//! - [`Module`] and [`ActionContext`]: what concrete modules implement and see
//!
//! All state lives behind the engine handle; there are no globals.
use std::{
    sync::{Arc, Weak},
    time::Duration,
};

mod deps;
mod error;
mod keep;
mod key_binding;
mod module;
mod notification;
mod scheduler;
pub mod test_support;
mod ui;

use config::{
    CONFIG_KEY, CaptureResult, ConfigStore, KeyCapture, ModuleSpec, SettingValue, Settings,
    Storage, TriggerType,
};
use parking_lot::Mutex;
use tokio::sync::{broadcast::error::RecvError, mpsc::UnboundedSender};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, trace, warn};

pub use deps::{Location, LocationProvider, SharedLocation};
pub use error::{Error, Result};
pub use keep::{KEEP_KEY, KeepAliveSet};
pub use key_binding::{KeyEvent, Modifiers, ParseKeyError};
pub use module::{ActionContext, Module, Registry};
pub use notification::{Notification, NotificationDispatcher, NotifyKind};
pub use scheduler::Scheduler;
pub use ui::{POSITION_KEY, Position, UiState, Viewport};

/// Default tick interval of the keep-alive scheduler.
pub const DEFAULT_TICK_MS: u64 = 100;

/// Where and how modules may be dispatched.
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    /// Hosts the toolbox operates on. Empty allows every host.
    pub allowed_hosts: Vec<String>,
    /// Key that toggles panel visibility together with Alt.
    pub toggle_key: String,
    /// Keep-alive scheduler interval.
    pub tick_interval: Duration,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            allowed_hosts: vec!["n.novelia.cc".into(), "n.sakura-share.one".into()],
            toggle_key: "t".into(),
            tick_interval: Duration::from_millis(DEFAULT_TICK_MS),
        }
    }
}

impl DispatchPolicy {
    /// True when `location`'s host is one the toolbox operates on.
    pub fn origin_allowed(&self, location: &Location) -> bool {
        self.allowed_hosts.is_empty()
            || self
                .allowed_hosts
                .iter()
                .any(|h| h.eq_ignore_ascii_case(location.host()))
    }

    fn is_toggle(&self, event: &KeyEvent) -> bool {
        let m = event.modifiers;
        m.alt && !m.ctrl && !m.meta && event.matches(&self.toggle_key)
    }
}

/// Collaborators needed to build an engine.
pub struct EngineParts {
    /// Key-value store for configuration, keep state and UI state.
    pub storage: Arc<dyn Storage>,
    /// Modules in panel order.
    pub modules: Vec<Arc<dyn Module>>,
    /// Current page.
    pub location: Arc<dyn LocationProvider>,
    /// Notification sink.
    pub notifications: UnboundedSender<Notification>,
    /// Dispatch rules.
    pub policy: DispatchPolicy,
}

/// What a dispatch did to one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// A fire-once action was started.
    Fired(String),
    /// A continuous module was toggled.
    Toggled {
        /// Module id.
        module: String,
        /// State after the toggle.
        active: bool,
    },
}

/// Result of feeding one key event to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Nothing matched; the host should process the key normally.
    Ignored,
    /// The reserved chord flipped panel visibility.
    UiToggled {
        /// Visibility after the toggle.
        visible: bool,
    },
    /// The key completed an active binding capture.
    Captured(CaptureResult),
    /// One or more modules matched.
    Dispatched(Vec<Trigger>),
}

impl KeyOutcome {
    /// True when the host should suppress the key's default behavior.
    pub fn handled(&self) -> bool {
        !matches!(self, Self::Ignored)
    }
}

struct Inner {
    registry: Registry,
    config: Mutex<ConfigStore>,
    capture: Mutex<KeyCapture>,
    keep: KeepAliveSet,
    ui: UiState,
    scheduler: Scheduler,
    storage: Arc<dyn Storage>,
    location: Arc<dyn LocationProvider>,
    notifier: NotificationDispatcher,
    policy: DispatchPolicy,
    tasks: TaskTracker,
    watcher: Mutex<Option<CancellationToken>>,
}

/// Engine coordinates configuration, dispatch, keep-alive ticks and UI state.
///
/// Construct via [`Engine::initialize`], call [`Engine::start`] inside a tokio
/// runtime, then feed it key events and clicks. [`Engine::teardown`] stops the
/// background tasks.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    /// Build the registry and hydrate configuration, keep state and UI state.
    pub fn initialize(parts: EngineParts) -> Result<Self> {
        let registry = Registry::new(parts.modules)?;
        let config = ConfigStore::hydrate(parts.storage.clone(), registry.specs());
        debug!(modules = registry.len(), hydration = ?config.last_hydration(), "engine_initialize");
        let keep = KeepAliveSet::load(parts.storage.clone());
        let ui = UiState::load(parts.storage.clone());
        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                config: Mutex::new(config),
                capture: Mutex::new(KeyCapture::new()),
                keep,
                ui,
                scheduler: Scheduler::new(),
                storage: parts.storage,
                location: parts.location,
                notifier: NotificationDispatcher::new(parts.notifications),
                policy: parts.policy,
                tasks: TaskTracker::new(),
                watcher: Mutex::new(None),
            }),
        })
    }

    /// Start the keep-alive scheduler and the storage watcher.
    pub fn start(&self) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner
            .scheduler
            .start(self.inner.policy.tick_interval, move |n| {
                if let Some(inner) = weak.upgrade() {
                    Self { inner }.run_tick(n);
                }
            });
        self.watch_storage();
        info!(interval_ms = self.inner.policy.tick_interval.as_millis(), "engine_started");
    }

    /// Stop background tasks and wait briefly for in-flight actions.
    pub async fn teardown(&self) {
        if let Some(token) = self.inner.watcher.lock().take() {
            token.cancel();
        }
        self.inner.scheduler.shutdown().await;
        self.settle().await;
        info!("engine_teardown");
    }

    /// Wait until every action started so far has finished.
    pub async fn settle(&self) {
        let tasks = &self.inner.tasks;
        tasks.close();
        tasks.wait().await;
        tasks.reopen();
    }

    /// Notification sender shared with module actions.
    pub fn notifier(&self) -> &NotificationDispatcher {
        &self.inner.notifier
    }

    /// Dispatch rules in effect.
    pub fn policy(&self) -> &DispatchPolicy {
        &self.inner.policy
    }

    /// Current page location.
    pub fn location(&self) -> Location {
        self.inner.location.current()
    }

    /// Backing storage.
    pub fn storage(&self) -> Arc<dyn Storage> {
        self.inner.storage.clone()
    }

    /// Panel visibility and position.
    pub fn ui(&self) -> &UiState {
        &self.inner.ui
    }

    /// Active continuous modules.
    pub fn keep(&self) -> &KeepAliveSet {
        &self.inner.keep
    }

    /// Number of scheduler ticks delivered so far.
    pub fn ticks(&self) -> u64 {
        self.inner.scheduler.ticks()
    }

    /// Current declarations with their setting values, in registry order.
    pub fn modules(&self) -> Vec<ModuleSpec> {
        self.inner.config.lock().modules().to_vec()
    }

    /// Resolved settings of module `id`.
    pub fn settings(&self, id: &str) -> Option<Settings> {
        self.inner.config.lock().settings(id)
    }

    /// True when continuous module `id` is running.
    pub fn is_active(&self, id: &str) -> bool {
        self.inner.keep.is_active(id)
    }

    /// Non-hidden modules that can be triggered on the current page.
    pub fn visible_modules(&self) -> Vec<ModuleSpec> {
        let location = self.location();
        if !self.inner.policy.origin_allowed(&location) {
            return Vec::new();
        }
        self.modules()
            .into_iter()
            .filter(|m| !m.hidden && m.in_scope(&location.path))
            .collect()
    }

    /// Change one setting and persist the configuration.
    pub fn update_setting(&self, module: &str, setting: &str, value: SettingValue) -> Result<()> {
        self.inner
            .config
            .lock()
            .update_setting(module, setting, value)?;
        Ok(())
    }

    /// Start recording the next key press as `module`'s binding for `setting`.
    pub fn begin_capture(&self, module: &str, setting: &str) {
        debug!(module, setting, "capture_begin");
        self.inner.capture.lock().begin(module, setting);
    }

    /// Abort an active binding capture.
    pub fn cancel_capture(&self) {
        if let Some(target) = self.inner.capture.lock().cancel() {
            debug!(module = %target.module, "capture_cancelled");
        }
    }

    /// True while a binding capture waits for a key.
    pub fn is_capturing(&self) -> bool {
        self.inner.capture.lock().is_recording()
    }

    /// Handle one key press.
    ///
    /// Order: the reserved Alt chord, then an active capture, then module
    /// bindings. Events with Ctrl, Alt or Meta held never reach bindings.
    pub fn on_key_event(&self, event: &KeyEvent) -> KeyOutcome {
        if self.inner.policy.is_toggle(event) {
            let visible = self.inner.ui.toggle();
            return KeyOutcome::UiToggled { visible };
        }

        let captured = {
            let mut capture = self.inner.capture.lock();
            if capture.is_recording() {
                capture.feed(&event.key)
            } else {
                None
            }
        };
        if let Some(result) = captured {
            self.finish_capture(&result);
            return KeyOutcome::Captured(result);
        }

        if event.modifiers.any_command() {
            trace!(key = %event.key, "key with modifiers ignored");
            return KeyOutcome::Ignored;
        }

        let location = self.location();
        let mut triggers = Vec::new();
        for spec in self.modules() {
            let Some(bound) = spec.binding().map(str::to_string) else {
                continue;
            };
            if !event.matches(&bound) {
                continue;
            }
            if !self.inner.policy.origin_allowed(&location) {
                debug!(module = %spec.id, origin = %location.origin, "origin not allowed");
                continue;
            }
            if !spec.in_scope(&location.path) {
                debug!(module = %spec.id, path = %location.path, "binding out of scope");
                continue;
            }
            debug!(module = %spec.id, key = %bound, "binding matched");
            triggers.push(self.trigger(&spec));
        }

        if triggers.is_empty() {
            KeyOutcome::Ignored
        } else {
            KeyOutcome::Dispatched(triggers)
        }
    }

    /// Trigger a module chosen from the panel; the key comparison is skipped.
    pub fn on_click(&self, id: &str) -> Result<Trigger> {
        let spec = self.checked_spec(id)?;
        Ok(self.trigger(&spec))
    }

    /// Toggle a continuous module directly.
    pub fn toggle_keep(&self, id: &str) -> Result<bool> {
        let spec = self.spec(id)?;
        if spec.trigger != TriggerType::Continuous {
            return Err(Error::NotContinuous(id.to_string()));
        }
        Ok(self.inner.keep.toggle(id))
    }

    /// Run a module's action to completion, bypassing scope checks.
    ///
    /// User-triggered failures are reported through the notifier as well as
    /// returned.
    pub async fn invoke(&self, id: &str) -> Result<()> {
        self.run_module(id, false).await
    }

    /// One scheduler tick: spawn every active continuous module.
    ///
    /// Each invocation is its own task, so a failing or slow action affects
    /// neither its siblings nor later ticks.
    pub fn run_tick(&self, n: u64) {
        for id in self.inner.keep.active_ids() {
            let Ok(spec) = self.spec(&id) else {
                trace!(tick = n, module = %id, "active id not in registry");
                continue;
            };
            if spec.trigger != TriggerType::Continuous {
                continue;
            }
            let engine = self.clone();
            self.inner.tasks.spawn(async move {
                if let Err(e) = engine.run_module(&id, true).await {
                    warn!(tick = n, module = %id, error = %e, "tick action failed");
                }
            });
        }
    }

    fn spec(&self, id: &str) -> Result<ModuleSpec> {
        self.inner
            .config
            .lock()
            .module(id)
            .cloned()
            .ok_or_else(|| Error::UnknownModule(id.to_string()))
    }

    fn checked_spec(&self, id: &str) -> Result<ModuleSpec> {
        let spec = self.spec(id)?;
        let location = self.location();
        if !self.inner.policy.origin_allowed(&location) {
            return Err(Error::OriginNotAllowed(location.origin));
        }
        if !spec.in_scope(&location.path) {
            return Err(Error::OutOfScope {
                module: id.to_string(),
                path: location.path,
            });
        }
        Ok(spec)
    }

    /// Fire a fire-once module or toggle a continuous one.
    fn trigger(&self, spec: &ModuleSpec) -> Trigger {
        match spec.trigger {
            TriggerType::Continuous => Trigger::Toggled {
                module: spec.id.clone(),
                active: self.inner.keep.toggle(&spec.id),
            },
            TriggerType::FireOnce => {
                let engine = self.clone();
                let id = spec.id.clone();
                self.inner.tasks.spawn(async move {
                    // Failures are already logged and notified.
                    if engine.run_module(&id, false).await.is_err() {
                        trace!(module = %id, "fire-once action failed");
                    }
                });
                Trigger::Fired(spec.id.clone())
            }
        }
    }

    /// Resolve settings and location, then run the action.
    pub(crate) async fn run_module(&self, id: &str, automatic: bool) -> Result<()> {
        let module = self
            .inner
            .registry
            .get(id)
            .ok_or_else(|| Error::UnknownModule(id.to_string()))?;
        let settings = self.settings(id).unwrap_or_default();
        let ctx = ActionContext::new(id, settings, self.location(), automatic, self.clone());
        trace!(module = %id, automatic, "action_start");
        let result = module.run(ctx).await;
        if let Err(e) = &result
            && !automatic
        {
            warn!(module = %id, error = %e, "action failed");
            self.inner.notifier.error(format!("{id}: {e}"));
        }
        result
    }

    fn finish_capture(&self, result: &CaptureResult) {
        let target = result.target();
        let Some(key) = result.binding() else {
            debug!(module = %target.module, "capture cancelled");
            return;
        };
        match self.update_setting(&target.module, &target.setting, key.into()) {
            Ok(()) => info!(module = %target.module, key, "binding captured"),
            Err(e) => {
                warn!(module = %target.module, error = %e, "failed to store captured binding")
            }
        }
    }

    /// Reload configuration or keep state when another writer changes them.
    fn watch_storage(&self) {
        let token = CancellationToken::new();
        if let Some(old) = self.inner.watcher.lock().replace(token.clone()) {
            old.cancel();
        }
        let mut rx = self.inner.storage.subscribe();
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                let change = tokio::select! {
                    _ = token.cancelled() => return,
                    change = rx.recv() => change,
                };
                // None after a lag: some changes were missed, reload both.
                let key = match change {
                    Ok(change) => Some(change.key),
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "storage watcher lagged");
                        None
                    }
                    Err(RecvError::Closed) => return,
                };
                let Some(inner) = weak.upgrade() else { return };
                let key = key.as_deref();
                if key.is_none_or(|k| k == CONFIG_KEY) {
                    trace!("configuration changed in storage");
                    inner.config.lock().reload();
                }
                if key.is_none_or(|k| k == KEEP_KEY) {
                    trace!("keep state changed in storage");
                    inner.keep.reload();
                }
            }
        });
    }
}
