//! Keeps retrying unfinished tasks while the workspace sits idle.
//!
//! The attempt counter is per module, not per click: it goes back to zero
//! once a pass finds no unfinished task, and clicks on other panel buttons
//! leave it alone.

use std::time::Duration;

use async_trait::async_trait;
use config::{ModuleSpec, SettingSpec, TriggerType};
use parking_lot::Mutex;
use tokio::time::{self, Instant};
use toolbox_engine::{ActionContext, Module};
use tracing::{debug, info};

use crate::{Result, Services, ids, page::PageView, workspace::Workspace};

const MAX_ATTEMPTS: &str = "max_attempts";
const MOVE_TO_TOP: &str = "move_to_top";
const RELAUNCH: &str = "relaunch";

/// Minimum time between two passes.
pub const COOLDOWN: Duration = Duration::from_secs(1);
/// Pause between retrying and relaunching.
const SETTLE_DELAY: Duration = Duration::from_millis(10);

const UNFINISHED: &str = "未完成";
const RETRY_LABEL: &str = "重试未完成任务";
const STOP_LABEL: &str = "停止";

#[derive(Default)]
struct RetryState {
    attempts: u64,
    last_run: Option<Instant>,
}

pub struct AutoRetry {
    services: Services,
    state: Mutex<RetryState>,
}

/// Task rows whose description reports unfinished chapters.
pub fn unfinished_rows(view: &PageView) -> Vec<usize> {
    view.select(".n-list-item")
        .into_iter()
        .filter(|item| {
            view.select_within(item.id, ".n-thing-main__description")
                .iter()
                .any(|d| view.text_content(d.id).contains(UNFINISHED))
        })
        .map(|item| item.id)
        .collect()
}

/// Click the move-to-top button of the last `count` tasks.
fn move_to_top(view: &PageView, services: &Services, count: usize) -> Result<()> {
    let extras = view.select(".n-thing-header__extra");
    for extra in extras.iter().rev().take(count) {
        if let Some(button) = view.select_within(extra.id, "button").first() {
            services.page.click(button.id)?;
        }
    }
    Ok(())
}

impl AutoRetry {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            state: Mutex::new(RetryState::default()),
        }
    }

    /// Attempts counted since unfinished tasks last cleared.
    pub fn attempts(&self) -> u64 {
        self.state.lock().attempts
    }

    /// Claim this pass unless the cooldown has not elapsed.
    fn claim(&self) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();
        if state
            .last_run
            .is_some_and(|last| now.duration_since(last) < COOLDOWN)
        {
            return false;
        }
        state.last_run = Some(now);
        true
    }

    /// One pass. Returns true when a relaunch is due.
    fn retry(&self, ctx: &ActionContext) -> Result<bool> {
        let max_attempts = ctx.settings.count(MAX_ATTEMPTS, 99);
        let view = self.services.page.snapshot();
        let unfinished = unfinished_rows(&view);
        if unfinished.is_empty() {
            self.state.lock().attempts = 0;
            return Ok(false);
        }
        if self.attempts() >= max_attempts {
            return Ok(false);
        }

        let buttons = view.select("button");
        let busy = buttons.iter().any(|b| b.text.trim() == STOP_LABEL);
        if !busy && let Some(retry) = buttons.iter().find(|b| b.text.contains(RETRY_LABEL)) {
            let total = view.select(".n-list-item").len();
            for _ in 0..unfinished.len().min(total) {
                self.services.page.click(retry.id)?;
            }
            if ctx.settings.flag(MOVE_TO_TOP, false) {
                move_to_top(&view, &self.services, unfinished.len())?;
            }
            let mut state = self.state.lock();
            state.attempts += 1;
            info!(
                attempt = state.attempts,
                unfinished = unfinished.len(),
                "retried unfinished tasks"
            );
        }
        Ok(true)
    }
}

#[async_trait]
impl Module for AutoRetry {
    fn spec(&self) -> ModuleSpec {
        ModuleSpec::new(ids::AUTO_RETRY, "Auto retry", TriggerType::Continuous)
            .scope(["/workspace/*"])
            .setting(SettingSpec::number(MAX_ATTEMPTS, "Max retries", 99.0))
            .setting(SettingSpec::boolean(MOVE_TO_TOP, "Move retried tasks to top", false))
            .setting(SettingSpec::boolean(RELAUNCH, "Relaunch translators", true))
            .setting(SettingSpec::keybinding())
    }

    async fn run(&self, ctx: ActionContext) -> toolbox_engine::Result<()> {
        // Ticks run regardless of page; act only on a workspace.
        if Workspace::from_path(&ctx.location.path).is_none() || !self.claim() {
            return Ok(());
        }
        if !self.retry(&ctx)? {
            return Ok(());
        }
        time::sleep(SETTLE_DELAY).await;
        if ctx.settings.flag(RELAUNCH, true) {
            debug!("relaunching translators");
            ctx.invoke(ids::LAUNCH_TRANSLATOR).await?;
        }
        Ok(())
    }
}
