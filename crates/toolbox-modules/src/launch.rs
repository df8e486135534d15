//! Clicks the start button of each worker row.

use std::time::Duration;

use async_trait::async_trait;
use config::{ModuleSpec, SettingSpec, TriggerType};
use tokio::time;
use toolbox_engine::{ActionContext, Module};
use tracing::debug;

use crate::{Result, Services, ids, page::PageView};

const INTERVAL: &str = "interval";
const MAX_LAUNCH: &str = "max_launch";
const AVOID_EMPTY: &str = "avoid_empty";
const EXCLUDE: &str = "exclude";

const START_LABEL: &str = "启动";
const STOP_LABEL: &str = "停止";
const FETCH_ERROR: &str = "TypeError: Failed to fetch";
/// Launching stops after this many consecutive clicks with no effect.
const MAX_IDLE_CLICKS: u32 = 3;

/// Number of workers currently running.
pub fn running_count(view: &PageView) -> usize {
    view.select("button")
        .iter()
        .filter(|b| b.text.contains(STOP_LABEL))
        .count()
}

/// Start buttons of worker rows that pass the exclude and error filters.
pub fn launch_candidates(view: &PageView, exclude: &[String], avoid_empty: bool) -> Vec<usize> {
    view.select("button")
        .into_iter()
        .filter(|btn| {
            let Some(row) = view.closest(btn.id, ".n-list-item") else {
                return false;
            };
            let text = view.text_content(row.id);
            if exclude.iter().any(|ex| text.contains(ex.as_str())) {
                return false;
            }
            if avoid_empty && text.contains(FETCH_ERROR) {
                return false;
            }
            btn.text.contains(START_LABEL)
        })
        .map(|btn| btn.id)
        .collect()
}

pub struct LaunchTranslator {
    services: Services,
}

impl LaunchTranslator {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    async fn launch(&self, ctx: &ActionContext) -> Result<usize> {
        let s = &ctx.settings;
        let interval = Duration::from_millis(s.count(INTERVAL, 50));
        let max_launch = s.count(MAX_LAUNCH, 999) as usize;
        let avoid_empty = s.flag(AVOID_EMPTY, true);
        let exclude = s.list(EXCLUDE, "");

        let page = &self.services.page;
        let candidates = launch_candidates(&page.snapshot(), &exclude, avoid_empty);
        let mut last_running = running_count(&page.snapshot());
        let mut idle = 0;
        let mut clicks = 0;

        for id in candidates {
            if clicks >= max_launch {
                break;
            }
            page.click(id)?;
            clicks += 1;
            time::sleep(interval).await;

            if avoid_empty {
                let running = running_count(&page.snapshot());
                if running == last_running {
                    idle += 1;
                } else {
                    idle = 0;
                    last_running = running;
                }
                if idle > MAX_IDLE_CLICKS {
                    debug!(clicks, "launch stalled");
                    break;
                }
            }
        }
        Ok(clicks)
    }
}

#[async_trait]
impl Module for LaunchTranslator {
    fn spec(&self) -> ModuleSpec {
        ModuleSpec::new(
            ids::LAUNCH_TRANSLATOR,
            "Launch translators",
            TriggerType::FireOnce,
        )
        .scope(["/workspace"])
        .setting(SettingSpec::number(INTERVAL, "Delay (ms)", 50.0))
        .setting(SettingSpec::number(MAX_LAUNCH, "Max launches", 999.0))
        .setting(SettingSpec::boolean(AVOID_EMPTY, "Skip failing workers", true))
        .setting(SettingSpec::string(EXCLUDE, "Exclude", "本机,AutoDL"))
        .setting(SettingSpec::keybinding())
    }

    async fn run(&self, ctx: ActionContext) -> toolbox_engine::Result<()> {
        let clicks = self.launch(&ctx).await?;
        debug!(clicks, automatic = ctx.automatic, "translators launched");
        Ok(())
    }
}
