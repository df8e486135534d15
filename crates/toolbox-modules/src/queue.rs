//! Queue modules: gather work items from the current page, split them into
//! jobs and append those to a workspace queue.

use std::{collections::BTreeSet, sync::OnceLock, time::Duration};

use allocator::{CompletionSource, JobDescriptor, Mode, Strategy, WorkItem, allocate};
use async_trait::async_trait;
use config::{ModuleSpec, SettingSpec, Settings, TriggerType};
use futures::future::join_all;
use regex::Regex;
use serde::de::DeserializeOwned;
use tokio::time;
use toolbox_engine::{ActionContext, Module};
use tracing::{debug, info, warn};

use crate::{
    Error, Result, Services,
    api::{
        FAVORED_WEB_PAGE_SIZE, FAVORED_WENKU_PAGE_SIZE, NovelOutline, Page, SearchFilters,
        WenkuNovel, WenkuOutline, favored_web_url, favored_wenku_url, favorite_list_id, wenku_url,
    },
    ids,
    page::PageView,
    workspace::{Workspace, now_millis},
};

const WEB_CATCH_LIMIT: &str = "web_catch_limit";
const MODE: &str = "mode";
const SEGMENT_MODE: &str = "segment_mode";
const SMART_JOB_LIMIT: &str = "smart_job_limit";
const SMART_CHAPTER_LIMIT: &str = "smart_chapter_limit";
const FIXED_JOB_LIMIT: &str = "fixed_job_limit";
const R18_BYPASS: &str = "r18_bypass";
const COMPLETION_SOURCE: &str = "completion_source";

/// Attempts per wenku detail request.
const WENKU_ATTEMPTS: u32 = 3;
const WENKU_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Title the site shows until a novel page has loaded.
const PLACEHOLDER_TITLE: &str = "轻小说机翻机器人";
const NOVEL_STATS: &str =
    r"总计 (\d+) / 百度 (\d+) / 有道 (\d+) / GPT (\d+) / Sakura (\d+)";

/// Kind of listing or detail page the queue modules understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// `/wenku`: wenku search results.
    WenkuList,
    /// `/wenku/<id>`: one wenku novel.
    Wenku,
    /// `/novel`: web-novel search results.
    NovelList,
    /// `/novel/<provider>/<id>`: one web novel.
    Novel,
    FavoriteWeb,
    FavoriteWenku,
    FavoriteLocal,
}

fn page_patterns() -> &'static [(PageKind, Regex)] {
    static PATTERNS: OnceLock<Vec<(PageKind, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (PageKind::WenkuList, r"^/wenku(\?.*)?$"),
            (PageKind::Wenku, r"^/wenku/.*(\?.*)?$"),
            (PageKind::NovelList, r"^/novel(\?.*)?$"),
            (PageKind::Novel, r"^/novel/.*(\?.*)?$"),
            (PageKind::FavoriteWeb, r"^/favorite/web(/.*)?(\?.*)?$"),
            (PageKind::FavoriteWenku, r"^/favorite/wenku(/.*)?(\?.*)?$"),
            (PageKind::FavoriteLocal, r"^/favorite/local(/.*)?(\?.*)?$"),
        ]
        .into_iter()
        .filter_map(|(kind, re)| Regex::new(re).ok().map(|re| (kind, re)))
        .collect()
    })
}

fn stats_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(NOVEL_STATS).ok()).as_ref()
}

impl PageKind {
    /// Classify a page path. The first matching pattern wins.
    pub fn detect(path: &str) -> Option<Self> {
        page_patterns()
            .iter()
            .find(|(_, re)| re.is_match(path))
            .map(|(kind, _)| *kind)
    }
}

/// Chapter counts shown on a web-novel page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NovelStats {
    pub total: u64,
    pub gpt: u64,
    pub sakura: u64,
}

/// Find the statistics line among the page's text spans.
pub fn novel_stats(view: &PageView) -> Option<NovelStats> {
    let re = stats_regex()?;
    view.select("span.n-text").iter().find_map(|span| {
        let text = view.text_content(span.id);
        let caps = re.captures(&text)?;
        let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u64>().ok());
        Some(NovelStats {
            total: num(1)?,
            gpt: num(4).unwrap_or(0),
            sakura: num(5).unwrap_or(0),
        })
    })
}

/// Distinct wenku ids linked from the page, in page order.
pub fn linked_wenku_ids(view: &PageView) -> Vec<String> {
    let mut seen = BTreeSet::new();
    view.select(r#"a[href^="/wenku/"]"#)
        .iter()
        .filter_map(|a| a.attrs.get("href"))
        .filter_map(|href| href.split("/wenku/").nth(1))
        .map(|id| id.trim_end_matches('/').to_string())
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}

/// Button label of a mode on a wenku page.
fn mode_label(mode: Mode) -> &'static str {
    match mode {
        Mode::Normal => "常规",
        Mode::Expire => "过期",
        Mode::All => "重翻",
    }
}

/// Queue parameters read from a module's settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    pub web_limit: u64,
    pub mode: Mode,
    pub strategy: Strategy,
    pub r18_bypass: bool,
    pub completion: CompletionSource,
}

impl QueueOptions {
    pub fn from_settings(s: &Settings, completion: CompletionSource) -> Self {
        let strategy = if s.text(SEGMENT_MODE, "smart") == "fixed" {
            Strategy::Fixed {
                parts: s.count(FIXED_JOB_LIMIT, 6).max(1),
            }
        } else {
            Strategy::Smart {
                job_cap: s.count(SMART_JOB_LIMIT, 1000),
                min_units_per_job: s.count(SMART_CHAPTER_LIMIT, 5).max(1),
            }
        };
        Self {
            web_limit: s.count(WEB_CATCH_LIMIT, 20).max(1),
            mode: s.choice(MODE, Mode::Normal),
            strategy,
            r18_bypass: s.flag(R18_BYPASS, true),
            completion: s.choice(COMPLETION_SOURCE, completion),
        }
    }

    fn item(&self, novel: &NovelOutline) -> WorkItem {
        WorkItem::new(
            &novel.locator(),
            novel.title(),
            novel.total,
            self.completion.completed(novel.gpt, novel.sakura),
        )
    }

    fn allocate(&self, items: &[WorkItem]) -> Vec<JobDescriptor> {
        allocate(items, self.strategy, self.mode)
    }
}

/// What a queue pass produced.
enum Gathered {
    Jobs(Vec<JobDescriptor>),
    /// The page queued the work itself.
    Delegated,
    Unsupported,
}

/// Queues jobs into one workspace.
pub struct QueueModule {
    services: Services,
    target: Workspace,
}

impl QueueModule {
    pub fn gpt(services: Services) -> Self {
        Self {
            services,
            target: Workspace::Gpt,
        }
    }

    pub fn sakura(services: Services) -> Self {
        Self {
            services,
            target: Workspace::Sakura,
        }
    }

    fn id(&self) -> &'static str {
        match self.target {
            Workspace::Gpt => ids::QUEUE_GPT_V2,
            Workspace::Sakura => ids::QUEUE_SAKURA_V2,
        }
    }

    /// Counter that marks chapters done when the setting is unset.
    fn default_completion(&self) -> CompletionSource {
        match self.target {
            Workspace::Gpt => CompletionSource::Max,
            Workspace::Sakura => CompletionSource::Sakura,
        }
    }

    fn queue_label(&self) -> &'static str {
        match self.target {
            Workspace::Gpt => "排队GPT",
            Workspace::Sakura => "排队Sakura",
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, url: &str, auth: bool) -> Result<T> {
        let value = self.services.fetch.get_json(url, auth).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Jobs for every volume of a wenku novel, retrying transient failures.
    async fn wenku_jobs(
        &self,
        origin: &str,
        id: &str,
        opts: &QueueOptions,
    ) -> Result<Vec<JobDescriptor>> {
        let url = wenku_url(origin, id);
        let mut attempt = 1;
        loop {
            match self.fetch::<WenkuNovel>(&url, opts.r18_bypass).await {
                Ok(novel) => {
                    return Ok(novel
                        .volume_ids()
                        .iter()
                        .map(|v| JobDescriptor::wenku(id, v, opts.mode))
                        .collect());
                }
                Err(e) if attempt < WENKU_ATTEMPTS => {
                    debug!(id, attempt, error = %e, "wenku fetch failed, retrying");
                    attempt += 1;
                    time::sleep(WENKU_RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Volume jobs of many wenku novels fetched concurrently. Novels that
    /// keep failing are skipped.
    async fn wenku_batch(
        &self,
        ctx: &ActionContext,
        wenku_ids: &[String],
        opts: &QueueOptions,
    ) -> Vec<JobDescriptor> {
        let origin = &ctx.location.origin;
        let results = join_all(wenku_ids.iter().map(|id| self.wenku_jobs(origin, id, opts))).await;
        let mut jobs = Vec::new();
        for (id, result) in wenku_ids.iter().zip(results) {
            match result {
                Ok(mut js) => jobs.append(&mut js),
                Err(e) => {
                    warn!(id = %id, error = %e, "skipping wenku");
                    ctx.notifier().error(format!("Failed to fetch wenku {id}"));
                }
            }
        }
        jobs
    }

    fn click_labelled(&self, view: &PageView, label: &str) -> Result<bool> {
        match view.select("button").iter().find(|b| b.text.contains(label)) {
            Some(button) => {
                self.services.page.click(button.id)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn gather(
        &self,
        ctx: &ActionContext,
        kind: PageKind,
        opts: &QueueOptions,
    ) -> Result<Gathered> {
        let origin = &ctx.location.origin;
        let page = &self.services.page;
        let jobs = match kind {
            PageKind::WenkuList => {
                let wenku_ids = linked_wenku_ids(&page.snapshot());
                self.wenku_batch(ctx, &wenku_ids, opts).await
            }
            PageKind::Wenku => {
                let view = page.snapshot();
                self.click_labelled(&view, mode_label(opts.mode))?;
                if !self.click_labelled(&view, self.queue_label())? {
                    return Err(Error::Page(format!("no {} button", self.queue_label())));
                }
                return Ok(Gathered::Delegated);
            }
            PageKind::NovelList => {
                let filters = SearchFilters::from_page(&page.snapshot(), &page.search());
                let url = filters.url(origin, opts.web_limit);
                let listing: Page<NovelOutline> = self.fetch(&url, opts.r18_bypass).await?;
                let items: Vec<WorkItem> = listing.items.iter().map(|n| opts.item(n)).collect();
                opts.allocate(&items)
            }
            PageKind::Novel => {
                let title = page.title();
                if title.contains(PLACEHOLDER_TITLE) {
                    return Err(Error::Page("novel page has not finished loading".into()));
                }
                let stats = novel_stats(&page.snapshot())
                    .ok_or_else(|| Error::Page("chapter statistics not found".into()))?;
                let locator = ctx
                    .location
                    .path
                    .split_once("/novel")
                    .map_or("", |(_, rest)| rest);
                let done = opts.completion.completed(stats.gpt, stats.sakura);
                opts.allocate(&[WorkItem::new(locator, &title, stats.total, done)])
            }
            PageKind::FavoriteWeb => {
                let list = favorite_list_id(&ctx.location.path);
                let mut items = Vec::new();
                for n in 0.. {
                    let url = favored_web_url(origin, &list, n);
                    let listing: Page<NovelOutline> = match self.fetch(&url, true).await {
                        Ok(listing) => listing,
                        Err(e) => {
                            warn!(page = n, error = %e, "stopping favorites walk");
                            break;
                        }
                    };
                    let count = listing.items.len();
                    items.extend(listing.items.iter().map(|novel| opts.item(novel)));
                    if count < FAVORED_WEB_PAGE_SIZE {
                        break;
                    }
                }
                info!(novels = items.len(), "web favorites fetched");
                opts.allocate(&items)
            }
            PageKind::FavoriteWenku => {
                let list = favorite_list_id(&ctx.location.path);
                let mut jobs = Vec::new();
                for n in 0.. {
                    let url = favored_wenku_url(origin, &list, n);
                    let listing: Page<WenkuOutline> = match self.fetch(&url, true).await {
                        Ok(listing) => listing,
                        Err(e) => {
                            warn!(page = n, error = %e, "stopping favorites walk");
                            break;
                        }
                    };
                    let wenku_ids: Vec<String> = listing.items.into_iter().map(|w| w.id).collect();
                    jobs.extend(self.wenku_batch(ctx, &wenku_ids, opts).await);
                    if wenku_ids.len() < FAVORED_WENKU_PAGE_SIZE {
                        break;
                    }
                }
                jobs
            }
            PageKind::FavoriteLocal => return Ok(Gathered::Unsupported),
        };
        Ok(Gathered::Jobs(jobs))
    }

    async fn queue(&self, ctx: &ActionContext) -> Result<()> {
        let opts = QueueOptions::from_settings(&ctx.settings, self.default_completion());
        let Some(kind) = PageKind::detect(&ctx.location.path) else {
            ctx.notifier().warning("Unsupported page");
            return Ok(());
        };
        debug!(?kind, ?opts, target = %self.target, "queueing");
        let jobs = match self.gather(ctx, kind, &opts).await? {
            Gathered::Jobs(jobs) => jobs,
            Gathered::Delegated => return Ok(()),
            Gathered::Unsupported => {
                ctx.notifier().warning("Unsupported page");
                return Ok(());
            }
        };
        if jobs.is_empty() {
            ctx.notifier().warning("No tasks to queue");
            return Ok(());
        }

        let novels: BTreeSet<&str> = jobs.iter().map(|j| j.label.as_str()).collect();
        let tasks: Vec<(String, String)> =
            jobs.iter().map(|j| (j.task(), j.label.clone())).collect();
        let added = self
            .services
            .workspace
            .add_jobs(self.target, &tasks, now_millis())?;
        info!(added, total = tasks.len(), target = %self.target, "jobs queued");
        ctx.notifier().success(format!(
            "Queued {added} tasks for {} novels ({} segments)",
            novels.len(),
            tasks.len()
        ));
        Ok(())
    }
}

#[async_trait]
impl Module for QueueModule {
    fn spec(&self) -> ModuleSpec {
        let label = match self.target {
            Workspace::Gpt => "Queue GPT",
            Workspace::Sakura => "Queue Sakura",
        };
        ModuleSpec::new(self.id(), label, TriggerType::FireOnce)
            .scope(["/wenku", "/novel", "/favorite"])
            .setting(SettingSpec::number(WEB_CATCH_LIMIT, "Web novels per fetch", 20.0))
            .setting(SettingSpec::enumeration(
                MODE,
                "Mode",
                "normal",
                &["normal", "expire", "all"],
            ))
            .setting(SettingSpec::enumeration(
                SEGMENT_MODE,
                "Segmentation",
                "smart",
                &["smart", "fixed"],
            ))
            .setting(SettingSpec::number(SMART_JOB_LIMIT, "Smart job cap", 1000.0))
            .setting(SettingSpec::number(SMART_CHAPTER_LIMIT, "Smart chapters per job", 5.0))
            .setting(SettingSpec::number(FIXED_JOB_LIMIT, "Fixed jobs per novel", 6.0))
            .setting(SettingSpec::boolean(R18_BYPASS, "R18 (needs login)", true))
            .setting(SettingSpec::enumeration(
                COMPLETION_SOURCE,
                "Completed chapters",
                self.default_completion().as_str(),
                &["max", "gpt", "sakura"],
            ))
            .setting(SettingSpec::keybinding())
    }

    async fn run(&self, ctx: ActionContext) -> toolbox_engine::Result<()> {
        self.queue(&ctx).await.map_err(Into::into)
    }
}
