//! Remote API access: the fetch interface, endpoint URLs and response shapes.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    Result,
    page::{PageView, query_param},
};

/// Providers searched when the page selects none.
pub const ALL_PROVIDERS: &str = "kakuyomu,syosetu,novelup,hameln,pixiv,alphapolis";
/// Page size of the favored-web listing.
pub const FAVORED_WEB_PAGE_SIZE: usize = 30;
/// Page size of the favored-wenku listing.
pub const FAVORED_WENKU_PAGE_SIZE: usize = 24;

/// Performs GET requests returning JSON.
#[async_trait]
pub trait RemoteFetch: Send + Sync {
    /// Fetch `url`. With `use_auth`, attach the user's bearer token when one
    /// is available. Non-success statuses are errors.
    async fn get_json(&self, url: &str, use_auth: bool) -> Result<Value>;
}

/// One row of a web-novel listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NovelOutline {
    pub provider_id: String,
    pub novel_id: String,
    pub title_jp: String,
    pub title_zh: Option<String>,
    pub total: u64,
    pub gpt: u64,
    pub sakura: u64,
}

impl NovelOutline {
    /// `provider/novel`.
    pub fn locator(&self) -> String {
        format!("{}/{}", self.provider_id, self.novel_id)
    }

    /// Chinese title when present, else the Japanese one.
    pub fn title(&self) -> &str {
        self.title_zh.as_deref().unwrap_or(&self.title_jp)
    }
}

/// A page of listing results.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Page<T> {
    #[serde(default)]
    pub items: Vec<T>,
}

/// One row of a wenku favorites listing.
#[derive(Debug, Clone, Deserialize)]
pub struct WenkuOutline {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub volume_id: String,
}

/// Wenku novel detail.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WenkuNovel {
    pub volume_jp: Option<Vec<Volume>>,
    pub volume_zh: Option<Vec<Volume>>,
}

impl WenkuNovel {
    /// Volume ids, preferring the Japanese volume list.
    pub fn volume_ids(&self) -> Vec<String> {
        self.volume_jp
            .as_ref()
            .or(self.volume_zh.as_ref())
            .map(|vs| vs.iter().map(|v| v.volume_id.clone()).collect())
            .unwrap_or_default()
    }
}

pub fn wenku_url(origin: &str, id: &str) -> String {
    format!("{origin}/api/wenku/{id}")
}

pub fn favored_web_url(origin: &str, list: &str, page: usize) -> String {
    format!(
        "{origin}/api/user/favored-web/{list}?page={page}&pageSize={FAVORED_WEB_PAGE_SIZE}\
         &query=&provider={}&type=0&level=0&translate=0&sort=update",
        urlencoding::encode(ALL_PROVIDERS)
    )
}

pub fn favored_wenku_url(origin: &str, list: &str, page: usize) -> String {
    format!(
        "{origin}/api/user/favored-wenku/{list}?page={page}&pageSize={FAVORED_WENKU_PAGE_SIZE}&sort=update"
    )
}

/// Favorites list id from a `/favorite/<kind>/<id>` path.
pub fn favorite_list_id(path: &str) -> String {
    path.split('/')
        .filter(|p| !p.is_empty())
        .nth(2)
        .unwrap_or("default")
        .to_string()
}

const SOURCES: &[(&str, &str)] = &[
    ("Kakuyomu", "kakuyomu"),
    ("成为小说家吧", "syosetu"),
    ("Novelup", "novelup"),
    ("Hameln", "hameln"),
    ("Pixiv", "pixiv"),
    ("Alphapolis", "alphapolis"),
];
const TYPES: &[(&str, &str)] = &[
    ("连载中", "1"),
    ("已完结", "2"),
    ("短篇", "3"),
    ("全部", "0"),
];
const LEVELS: &[(&str, &str)] = &[("一般向", "1"), ("R18", "2"), ("全部", "0")];
const TRANSLATES: &[(&str, &str)] = &[("GPT", "1"), ("Sakura", "2"), ("全部", "0")];
const SORTS: &[(&str, &str)] = &[("更新", "0"), ("点击", "1"), ("相关", "2")];

/// Selector of the filter chips on the search page.
const FILTER_CHIP: &str = "span.n-text.__text-dark-131ezvy-p";
/// Selector of the search box.
const SEARCH_INPUT: &str = r#"input[placeholder="中/日文标题或作者"]"#;

/// Web-novel search parameters as currently selected on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilters {
    /// Zero-based page.
    pub page: usize,
    pub query: String,
    pub providers: String,
    pub kind: &'static str,
    pub level: &'static str,
    pub translate: &'static str,
    pub sort: &'static str,
}

fn pick(
    table: &[(&str, &'static str)],
    selected: &[String],
    fallback: &'static str,
) -> &'static str {
    table
        .iter()
        .find(|(label, _)| selected.iter().any(|s| s == label))
        .map_or(fallback, |(_, v)| *v)
}

impl SearchFilters {
    /// Read the filters from the page and its query string.
    pub fn from_page(view: &PageView, search: &str) -> Self {
        let page = query_param(search, "page")
            .and_then(|p| p.parse::<usize>().ok())
            .map_or(0, |p| p.saturating_sub(1));
        let query = view
            .select(SEARCH_INPUT)
            .first()
            .and_then(|e| e.attrs.get("value"))
            .map(|v| v.trim().to_string())
            .unwrap_or_default();
        let selected: Vec<String> = view
            .select(FILTER_CHIP)
            .iter()
            .map(|e| view.text_content(e.id).trim().to_string())
            .collect();
        let providers: Vec<&str> = SOURCES
            .iter()
            .filter(|(label, _)| selected.iter().any(|s| s == label))
            .map(|(_, v)| *v)
            .collect();
        Self {
            page,
            query,
            providers: if providers.is_empty() {
                ALL_PROVIDERS.to_string()
            } else {
                providers.join(",")
            },
            kind: pick(TYPES, &selected, "0"),
            level: pick(LEVELS, &selected, "0"),
            translate: pick(TRANSLATES, &selected, "0"),
            sort: pick(SORTS, &selected, "0"),
        }
    }

    /// Search endpoint for these filters returning up to `limit` items.
    pub fn url(&self, origin: &str, limit: u64) -> String {
        format!(
            "{origin}/api/novel?page={}&pageSize={limit}&query={}&provider={}&type={}&level={}&translate={}&sort={}",
            self.page,
            urlencoding::encode(&self.query),
            urlencoding::encode(&self.providers),
            self.kind,
            self.level,
            self.translate,
            self.sort
        )
    }
}
