//! A flat model of the host page and the inspector interface over it.
//!
//! Elements form a tree through `parent` links. Text content of an element
//! includes its descendants, as in the DOM.

use std::{
    collections::BTreeMap,
    fs,
    path::Path,
    sync::{Arc, OnceLock},
};

use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{Error, Result};

/// One element of the page.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Element {
    /// Index in the page; assigned on load.
    pub id: usize,
    pub tag: String,
    pub classes: Vec<String>,
    /// Own text, excluding descendants.
    pub text: String,
    pub attrs: BTreeMap<String, String>,
    pub parent: Option<usize>,
    /// Text the element shows after it is clicked, e.g. a start button
    /// turning into a stop button.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_click: Option<String>,
}

impl Element {
    pub fn new(tag: &str, text: &str) -> Self {
        Self {
            tag: tag.to_string(),
            text: text.to_string(),
            ..Self::default()
        }
    }

    pub fn class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn child_of(mut self, parent: usize) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn on_click(mut self, text: &str) -> Self {
        self.after_click = Some(text.to_string());
        self
    }
}

/// A simple CSS-like selector: `tag`, `.class`, `tag.a.b`, `tag[attr^=value]`
/// or `tag[attr=value]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selector {
    tag: Option<String>,
    classes: Vec<String>,
    attr: Option<AttrMatch>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrMatch {
    Equals(String, String),
    Prefix(String, String),
}

fn selector_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^([a-zA-Z0-9-]*)((?:\.[\w-]+)*)(?:\[([\w-]+)(\^?=)"?([^"\]]*)"?\])?$"#).ok()
    })
    .as_ref()
}

impl Selector {
    pub fn parse(s: &str) -> Result<Self> {
        let caps = selector_regex()
            .and_then(|re| re.captures(s.trim()))
            .ok_or_else(|| Error::Page(format!("unsupported selector {s:?}")))?;
        let tag = caps
            .get(1)
            .map(|m| m.as_str())
            .filter(|t| !t.is_empty())
            .map(str::to_ascii_lowercase);
        let classes = caps
            .get(2)
            .map(|m| {
                m.as_str()
                    .split('.')
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let attr = match (caps.get(3), caps.get(4), caps.get(5)) {
            (Some(name), Some(op), Some(value)) => {
                let (name, value) = (name.as_str().to_string(), value.as_str().to_string());
                Some(if op.as_str() == "^=" {
                    AttrMatch::Prefix(name, value)
                } else {
                    AttrMatch::Equals(name, value)
                })
            }
            _ => None,
        };
        Ok(Self { tag, classes, attr })
    }

    pub fn matches(&self, el: &Element) -> bool {
        if let Some(tag) = &self.tag
            && !el.tag.eq_ignore_ascii_case(tag)
        {
            return false;
        }
        if !self.classes.iter().all(|c| el.classes.contains(c)) {
            return false;
        }
        match &self.attr {
            None => true,
            Some(AttrMatch::Equals(name, value)) => el.attrs.get(name) == Some(value),
            Some(AttrMatch::Prefix(name, value)) => el
                .attrs
                .get(name)
                .is_some_and(|v| v.starts_with(value.as_str())),
        }
    }
}

/// Immutable snapshot of the page's elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageView {
    elements: Vec<Element>,
}

impl PageView {
    /// Build a view, assigning ids from positions.
    pub fn new(mut elements: Vec<Element>) -> Self {
        for (i, el) in elements.iter_mut().enumerate() {
            el.id = i;
        }
        Self { elements }
    }

    pub fn get(&self, id: usize) -> Option<&Element> {
        self.elements.get(id)
    }

    /// All elements matching `selector`, in document order.
    ///
    /// An unparseable selector matches nothing.
    pub fn select(&self, selector: &str) -> Vec<&Element> {
        match Selector::parse(selector) {
            Ok(sel) => self.elements.iter().filter(|e| sel.matches(e)).collect(),
            Err(e) => {
                debug!(error = %e, "selector rejected");
                Vec::new()
            }
        }
    }

    /// True when `id` is `ancestor` or lies beneath it.
    pub fn is_within(&self, id: usize, ancestor: usize) -> bool {
        let mut cur = Some(id);
        while let Some(i) = cur {
            if i == ancestor {
                return true;
            }
            cur = self.elements.get(i).and_then(|e| e.parent);
        }
        false
    }

    /// Matching descendants of `id` (excluding `id` itself).
    pub fn select_within(&self, id: usize, selector: &str) -> Vec<&Element> {
        self.select(selector)
            .into_iter()
            .filter(|e| e.id != id && self.is_within(e.id, id))
            .collect()
    }

    /// Nearest ancestor-or-self matching `selector`.
    pub fn closest(&self, id: usize, selector: &str) -> Option<&Element> {
        let sel = Selector::parse(selector).ok()?;
        let mut cur = self.elements.get(id);
        while let Some(el) = cur {
            if sel.matches(el) {
                return Some(el);
            }
            cur = el.parent.and_then(|p| self.elements.get(p));
        }
        None
    }

    /// Own text plus the text of every descendant, in document order.
    pub fn text_content(&self, id: usize) -> String {
        self.elements
            .iter()
            .filter(|e| self.is_within(e.id, id))
            .map(|e| e.text.as_str())
            .collect()
    }
}

/// Read and click access to the host page.
pub trait PageInspector: Send + Sync {
    /// Document title.
    fn title(&self) -> String;

    /// Query string of the current URL, with or without the leading `?`.
    fn search(&self) -> String;

    /// Current elements.
    fn snapshot(&self) -> PageView;

    /// Click the element with `id`.
    fn click(&self, id: usize) -> Result<()>;
}

/// Read `name` from a query string.
pub fn query_param(search: &str, name: &str) -> Option<String> {
    search
        .trim_start_matches('?')
        .split('&')
        .filter_map(|kv| kv.split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
}

/// On-disk form of a [`StaticPage`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PageDocument {
    pub title: String,
    pub search: String,
    pub elements: Vec<Element>,
}

/// An in-memory page that records clicks and applies `after_click` text.
#[derive(Clone, Default)]
pub struct StaticPage {
    inner: Arc<Mutex<StaticInner>>,
}

#[derive(Default)]
struct StaticInner {
    title: String,
    search: String,
    view: PageView,
    clicks: Vec<usize>,
}

impl StaticPage {
    pub fn new(title: &str, elements: Vec<Element>) -> Self {
        let page = Self::default();
        page.replace(PageDocument {
            title: title.to_string(),
            search: String::new(),
            elements,
        });
        page
    }

    /// Load a page document from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| Error::Page(format!("{}: {e}", path.display())))?;
        let doc: PageDocument = serde_json::from_str(&raw)?;
        let page = Self::default();
        page.replace(doc);
        Ok(page)
    }

    /// Swap in a new document, clearing recorded clicks.
    pub fn replace(&self, doc: PageDocument) {
        let mut inner = self.inner.lock();
        inner.title = doc.title;
        inner.search = doc.search;
        inner.view = PageView::new(doc.elements);
        inner.clicks.clear();
    }

    pub fn set_search(&self, search: &str) {
        self.inner.lock().search = search.to_string();
    }

    /// Ids clicked so far, in order.
    pub fn clicks(&self) -> Vec<usize> {
        self.inner.lock().clicks.clone()
    }
}

impl PageInspector for StaticPage {
    fn title(&self) -> String {
        self.inner.lock().title.clone()
    }

    fn search(&self) -> String {
        self.inner.lock().search.clone()
    }

    fn snapshot(&self) -> PageView {
        self.inner.lock().view.clone()
    }

    fn click(&self, id: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        let el = inner
            .view
            .elements
            .get_mut(id)
            .ok_or_else(|| Error::Page(format!("no element {id}")))?;
        if let Some(text) = el.after_click.take() {
            el.text = text;
        }
        trace!(id, tag = %el.tag, text = %el.text, "click");
        inner.clicks.push(id);
        Ok(())
    }
}
