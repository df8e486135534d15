//! Job descriptors and their task-string wire format.
//!
//! A task string looks like
//! `web/<provider>/<novel>?level=normal&forceMetadata=false&startIndex=40&endIndex=60`.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Mode;

/// End index used for whole wenku volumes.
pub const WENKU_END: u64 = 65536;

/// Which queue a job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Web novel chapters.
    Web,
    /// Wenku volumes.
    Wenku,
}

impl JobKind {
    /// Wire prefix.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Wenku => "wenku",
        }
    }
}

/// Half-open unit range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitRange {
    /// First unit.
    pub start: u64,
    /// One past the last unit.
    pub end: u64,
}

impl UnitRange {
    /// Range from `start` to `end`.
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of units.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// True when the range holds no units.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for UnitRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{})", self.start, self.end)
    }
}

/// One unit of queued work: a locator, a unit range and a display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Queue the job goes to.
    pub kind: JobKind,
    /// Path-like locator without a leading slash, e.g. `syosetu/n1234ab`.
    pub locator: String,
    /// Translation mode.
    pub mode: Mode,
    /// Units covered.
    pub range: UnitRange,
    /// Display label; not part of the task string.
    pub label: String,
}

impl JobDescriptor {
    /// A web-novel chapter range.
    pub fn web(locator: &str, range: UnitRange, mode: Mode, label: &str) -> Self {
        Self {
            kind: JobKind::Web,
            locator: locator.trim_start_matches('/').to_string(),
            mode,
            range,
            label: label.to_string(),
        }
    }

    /// A whole wenku volume (`series/volume`).
    pub fn wenku(series: &str, volume: &str, mode: Mode) -> Self {
        Self {
            kind: JobKind::Wenku,
            locator: format!("{series}/{volume}"),
            mode,
            range: UnitRange::new(0, WENKU_END),
            label: volume.to_string(),
        }
    }

    /// Encode as the task string consumed by the external queue.
    pub fn task(&self) -> String {
        format!(
            "{}/{}?level={}&forceMetadata=false&startIndex={}&endIndex={}",
            self.kind.as_str(),
            self.locator,
            self.mode,
            self.range.start,
            self.range.end
        )
    }
}

/// Failure to decode a task string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseTaskError {
    /// Prefix is neither `web` nor `wenku`.
    #[error("unknown job kind in {0:?}")]
    Kind(String),
    /// No `?` separator.
    #[error("missing query in {0:?}")]
    MissingQuery(String),
    /// A query parameter is absent or not a number.
    #[error("missing or invalid {field} in {task:?}")]
    Field {
        /// Parameter name.
        field: &'static str,
        /// The offending task string.
        task: String,
    },
}

/// Decode a task string. The label is not part of the wire format and comes
/// back empty.
pub fn parse_task(task: &str) -> Result<JobDescriptor, ParseTaskError> {
    let (head, query) = task
        .split_once('?')
        .ok_or_else(|| ParseTaskError::MissingQuery(task.to_string()))?;
    let (kind, locator) = match head.split_once('/') {
        Some(("web", rest)) => (JobKind::Web, rest),
        Some(("wenku", rest)) => (JobKind::Wenku, rest),
        _ => return Err(ParseTaskError::Kind(task.to_string())),
    };
    let param = |name: &'static str| {
        query
            .split('&')
            .filter_map(|kv| kv.split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
            .ok_or(ParseTaskError::Field {
                field: name,
                task: task.to_string(),
            })
    };
    let number = |name: &'static str| {
        param(name)?.parse::<u64>().map_err(|_| ParseTaskError::Field {
            field: name,
            task: task.to_string(),
        })
    };
    let mode = Mode::from_str(param("level")?).unwrap_or_default();
    Ok(JobDescriptor {
        kind,
        locator: locator.to_string(),
        mode,
        range: UnitRange::new(number("startIndex")?, number("endIndex")?),
        label: String::new(),
    })
}
