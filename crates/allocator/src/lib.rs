//! Task allocation: split a backlog of partially-completed work items into a
//! bounded list of bounded-size jobs.
//!
//! Two strategies are provided:
//! - [`allocate_smart`]: a uniform chunk size across a capped job count, filling
//!   the largest backlogs first.
//! - [`allocate_fixed`]: every item split into the same number of parts.
//!
//! Both are pure. For each item, the emitted ranges never overlap, never leave
//! `[0, total_units]`, and (unless the smart job cap truncates the walk) tile
//! exactly the item's outstanding work as defined by [`WorkItem::remaining`].

#![warn(missing_docs)]

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod fixed;
mod job;
mod smart;

pub use fixed::allocate_fixed;
pub use job::{JobDescriptor, JobKind, ParseTaskError, UnitRange, WENKU_END, parse_task};
pub use smart::allocate_smart;

/// Translation mode; decides how much of an item counts as outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Only the uncompleted suffix of each item.
    #[default]
    Normal,
    /// Retranslate expired units: the whole item.
    Expire,
    /// Retranslate everything: the whole item.
    All,
}

/// Unrecognized mode name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown mode {0:?}")]
pub struct UnknownMode(pub String);

impl Mode {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Expire => "expire",
            Self::All => "all",
        }
    }

    /// Parse a mode name or site label, treating anything unknown as normal.
    pub fn from_label(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "normal" | "常规" => Ok(Self::Normal),
            "expire" | "过期" => Ok(Self::Expire),
            "all" | "重翻" => Ok(Self::All),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which completion counter marks units as done.
///
/// A web novel reports separate GPT and Sakura translated-chapter counts; the
/// queue modules pick one policy explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionSource {
    /// A unit is done when either translator finished it.
    #[default]
    Max,
    /// Only GPT progress counts.
    Gpt,
    /// Only Sakura progress counts.
    Sakura,
}

/// Unrecognized completion source name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown completion source {0:?}")]
pub struct UnknownSource(pub String);

impl CompletionSource {
    /// Setting value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Max => "max",
            Self::Gpt => "gpt",
            Self::Sakura => "sakura",
        }
    }

    /// Parse a setting value; unknown names select [`CompletionSource::Max`].
    pub fn from_label(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    /// Completed units given both counters.
    pub fn completed(self, gpt: u64, sakura: u64) -> u64 {
        match self {
            Self::Max => gpt.max(sakura),
            Self::Gpt => gpt,
            Self::Sakura => sakura,
        }
    }
}

impl FromStr for CompletionSource {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "max" => Ok(Self::Max),
            "gpt" => Ok(Self::Gpt),
            "sakura" => Ok(Self::Sakura),
            other => Err(UnknownSource(other.to_string())),
        }
    }
}

/// One item of work, e.g. a novel with `total_units` chapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Locator embedded in emitted jobs (`provider/novel`).
    pub locator: String,
    /// Display label copied to emitted jobs.
    pub label: String,
    /// Total units in the item.
    pub total_units: u64,
    /// Units already completed.
    pub completed_units: u64,
}

impl WorkItem {
    /// Construct an item.
    pub fn new(locator: &str, label: &str, total_units: u64, completed_units: u64) -> Self {
        Self {
            locator: locator.to_string(),
            label: label.to_string(),
            total_units,
            completed_units,
        }
    }

    /// Outstanding units under `mode`.
    pub fn remaining(&self, mode: Mode) -> u64 {
        match mode {
            Mode::Normal => self.total_units.saturating_sub(self.completed_units),
            Mode::Expire | Mode::All => self.total_units,
        }
    }

    /// First outstanding unit under `mode`.
    pub fn start_offset(&self, mode: Mode) -> u64 {
        match mode {
            Mode::Normal => self.total_units - self.remaining(mode),
            Mode::Expire | Mode::All => 0,
        }
    }

    /// Build a job for `range` of this item.
    pub(crate) fn job(&self, range: UnitRange, mode: Mode) -> JobDescriptor {
        JobDescriptor::web(&self.locator, range, mode, &self.label)
    }
}

/// Partitioning policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// See [`allocate_smart`].
    Smart {
        /// Upper bound on the number of jobs emitted.
        job_cap: u64,
        /// Target lower bound on units per job.
        min_units_per_job: u64,
    },
    /// See [`allocate_fixed`].
    Fixed {
        /// Number of parts each item is split into.
        parts: u64,
    },
}

/// Allocate `items` with the given strategy.
pub fn allocate(items: &[WorkItem], strategy: Strategy, mode: Mode) -> Vec<JobDescriptor> {
    match strategy {
        Strategy::Smart {
            job_cap,
            min_units_per_job,
        } => allocate_smart(items, job_cap, min_units_per_job, mode),
        Strategy::Fixed { parts } => allocate_fixed(items, parts, mode),
    }
}
