//! Shaping policies and shaped results.

use std::fmt;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which rounds of a round-organized document to keep.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoundSelector {
    /// Only the terminal round of each event.
    FinalOnly,
    /// Every round.
    All,
    /// Exactly one round, matched by name case-insensitively (e.g. `Semi Final`).
    Named(String),
}

impl RoundSelector {
    /// Parse a caller-supplied selector: `final-only`, `all`, or a round name.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("final-only") {
            Self::FinalOnly
        } else if trimmed.eq_ignore_ascii_case("all") {
            Self::All
        } else {
            Self::Named(trimmed.to_owned())
        }
    }

    /// Case-folded form used in cache keys. Named rounds are prefixed so that
    /// `Named("all")` and `All` stay distinct.
    #[must_use]
    pub fn canonical(&self) -> String {
        match self {
            Self::FinalOnly => "final-only".to_owned(),
            Self::All => "all".to_owned(),
            Self::Named(name) => format!("named:{}", name.to_lowercase()),
        }
    }
}

impl fmt::Display for RoundSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FinalOnly => f.write_str("final-only"),
            Self::All => f.write_str("all"),
            Self::Named(name) => f.write_str(&name.to_lowercase()),
        }
    }
}

/// Per-entry detail level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailLevel {
    /// Identity, rank/position and best result only.
    Summary,
    /// Every field of the selected entries.
    #[default]
    Full,
}

impl DetailLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Full => "full",
        }
    }
}

/// How a fetched document is reduced before it is handed to a caller.
///
/// Two policies that differ in any field are cached separately.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShapingPolicy {
    pub round: RoundSelector,
    /// `None` means unbounded.
    pub max_entries: Option<NonZeroUsize>,
    pub detail: DetailLevel,
}

impl Default for ShapingPolicy {
    /// The full, unfiltered view.
    fn default() -> Self {
        Self {
            round: RoundSelector::All,
            max_entries: None,
            detail: DetailLevel::Full,
        }
    }
}

impl ShapingPolicy {
    /// Compact view: final rounds only, summary fields.
    #[must_use]
    pub fn summary() -> Self {
        Self {
            round: RoundSelector::FinalOnly,
            max_entries: None,
            detail: DetailLevel::Summary,
        }
    }

    #[must_use]
    pub fn with_round(mut self, round: RoundSelector) -> Self {
        self.round = round;
        self
    }

    /// Bound the number of retained entries; `0` means unbounded.
    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = NonZeroUsize::new(max_entries);
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: DetailLevel) -> Self {
        self.detail = detail;
        self
    }

    /// Canonical string form, used in cache keys and error messages.
    #[must_use]
    pub fn canonical(&self) -> String {
        let max = self
            .max_entries
            .map_or_else(|| "unbounded".to_owned(), |n| n.to_string());
        format!(
            "round={};max={max};detail={}",
            self.round.canonical(),
            self.detail.as_str()
        )
    }
}

impl fmt::Display for ShapingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// A reduced document plus a description of what was left out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapedResult {
    pub payload: Value,
    /// Number of entries removed by round selection and truncation.
    pub omitted_count: usize,
    /// Bytes removed: compact JSON size of the raw document minus that of `payload`.
    pub omitted_size_bytes: usize,
    pub truncated: bool,
}
