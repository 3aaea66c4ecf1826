// ── Request payloads and pages ──
//
// Payloads are a closed set of shapes: a bare pool range, or a filter
// query that may also carry a range. Pages echo back the range they were
// fetched for.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ── PageRange ───────────────────────────────────────────────────────

/// A signed `(start, end)` window against a pool.
///
/// `start` is an offset (negative counts back from the tail). A
/// non-negative `end` is an exclusive index; a negative `end` is the pool
/// API's entry bound, `|end|` entries counted from the head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRange {
    pub start: i64,
    pub end: i64,
}

impl PageRange {
    pub const fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// The range a pager requests first: `(0, -page_size)`.
    pub fn first(page_size: u32) -> Self {
        Self::new(0, -i64::from(page_size))
    }

    /// Move `start` forward and push `end` further out by one page.
    #[must_use]
    pub fn advance(self, page_size: u32) -> Self {
        let step = i64::from(page_size);
        Self::new(self.start + step, self.end - step)
    }

    /// Entries of the cumulative window this range asks for, counted from
    /// the head. An answer shorter than this is proof that the pool has no
    /// more data.
    pub fn extent(&self) -> usize {
        usize::try_from(self.end.unsigned_abs()).unwrap_or(usize::MAX)
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.start, self.end)
    }
}

// ── FilterQuery ─────────────────────────────────────────────────────

/// Arbitrary key/value filter (state, owner, label, ...) with an optional
/// range when the filtered pool is itself paginated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterQuery {
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<PageRange>,
}

impl FilterQuery {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_range(mut self, range: PageRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

// ── RequestPayload ──────────────────────────────────────────────────

/// Everything a fetch capability can be asked for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestPayload {
    Range(PageRange),
    Filter(FilterQuery),
}

impl RequestPayload {
    /// Build the payload for `range`, scoped by `filter` when present.
    pub fn scoped(range: PageRange, filter: Option<&FilterQuery>) -> Self {
        match filter {
            Some(f) => Self::Filter(f.clone().with_range(range)),
            None => Self::Range(range),
        }
    }

    pub fn range(&self) -> Option<PageRange> {
        match self {
            Self::Range(r) => Some(*r),
            Self::Filter(f) => f.range,
        }
    }

    pub fn filter(&self) -> Option<&FilterQuery> {
        match self {
            Self::Filter(f) => Some(f),
            Self::Range(_) => None,
        }
    }
}

impl From<PageRange> for RequestPayload {
    fn from(range: PageRange) -> Self {
        Self::Range(range)
    }
}

impl From<FilterQuery> for RequestPayload {
    fn from(filter: FilterQuery) -> Self {
        Self::Filter(filter)
    }
}

// ── Page ────────────────────────────────────────────────────────────

/// The pool's answer to a range: everything from the head up to the
/// range's extent, tagged with the range it answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub range: PageRange,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(range: PageRange, items: Vec<T>) -> Self {
        Self { range, items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True when the page holds fewer entries than its range asked for.
    pub fn is_short(&self) -> bool {
        self.items.len() < self.range.extent()
    }
}
