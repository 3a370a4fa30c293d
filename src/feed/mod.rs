//! Bidirectional, cursor-paginated record cache.
//!
//! Pages are fetched lazily in either direction from a [`DataSource`], kept in
//! id order by the [`PageStore`] and evicted once more than a configured number
//! of pages are resident. The [`PaginationController`] owns the per-direction
//! fetch state and derives cursors from the boundary records.

pub mod controller;
pub mod errors;
pub mod eviction;
pub mod page_store;
pub mod source;

pub use controller::*;
pub use errors::{FeedError, FeedResult};
pub use eviction::*;
pub use page_store::*;
pub use source::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// Direction of a fetch relative to the known data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Towards higher ids (the live edge)
    Forward,
    /// Towards lower ids
    Backward,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single record of the logical sequence. The id is its global index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record<T> {
    pub id: u64,
    pub payload: T,
}

impl<T> Record<T> {
    pub fn new(id: u64, payload: T) -> Self {
        Self { id, payload }
    }
}

/// Records produced by one fetch call
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Records in ascending id order
    pub records: Vec<Record<T>>,

    /// Cursor the page was requested with
    pub cursor: u64,

    /// Direction the page was requested in
    pub direction: Direction,

    /// Cursor reported by the source for continuing in `direction`;
    /// `None` means the source is exhausted that way
    pub next_cursor: Option<u64>,
}

impl<T> Page<T> {
    pub fn new(
        records: Vec<Record<T>>,
        cursor: u64,
        direction: Direction,
        next_cursor: Option<u64>,
    ) -> Self {
        Self {
            records,
            cursor,
            direction,
            next_cursor,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first_id(&self) -> Option<u64> {
        self.records.first().map(|r| r.id)
    }

    pub fn last_id(&self) -> Option<u64> {
        self.records.last().map(|r| r.id)
    }

    /// Inclusive id range covered by the page
    pub fn id_range(&self) -> Option<RangeInclusive<u64>> {
        match (self.first_id(), self.last_id()) {
            (Some(first), Some(last)) => Some(first..=last),
            _ => None,
        }
    }

    /// Whether the page reported that nothing lies beyond it in its direction
    pub fn is_terminal(&self) -> bool {
        self.next_cursor.is_none()
    }
}
