//! Slot addressing and scroll anchors.
//!
//! The virtualized list is laid out as an optional head loader slot, the
//! resident records, and an optional tail loader slot. Record slots shift
//! whenever pages are prepended or evicted, so positions are remembered by
//! record id and translated back to slot indices afterwards.

use crate::feed::{Direction, Record};
use serde::Serialize;

/// Placeholder content of a loader slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoaderState {
    Loading,
    NoMoreData,
}

impl LoaderState {
    pub fn label(&self) -> &'static str {
        match self {
            LoaderState::Loading => "Loading more...",
            LoaderState::NoMoreData => "Nothing more to load",
        }
    }
}

/// Content of one virtual index
#[derive(Debug, PartialEq)]
pub enum Slot<'a, T> {
    Record(&'a Record<T>),
    Loader {
        direction: Direction,
        state: LoaderState,
    },
}

impl<T> Clone for Slot<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Slot<'_, T> {}

impl<'a, T> Slot<'a, T> {
    pub fn is_loader(&self) -> bool {
        matches!(self, Slot::Loader { .. })
    }

    pub fn record(&self) -> Option<&'a Record<T>> {
        match self {
            Slot::Record(record) => Some(record),
            Slot::Loader { .. } => None,
        }
    }
}

/// Mapping between virtual indices and record ids for one data snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotMap {
    /// 1 when a head loader slot is present
    pub head: usize,

    /// Id of the first resident record
    pub first_id: Option<u64>,

    /// Number of resident records
    pub records: usize,

    /// 1 when a tail loader slot is present
    pub tail: usize,
}

impl SlotMap {
    pub fn count(&self) -> usize {
        self.head + self.records + self.tail
    }

    /// Virtual index of a record, if resident
    pub fn index_of(&self, id: u64) -> Option<usize> {
        let first = self.first_id?;
        let local = usize::try_from(id.checked_sub(first)?).ok()?;
        (local < self.records).then_some(self.head + local)
    }

    /// Record id shown at a virtual index, if it is a record slot
    pub fn id_at(&self, index: usize) -> Option<u64> {
        let first = self.first_id?;
        let local = index.checked_sub(self.head)?;
        (local < self.records).then_some(first + local as u64)
    }

    /// Virtual index of the first and last record slots
    pub fn record_indices(&self) -> Option<(usize, usize)> {
        (self.records > 0).then(|| (self.head, self.head + self.records - 1))
    }

    /// Virtual index that id 0 would occupy; the difference between two
    /// snapshots is how far record slots moved
    pub fn base(&self) -> Option<i64> {
        let first = i64::try_from(self.first_id?).ok()?;
        Some(self.head as i64 - first)
    }
}

/// A position remembered by record id so it survives slot shifts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollAnchor {
    /// Record the viewport top is attached to
    pub id: u64,

    /// Scroll offset minus the record's start; negative when the viewport
    /// top lies above the record (on the head loader)
    pub offset_within: f64,
}

impl ScrollAnchor {
    /// Resolve the anchor in a new snapshot, clamping to the nearest
    /// resident record when the anchored one is gone
    pub fn resolve(&self, map: &SlotMap) -> Option<usize> {
        let first = map.first_id?;
        let last = first + map.records.checked_sub(1)? as u64;
        map.index_of(self.id.clamp(first, last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(head: usize, first_id: u64, records: usize, tail: usize) -> SlotMap {
        SlotMap {
            head,
            first_id: Some(first_id),
            records,
            tail,
        }
    }

    #[test]
    fn test_index_mapping_with_loaders() {
        let map = map(1, 10, 30, 1);
        assert_eq!(map.count(), 32);
        assert_eq!(map.index_of(10), Some(1));
        assert_eq!(map.index_of(39), Some(30));
        assert_eq!(map.index_of(40), None);
        assert_eq!(map.index_of(9), None);
        assert_eq!(map.id_at(0), None);
        assert_eq!(map.id_at(1), Some(10));
        assert_eq!(map.id_at(31), None);
        assert_eq!(map.record_indices(), Some((1, 30)));
    }

    #[test]
    fn test_base_difference_tracks_prepend() {
        let before = map(1, 20, 30, 1);
        let after = map(1, 10, 30, 1);
        assert_eq!(after.base().unwrap() - before.base().unwrap(), 10);
    }

    #[test]
    fn test_anchor_clamps_to_resident_range() {
        let anchor = ScrollAnchor {
            id: 5,
            offset_within: 0.0,
        };
        assert_eq!(anchor.resolve(&map(1, 10, 30, 1)), Some(1));
        assert_eq!(anchor.resolve(&map(0, 0, 30, 1)), Some(5));

        let empty = SlotMap {
            head: 0,
            first_id: None,
            records: 0,
            tail: 0,
        };
        assert_eq!(anchor.resolve(&empty), None);
    }

    #[test]
    fn test_empty_map_has_no_record_indices() {
        let empty = SlotMap {
            head: 0,
            first_id: None,
            records: 0,
            tail: 0,
        };
        assert_eq!(empty.record_indices(), None);
        assert_eq!(empty.count(), 0);

        // Loader slots alone hold no records either
        let loaders_only = SlotMap { head: 1, tail: 1, ..empty };
        assert_eq!(loaders_only.record_indices(), None);
    }
}
