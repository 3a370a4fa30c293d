//! Eviction strategies for the page store

use std::fmt::Debug;
use std::ops::RangeInclusive;

/// Decides which resident pages to drop once the store holds too many.
///
/// Pages are described by their inclusive id ranges, in id order. The anchor
/// is the id the caller wants to keep close: the record under the viewport
/// top, or the edge that was just extended when no viewport is known.
/// Implementations return indices into `pages`; the store drops them all at
/// once.
pub trait EvictionPolicy: Debug + Send + Sync {
    /// Select pages to evict so that at most `max_resident` remain
    fn select_evictions(
        &self,
        pages: &[RangeInclusive<u64>],
        anchor_id: u64,
        max_resident: usize,
    ) -> Vec<usize>;

    /// Policy name for logging
    fn name(&self) -> &str;
}

/// Evicts the pages whose id ranges lie farthest from the anchor
#[derive(Debug, Clone, Copy, Default)]
pub struct FarthestFromAnchor;

impl FarthestFromAnchor {
    /// Id distance between a page and the anchor; zero when it contains it
    pub fn distance(range: &RangeInclusive<u64>, anchor_id: u64) -> u64 {
        if anchor_id < *range.start() {
            range.start() - anchor_id
        } else if anchor_id > *range.end() {
            anchor_id - range.end()
        } else {
            0
        }
    }
}

impl EvictionPolicy for FarthestFromAnchor {
    fn select_evictions(
        &self,
        pages: &[RangeInclusive<u64>],
        anchor_id: u64,
        max_resident: usize,
    ) -> Vec<usize> {
        let excess = pages.len().saturating_sub(max_resident);
        if excess == 0 {
            return Vec::new();
        }

        let mut by_distance: Vec<(usize, u64)> = pages
            .iter()
            .enumerate()
            .map(|(index, range)| (index, Self::distance(range, anchor_id)))
            .collect();

        // Farthest first; on equal distance the lower index goes first
        by_distance.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut selected: Vec<usize> = by_distance
            .into_iter()
            .take(excess)
            .map(|(index, _)| index)
            .collect();
        selected.sort_unstable();
        selected
    }

    fn name(&self) -> &str {
        "farthest-from-anchor"
    }
}
