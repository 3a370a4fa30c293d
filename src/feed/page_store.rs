//! Resident page storage with bounded memory.

use super::{EvictionPolicy, FarthestFromAnchor, FeedError, FeedResult, Page, Record};
use std::collections::VecDeque;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::{debug, warn};

/// Holds fetched pages in id order.
///
/// Flattening the resident pages always yields a contiguous run of ids. The
/// run does not have to start at zero once pages were evicted from the head,
/// so callers index records by id (see [`PageStore::get`]) and use
/// [`PageStore::first_id`] as the base offset.
#[derive(Debug)]
pub struct PageStore<T> {
    /// Resident pages, lowest ids first
    pages: VecDeque<Page<T>>,

    /// Upper bound on resident pages after eviction
    max_resident_pages: usize,

    /// Strategy choosing which pages to drop
    policy: Arc<dyn EvictionPolicy>,

    /// Number of resident records
    record_count: usize,
}

impl<T> PageStore<T> {
    /// Create a store using the farthest-from-anchor eviction policy
    pub fn new(max_resident_pages: usize) -> Self {
        Self::with_policy(max_resident_pages, Arc::new(FarthestFromAnchor))
    }

    /// Create a store with a custom eviction policy
    pub fn with_policy(max_resident_pages: usize, policy: Arc<dyn EvictionPolicy>) -> Self {
        Self {
            pages: VecDeque::new(),
            max_resident_pages: max_resident_pages.max(1),
            policy,
            record_count: 0,
        }
    }

    pub fn max_resident_pages(&self) -> usize {
        self.max_resident_pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Number of resident records
    pub fn len(&self) -> usize {
        self.record_count
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    pub fn pages(&self) -> impl Iterator<Item = &Page<T>> {
        self.pages.iter()
    }

    pub fn first_id(&self) -> Option<u64> {
        self.pages.front().and_then(|page| page.first_id())
    }

    pub fn last_id(&self) -> Option<u64> {
        self.pages.back().and_then(|page| page.last_id())
    }

    /// Inclusive id range of all resident records
    pub fn id_range(&self) -> Option<RangeInclusive<u64>> {
        Some(self.first_id()?..=self.last_id()?)
    }

    /// Insert a page after the resident records
    pub fn append(&mut self, page: Page<T>) -> FeedResult<()> {
        Self::check_internal(&page)?;
        if let (Some(page_first), Some(last)) = (page.first_id(), self.last_id()) {
            let expected = last + 1;
            if page_first != expected {
                return Err(FeedError::OutOfOrderPage {
                    expected,
                    found: page_first,
                });
            }
        }

        self.insert_back(page);
        Ok(())
    }

    /// Insert a page before the resident records
    pub fn prepend(&mut self, page: Page<T>) -> FeedResult<()> {
        Self::check_internal(&page)?;
        if let (Some(page_last), Some(first)) = (page.last_id(), self.first_id()) {
            if page_last.checked_add(1) != Some(first) {
                return Err(FeedError::OutOfOrderPage {
                    expected: first.saturating_sub(1),
                    found: page_last,
                });
            }
        }

        self.insert_front(page);
        Ok(())
    }

    /// All resident records in id order
    pub fn flattened_records(&self) -> impl Iterator<Item = &Record<T>> {
        self.pages.iter().flat_map(|page| page.records.iter())
    }

    /// Look up a resident record by its id
    pub fn get(&self, id: u64) -> Option<&Record<T>> {
        self.pages.iter().find_map(|page| {
            let first = page.first_id()?;
            let local = id.checked_sub(first)?;
            page.records.get(usize::try_from(local).ok()?)
        })
    }

    /// Record at a position of the flattened sequence
    pub fn get_at(&self, position: usize) -> Option<&Record<T>> {
        let first = self.first_id()?;
        self.get(first + position as u64)
    }

    /// Drop pages until at most `max_resident_pages` remain.
    ///
    /// Returns the id ranges of the evicted pages.
    pub fn evict_if_needed(&mut self, anchor_id: u64) -> Vec<RangeInclusive<u64>> {
        if self.pages.len() <= self.max_resident_pages {
            return Vec::new();
        }

        let ranges: Vec<RangeInclusive<u64>> = self
            .pages
            .iter()
            .filter_map(|page| page.id_range())
            .collect();
        let mut selected =
            self.policy
                .select_evictions(&ranges, anchor_id, self.max_resident_pages);
        selected.sort_unstable();
        selected.dedup();

        let mut evicted = Vec::with_capacity(selected.len());
        for index in selected.into_iter().rev() {
            let Some(page) = self.pages.remove(index) else {
                continue;
            };
            self.record_count -= page.len();
            if let Some(range) = page.id_range() {
                evicted.push(range);
            }
        }
        evicted.reverse();

        if !self.is_interior_contiguous() {
            // A policy that punches a hole in the middle breaks the id run;
            // keep the side holding the anchor.
            warn!(policy = self.policy.name(), "eviction left a gap, trimming");
            self.trim_to_anchor_run(anchor_id, &mut evicted);
        }

        debug!(
            policy = self.policy.name(),
            anchor_id,
            evicted = evicted.len(),
            resident = self.pages.len(),
            "evicted pages"
        );
        evicted
    }

    /// Remove every page
    pub fn clear(&mut self) {
        self.pages.clear();
        self.record_count = 0;
    }

    fn insert_back(&mut self, page: Page<T>) {
        if page.is_empty() {
            return;
        }
        self.record_count += page.len();
        self.pages.push_back(page);
    }

    fn insert_front(&mut self, page: Page<T>) {
        if page.is_empty() {
            return;
        }
        self.record_count += page.len();
        self.pages.push_front(page);
    }

    fn check_internal(page: &Page<T>) -> FeedResult<()> {
        let Some(first) = page.first_id() else {
            return Ok(());
        };
        for (offset, record) in page.records.iter().enumerate() {
            let expected = first + offset as u64;
            if record.id != expected {
                return Err(FeedError::OutOfOrderPage {
                    expected,
                    found: record.id,
                });
            }
        }
        Ok(())
    }

    fn is_interior_contiguous(&self) -> bool {
        self.pages
            .iter()
            .zip(self.pages.iter().skip(1))
            .all(|(a, b)| match (a.last_id(), b.first_id()) {
                (Some(last), Some(first)) => last + 1 == first,
                _ => true,
            })
    }

    fn trim_to_anchor_run(&mut self, anchor_id: u64, evicted: &mut Vec<RangeInclusive<u64>>) {
        let mut runs: Vec<Vec<Page<T>>> = Vec::new();
        for page in self.pages.drain(..) {
            let joins = match (runs.last().and_then(|run| run.last()), page.first_id()) {
                (Some(prev), Some(first)) => prev.last_id().map(|last| last + 1) == Some(first),
                _ => false,
            };
            if joins {
                if let Some(run) = runs.last_mut() {
                    run.push(page);
                }
            } else {
                runs.push(vec![page]);
            }
        }

        let keep = runs
            .iter()
            .map(|run| {
                let first = run.first().and_then(|p| p.first_id()).unwrap_or(0);
                let last = run.last().and_then(|p| p.last_id()).unwrap_or(0);
                FarthestFromAnchor::distance(&(first..=last), anchor_id)
            })
            .enumerate()
            .min_by_key(|(_, distance)| *distance)
            .map(|(index, _)| index)
            .unwrap_or(0);

        for (index, run) in runs.into_iter().enumerate() {
            if index == keep {
                self.pages.extend(run);
            } else {
                for page in run {
                    self.record_count -= page.len();
                    if let Some(range) = page.id_range() {
                        evicted.push(range);
                    }
                }
            }
        }
        evicted.sort_by_key(|range| *range.start());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::Direction;

    fn page(first: u64, len: u64, direction: Direction) -> Page<String> {
        let records = (first..first + len)
            .map(|id| Record::new(id, format!("row {}", id)))
            .collect();
        Page::new(records, first, direction, Some(first + len))
    }

    fn ids(store: &PageStore<String>) -> Vec<u64> {
        store.flattened_records().map(|r| r.id).collect()
    }

    #[test]
    fn test_append_and_prepend_keep_contiguity() {
        let mut store = PageStore::new(5);
        store.append(page(10, 10, Direction::Forward)).unwrap();
        store.append(page(20, 10, Direction::Forward)).unwrap();
        store.prepend(page(0, 10, Direction::Backward)).unwrap();

        assert_eq!(ids(&store), (0..30).collect::<Vec<_>>());
        assert_eq!(store.len(), 30);
        assert_eq!(store.page_count(), 3);
        assert_eq!(store.id_range(), Some(0..=29));
    }

    #[test]
    fn test_out_of_order_append_leaves_store_untouched() {
        let mut store = PageStore::new(3);
        store.append(page(0, 10, Direction::Forward)).unwrap();

        let err = store.append(page(11, 10, Direction::Forward)).unwrap_err();
        assert_eq!(err, FeedError::OutOfOrderPage { expected: 10, found: 11 });
        assert_eq!(ids(&store), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_out_of_order_prepend() {
        let mut store = PageStore::new(3);
        store.append(page(10, 10, Direction::Forward)).unwrap();

        let err = store.prepend(page(5, 10, Direction::Backward)).unwrap_err();
        assert_eq!(err, FeedError::OutOfOrderPage { expected: 9, found: 14 });
        assert_eq!(store.page_count(), 1);
    }

    #[test]
    fn test_nothing_can_precede_id_zero() {
        let mut store = PageStore::new(3);
        store.append(page(0, 10, Direction::Forward)).unwrap();
        assert!(store.prepend(page(0, 10, Direction::Backward)).is_err());
    }

    #[test]
    fn test_rejects_page_with_internal_gap() {
        let mut store: PageStore<String> = PageStore::new(3);
        let records = vec![Record::new(0, "a".to_string()), Record::new(2, "b".to_string())];
        let err = store
            .append(Page::new(records, 0, Direction::Forward, Some(3)))
            .unwrap_err();
        assert_eq!(err, FeedError::OutOfOrderPage { expected: 1, found: 2 });
        assert!(store.is_empty());
    }

    #[test]
    fn test_empty_page_is_a_no_op() {
        let mut store: PageStore<String> = PageStore::new(3);
        store.append(page(0, 10, Direction::Forward)).unwrap();
        store
            .append(Page::new(Vec::new(), 10, Direction::Forward, None))
            .unwrap();
        assert_eq!(store.page_count(), 1);
    }

    #[test]
    fn test_get_by_id_after_eviction() {
        let mut store = PageStore::new(2);
        for first in [0, 10, 20] {
            store.append(page(first, 10, Direction::Forward)).unwrap();
        }
        let evicted = store.evict_if_needed(29);

        assert_eq!(evicted, vec![0..=9]);
        assert_eq!(store.first_id(), Some(10));
        assert!(store.get(5).is_none());
        assert_eq!(store.get(15).map(|r| r.payload.as_str()), Some("row 15"));
        assert_eq!(store.get_at(0).map(|r| r.id), Some(10));
    }

    #[test]
    fn test_eviction_bound_holds() {
        let mut store = PageStore::new(3);
        for n in 0..8u64 {
            store.append(page(n * 10, 10, Direction::Forward)).unwrap();
            let anchor = store.last_id().unwrap();
            store.evict_if_needed(anchor);
            assert!(store.page_count() <= 3);
            let run = ids(&store);
            assert!(run.windows(2).all(|w| w[1] == w[0] + 1));
        }
        assert_eq!(store.id_range(), Some(50..=79));
    }

    #[derive(Debug)]
    struct MiddlePolicy;

    impl EvictionPolicy for MiddlePolicy {
        fn select_evictions(
            &self,
            pages: &[RangeInclusive<u64>],
            _anchor_id: u64,
            _max_resident: usize,
        ) -> Vec<usize> {
            vec![pages.len() / 2]
        }

        fn name(&self) -> &str {
            "middle"
        }
    }

    #[test]
    fn test_gap_from_custom_policy_is_trimmed() {
        let mut store = PageStore::with_policy(3, Arc::new(MiddlePolicy));
        for first in [0, 10, 20, 30] {
            store.append(page(first, 10, Direction::Forward)).unwrap();
        }
        let evicted = store.evict_if_needed(39);

        assert_eq!(ids(&store), (30..40).collect::<Vec<_>>());
        assert_eq!(evicted, vec![0..=9, 10..=19, 20..=29]);
        assert_eq!(store.len(), 10);
    }
}
