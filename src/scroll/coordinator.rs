//! Bridges the virtualizer and the pagination controller.

use super::{LoaderState, ScrollAnchor, Slot, SlotMap};
use crate::feed::{
    CommitReport, DataSource, Direction, FeedConfig, FeedError, FeedResult, FetchRequest,
    FetchResponse, FetchState, PaginationController,
};
use crate::virtualizer::{Layout, Virtualizer, VirtualizerOptions};
use serde::Serialize;
use std::ops::RangeInclusive;
use tracing::{debug, info, warn};

/// Load status of the whole list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum ListStatus {
    /// Initial load not finished yet
    Pending,
    /// At least one page was loaded
    Ready,
    /// The initial load failed; blocks the whole list
    Error(String),
}

/// Point-in-time summary for status lines and headless output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListSnapshot {
    pub status: ListStatus,
    pub resident_ids: Option<RangeInclusive<u64>>,
    pub resident_records: usize,
    pub resident_pages: usize,
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub forward: &'static str,
    pub backward: &'static str,
    pub count: usize,
    pub visible: Option<RangeInclusive<usize>>,
    pub scroll_offset: f64,
    pub total_size: f64,
    pub follow_live: bool,
    pub last_error: Option<String>,
}

/// Keeps the virtual window and the page cache consistent.
///
/// After every input change the front end calls [`ScrollCoordinator::poll`]
/// to learn whether a fetch should start, runs it, and hands the outcome to
/// [`ScrollCoordinator::complete`]. A completion commits the page and fixes
/// the scroll offset in the same call, so no layout pass ever sees the new
/// records without the compensating offset.
#[derive(Debug)]
pub struct ScrollCoordinator<T> {
    controller: PaginationController<T>,
    virtualizer: Virtualizer,
    status: ListStatus,

    /// Keep the view pinned to the forward edge
    follow_live: bool,

    /// Most recent mid-stream failure
    last_error: Option<String>,
}

impl<T> ScrollCoordinator<T> {
    pub fn new(feed: FeedConfig, options: VirtualizerOptions) -> Self {
        Self::with_controller(PaginationController::new(feed), options)
    }

    pub fn with_controller(controller: PaginationController<T>, options: VirtualizerOptions) -> Self {
        let mut coordinator = Self {
            controller,
            virtualizer: Virtualizer::new(options),
            status: ListStatus::Pending,
            follow_live: true,
            last_error: None,
        };
        coordinator.sync_count(None);
        coordinator
    }

    pub fn controller(&self) -> &PaginationController<T> {
        &self.controller
    }

    pub fn virtualizer(&self) -> &Virtualizer {
        &self.virtualizer
    }

    pub fn status(&self) -> &ListStatus {
        &self.status
    }

    pub fn is_following_live(&self) -> bool {
        self.follow_live
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Current slot layout
    pub fn slot_map(&self) -> SlotMap {
        let store = self.controller.store();
        let ready = self.status == ListStatus::Ready;
        SlotMap {
            head: usize::from(ready && self.controller.has_previous_page()),
            first_id: store.first_id(),
            records: store.len(),
            tail: usize::from(ready && self.controller.has_next_page()),
        }
    }

    /// Placeholder state shown for a loader in `direction`
    pub fn loader_state(&self, direction: Direction) -> LoaderState {
        let more = match direction {
            Direction::Forward => self.controller.has_next_page(),
            Direction::Backward => self.controller.has_previous_page(),
        };
        if more || self.controller.is_fetching(direction) {
            LoaderState::Loading
        } else {
            LoaderState::NoMoreData
        }
    }

    /// Content of a virtual index
    pub fn slot(&self, index: usize) -> Option<Slot<'_, T>> {
        let map = self.slot_map();
        if index >= map.count() {
            return None;
        }
        if index < map.head {
            return Some(Slot::Loader {
                direction: Direction::Backward,
                state: self.loader_state(Direction::Backward),
            });
        }
        match map.id_at(index) {
            Some(id) => self.controller.store().get(id).map(Slot::Record),
            None => Some(Slot::Loader {
                direction: Direction::Forward,
                state: self.loader_state(Direction::Forward),
            }),
        }
    }

    /// Items to render for the current inputs
    pub fn layout(&self) -> Layout {
        self.virtualizer.layout()
    }

    pub fn set_viewport_size(&mut self, size: f64) {
        self.virtualizer.set_viewport_size(size);
        if self.follow_live {
            self.virtualizer.scroll_to_offset(f64::INFINITY);
        }
    }

    /// User scroll. Scrolling up leaves live mode, reaching the end re-enters it.
    pub fn scroll_by(&mut self, delta: f64) {
        self.virtualizer.scroll_by(delta);
        self.update_follow(delta < 0.0);
    }

    /// Absolute user scroll; the infinities jump to the ends
    pub fn scroll_to_offset(&mut self, value: f64) {
        let before = self.virtualizer.scroll_offset();
        let after = self.virtualizer.scroll_to_offset(value);
        self.update_follow(after < before);
    }

    /// Jump to the live edge and stay there as new data arrives
    pub fn resume_live(&mut self) {
        info!("resuming live tail");
        self.controller.reset_forward_end();
        self.sync_count(None);
        self.follow_live = true;
        self.virtualizer.scroll_to_offset(f64::INFINITY);
    }

    /// Allow the initial load to run again after it failed
    pub fn retry(&mut self) {
        if let ListStatus::Error(message) = &self.status {
            info!(error = %message, "retrying initial load");
            self.status = ListStatus::Pending;
        }
    }

    /// Record the real size of a rendered item
    pub fn measure(&mut self, index: usize, size: f64) {
        self.virtualizer.measure(index, size);
    }

    /// Which fetch the current window calls for, if any.
    ///
    /// Forward wins when both ends are touched: the backward check stands
    /// down whenever the forward boundary is reached.
    pub fn next_action(&self) -> Option<Direction> {
        match self.status {
            ListStatus::Error(_) => return None,
            ListStatus::Pending => {
                let idle = !self.controller.is_fetching(Direction::Forward);
                return (idle && self.controller.store().is_empty()).then_some(Direction::Forward);
            }
            ListStatus::Ready => {}
        }

        let layout = self.virtualizer.layout();
        let (first, last) = (layout.first()?, layout.last()?);
        let map = self.slot_map();

        // Last materialized item at or past the last known record
        let forward_boundary = last.index + 1 >= map.head + map.records;
        if forward_boundary
            && self.controller.has_next_page()
            && !self.controller.is_fetching(Direction::Forward)
        {
            debug!(last = last.index, "forward boundary reached");
            return Some(Direction::Forward);
        }

        // First materialized item at or above the first known record
        let backward_boundary = first.index <= map.head;
        if backward_boundary
            && !forward_boundary
            && self.controller.has_previous_page()
            && !self.controller.is_fetching(Direction::Backward)
        {
            debug!(first = first.index, "backward boundary reached");
            return Some(Direction::Backward);
        }

        None
    }

    /// Start the fetch the window calls for
    pub fn poll(&mut self) -> Option<FetchRequest> {
        let direction = self.next_action()?;
        match self.begin_fetch(direction) {
            Ok(request) => Some(request),
            Err(err) => {
                debug!(error = %err, "trigger dropped");
                None
            }
        }
    }

    /// Start a fetch regardless of the window position
    pub fn begin_fetch(&mut self, direction: Direction) -> FeedResult<FetchRequest> {
        self.controller.begin_fetch(direction)
    }

    /// Commit a fetch outcome and compensate the scroll offset in one step
    pub fn complete(
        &mut self,
        request: FetchRequest,
        outcome: FeedResult<FetchResponse<T>>,
    ) -> FeedResult<CommitReport> {
        let before = self.slot_map();
        let anchor = self.capture_anchor(&before);

        // Eviction keeps the pages around the viewport
        let keep_id = anchor.map(|anchor| anchor.id);
        let result = self.controller.complete_fetch_near(request, outcome, keep_id);
        match &result {
            Ok(report) => {
                self.last_error = None;
                if self.status == ListStatus::Pending {
                    // First data: establish live-tail mode once
                    self.status = ListStatus::Ready;
                    self.follow_live = true;
                    self.sync_count(None);
                    self.virtualizer.scroll_to_offset(f64::INFINITY);
                    info!(loaded = report.inserted_len(), "initial load finished");
                } else {
                    self.sync_count(before.base());
                    self.restore_anchor(anchor);
                    if report.direction == Direction::Forward && self.follow_live {
                        self.virtualizer.scroll_to_offset(f64::INFINITY);
                    }
                }
            }
            Err(FeedError::UnexpectedCompletion(_) | FeedError::StalePage { .. }) => {}
            Err(err) => {
                if self.status == ListStatus::Pending {
                    warn!(error = %err, "initial load failed");
                    self.status = ListStatus::Error(err.to_string());
                } else {
                    self.last_error = Some(err.to_string());
                }
            }
        }
        result
    }

    /// Run poll, fetch and complete until nothing is requested, a step fails,
    /// or `max_steps` fetches ran. Returns the number of committed pages.
    pub async fn settle(&mut self, source: &dyn DataSource<T>, max_steps: usize) -> usize {
        let mut committed = 0;
        for _ in 0..max_steps {
            let Some(request) = self.poll() else {
                break;
            };
            let outcome = source
                .fetch(request.limit, request.cursor, request.direction)
                .await;
            if self.complete(request, outcome).is_err() {
                break;
            }
            committed += 1;
        }
        committed
    }

    /// Summary of the current state
    pub fn snapshot(&self) -> ListSnapshot {
        let store = self.controller.store();
        let layout = self.virtualizer.layout();
        let visible = (!layout.visible.is_empty())
            .then(|| layout.visible.start..=layout.visible.end - 1);
        ListSnapshot {
            status: self.status.clone(),
            resident_ids: store.id_range(),
            resident_records: store.len(),
            resident_pages: store.page_count(),
            has_next_page: self.controller.has_next_page(),
            has_previous_page: self.controller.has_previous_page(),
            forward: self.controller.state(Direction::Forward).label(),
            backward: self.controller.state(Direction::Backward).label(),
            count: self.virtualizer.count(),
            visible,
            scroll_offset: self.virtualizer.scroll_offset(),
            total_size: layout.total_size,
            follow_live: self.follow_live,
            last_error: self.last_error.clone(),
        }
    }

    pub fn fetch_state(&self, direction: Direction) -> &FetchState {
        self.controller.state(direction)
    }

    fn update_follow(&mut self, moved_up: bool) {
        if moved_up {
            self.follow_live = false;
        }
        if self.virtualizer.is_at_end() {
            self.follow_live = true;
        }
    }

    /// Record under the viewport top, falling back to the nearest record
    /// when a loader slot is there
    fn capture_anchor(&self, map: &SlotMap) -> Option<ScrollAnchor> {
        let (first_record, last_record) = map.record_indices()?;
        let offset = self.virtualizer.scroll_offset();
        let top = self.virtualizer.index_at(offset)?;
        let index = top.clamp(first_record, last_record);
        let id = map.id_at(index)?;
        Some(ScrollAnchor {
            id,
            offset_within: offset - self.virtualizer.offset_of(index),
        })
    }

    fn restore_anchor(&mut self, anchor: Option<ScrollAnchor>) {
        let map = self.slot_map();
        let Some(index) = anchor.and_then(|anchor| anchor.resolve(&map)) else {
            return;
        };
        let within = anchor.map_or(0.0, |anchor| anchor.offset_within);
        let target = self.virtualizer.offset_of(index) + within;
        debug!(index, target, "restoring scroll anchor");
        self.virtualizer.scroll_to_offset(target);
    }

    /// Push the slot count into the virtualizer, moving measurements along
    /// with the records they belong to
    fn sync_count(&mut self, previous_base: Option<i64>) {
        let map = self.slot_map();
        if let (Some(before), Some(after)) = (previous_base, map.base()) {
            self.virtualizer.shift_measurements(after - before);
        }
        self.virtualizer.set_count(map.count());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{DelayedSource, Record};
    use std::time::Duration;

    fn coordinator() -> ScrollCoordinator<String> {
        // 5 rows of 100 visible, no overscan unless a test asks for it
        let options = VirtualizerOptions::default()
            .with_viewport_size(500.0)
            .with_estimate_size(100.0)
            .with_overscan(0);
        ScrollCoordinator::new(FeedConfig::default(), options)
    }

    fn source() -> DelayedSource {
        DelayedSource::new(Duration::ZERO)
    }

    fn page(ids: std::ops::Range<u64>) -> FeedResult<FetchResponse<String>> {
        let next_cursor = Some(ids.end);
        Ok(FetchResponse {
            records: ids.map(|id| Record::new(id, format!("Async loaded row #{}", id))).collect(),
            next_cursor,
        })
    }

    /// Drive the coordinator through a fetch of `direction` without
    /// looking at the window
    async fn force(coordinator: &mut ScrollCoordinator<String>, direction: Direction) -> CommitReport {
        let request = coordinator.begin_fetch(direction).unwrap();
        let outcome = source()
            .fetch(request.limit, request.cursor, request.direction)
            .await;
        coordinator.complete(request, outcome).unwrap()
    }

    fn top_record(coordinator: &ScrollCoordinator<String>) -> Option<u64> {
        let offset = coordinator.virtualizer().scroll_offset();
        let index = coordinator.virtualizer().index_at(offset)?;
        coordinator.slot(index)?.record().map(|record| record.id)
    }

    #[tokio::test]
    async fn test_initial_load_pins_to_live_edge() {
        let mut c = coordinator();
        assert_eq!(c.status(), &ListStatus::Pending);
        assert_eq!(c.next_action(), Some(Direction::Forward));

        let request = c.poll().unwrap();
        assert_eq!(request.cursor, 0);
        assert_eq!(request.limit, 10);
        // Initial fetch in flight, nothing else is requested
        assert_eq!(c.poll(), None);

        c.complete(request, page(0..10)).unwrap();
        assert_eq!(c.status(), &ListStatus::Ready);
        assert!(c.is_following_live());

        // 10 records plus the tail loader; no head loader below id 0
        let map = c.slot_map();
        assert_eq!((map.head, map.records, map.tail), (0, 10, 1));
        assert_eq!(c.virtualizer().scroll_offset(), 600.0);
        assert!(matches!(
            c.slot(10),
            Some(Slot::Loader { direction: Direction::Forward, state: LoaderState::Loading })
        ));
    }

    #[tokio::test]
    async fn test_tail_trigger_then_no_backward_below_zero() {
        let mut c = coordinator();
        let request = c.poll().unwrap();
        c.complete(request, page(0..10)).unwrap();

        // At the tail: the loader slot is visible
        let request = c.poll().unwrap();
        assert_eq!(request.direction, Direction::Forward);
        assert_eq!(request.cursor, 10);
        c.complete(request, page(10..20)).unwrap();

        c.scroll_to_offset(f64::NEG_INFINITY);
        assert!(!c.controller().has_previous_page());
        assert_eq!(c.next_action(), None);
        assert_eq!(top_record(&c), Some(0));
    }

    #[tokio::test]
    async fn test_forward_wins_when_both_boundaries_touch() {
        let mut c = coordinator();
        for _ in 0..4 {
            force(&mut c, Direction::Forward).await;
        }
        // Ids 10..39 resident, both loaders present
        assert!(c.controller().has_previous_page());

        c.virtualizer.set_overscan(40);
        assert_eq!(c.next_action(), Some(Direction::Forward));

        // With forward in flight the backward check still stands down
        let request = c.poll().unwrap();
        assert_eq!(request.direction, Direction::Forward);
        assert_eq!(c.next_action(), None);
        assert_eq!(c.poll(), None);
    }

    #[tokio::test]
    async fn test_duplicate_trigger_is_dropped() {
        let mut c = coordinator();
        for _ in 0..4 {
            force(&mut c, Direction::Forward).await;
        }
        c.scroll_to_offset(f64::NEG_INFINITY);
        let request = c.poll().unwrap();
        assert_eq!(request.direction, Direction::Backward);

        assert_eq!(c.next_action(), None);
        assert_eq!(
            c.begin_fetch(Direction::Backward),
            Err(FeedError::FetchAlreadyInProgress(Direction::Backward))
        );
    }

    #[tokio::test]
    async fn test_backward_prepend_preserves_anchor() {
        let mut c = coordinator();
        for _ in 0..5 {
            force(&mut c, Direction::Forward).await;
        }
        // Ids 20..49 resident behind a head loader
        assert_eq!(c.controller().store().first_id(), Some(20));

        // Viewport top halfway into record 20, right below the head loader
        c.scroll_to_offset(150.0);
        assert!(!c.is_following_live());
        assert_eq!(top_record(&c), Some(20));

        let request = c.poll().unwrap();
        assert_eq!(request.direction, Direction::Backward);
        assert_eq!(request.cursor, 20);

        let report = c.complete(request, page(10..20)).unwrap();
        assert_eq!(report.evicted, vec![40..=49]);

        // 10 items of 100 were inserted above the viewport
        assert_eq!(c.virtualizer().scroll_offset(), 1150.0);
        assert_eq!(top_record(&c), Some(20));
    }

    #[tokio::test]
    async fn test_prepend_reaching_zero_drops_head_loader_without_jump() {
        let mut c = coordinator();
        for _ in 0..4 {
            force(&mut c, Direction::Forward).await;
        }
        c.scroll_to_offset(150.0);
        assert_eq!(top_record(&c), Some(10));

        force(&mut c, Direction::Backward).await;
        assert_eq!(c.slot_map().head, 0);
        // 10 records in, one loader slot out
        assert_eq!(c.virtualizer().scroll_offset(), 1050.0);
        assert_eq!(top_record(&c), Some(10));
    }

    #[tokio::test]
    async fn test_forward_eviction_keeps_view_when_not_live() {
        let mut c = coordinator();
        for _ in 0..3 {
            force(&mut c, Direction::Forward).await;
        }
        c.scroll_to_offset(2500.0);
        c.scroll_by(-100.0);
        assert!(!c.is_following_live());
        let top = top_record(&c);
        assert_eq!(top, Some(24));

        let report = force(&mut c, Direction::Forward).await;
        assert_eq!(report.evicted, vec![0..=9]);
        assert_eq!(top_record(&c), top);
    }

    #[tokio::test]
    async fn test_late_backward_page_does_not_move_tail_view() {
        let mut c = coordinator();
        for _ in 0..4 {
            force(&mut c, Direction::Forward).await;
        }

        // Backward requested at the top, then the user returns to the tail
        c.scroll_to_offset(f64::NEG_INFINITY);
        let backward = c.poll().unwrap();
        assert_eq!(backward.direction, Direction::Backward);
        c.scroll_to_offset(f64::INFINITY);
        c.scroll_by(-100.0);
        let forward = c.poll().unwrap();
        assert_eq!(forward.direction, Direction::Forward);
        assert_eq!(forward.cursor, 40);
        assert_eq!(top_record(&c), Some(35));

        let report = c.complete(backward, page(0..10)).unwrap();
        assert_eq!(report.evicted, vec![0..=9]);
        assert_eq!(top_record(&c), Some(35));
        assert_eq!(c.controller().store().id_range(), Some(10..=39));

        let report = c.complete(forward, page(40..50)).unwrap();
        assert_eq!(report.evicted, vec![10..=19]);
        assert_eq!(top_record(&c), Some(35));
        assert_eq!(c.last_error(), None);
    }

    #[tokio::test]
    async fn test_stale_completion_is_not_an_error() {
        let mut c = coordinator();
        for _ in 0..4 {
            force(&mut c, Direction::Forward).await;
        }
        c.scroll_to_offset(f64::NEG_INFINITY);
        let backward = c.poll().unwrap();
        let forward = c.begin_fetch(Direction::Forward).unwrap();

        // Viewport at the top: the prepend evicts the forward edge
        let report = c.complete(backward, page(0..10)).unwrap();
        assert_eq!(report.evicted, vec![30..=39]);

        assert_eq!(
            c.complete(forward, page(40..50)),
            Err(FeedError::StalePage { direction: Direction::Forward, cursor: 40 })
        );
        assert_eq!(c.last_error(), None);
        assert_eq!(c.fetch_state(Direction::Forward), &FetchState::Idle);
        assert_eq!(c.controller().store().id_range(), Some(0..=29));
    }

    #[tokio::test]
    async fn test_forward_completion_follows_live_edge() {
        let mut c = coordinator();
        force(&mut c, Direction::Forward).await;
        force(&mut c, Direction::Forward).await;
        assert!(c.virtualizer().is_at_end());
        assert!(c.is_following_live());
    }

    #[tokio::test]
    async fn test_initial_failure_blocks_until_retry() {
        let mut c = coordinator();
        let request = c.poll().unwrap();
        let err = c
            .complete(request, Err(FeedError::FetchFailed("offline".to_string())))
            .unwrap_err();

        assert_eq!(err, FeedError::FetchFailed("offline".to_string()));
        assert_eq!(
            c.status(),
            &ListStatus::Error("Fetch failed: offline".to_string())
        );
        assert_eq!(c.next_action(), None);

        c.retry();
        assert_eq!(c.status(), &ListStatus::Pending);
        assert_eq!(c.next_action(), Some(Direction::Forward));
    }

    #[tokio::test]
    async fn test_mid_stream_failure_is_not_blocking() {
        let mut c = coordinator();
        force(&mut c, Direction::Forward).await;

        let request = c.poll().unwrap();
        c.complete(request, Err(FeedError::FetchFailed("flaky".to_string())))
            .unwrap_err();

        assert_eq!(c.status(), &ListStatus::Ready);
        assert_eq!(c.last_error(), Some("Fetch failed: flaky"));
        // Still at the boundary, so the next check retries
        assert_eq!(c.next_action(), Some(Direction::Forward));
    }

    #[tokio::test]
    async fn test_exhausted_feed_and_resume_live() {
        let mut c = coordinator();
        let source = source().with_end(Some(15));
        let committed = c.settle(&source, 10).await;

        assert_eq!(committed, 2);
        assert_eq!(c.slot_map().tail, 0);
        assert_eq!(c.loader_state(Direction::Forward), LoaderState::NoMoreData);
        assert_eq!(c.next_action(), None);

        c.scroll_by(-300.0);
        c.resume_live();
        assert!(c.is_following_live());
        assert_eq!(c.slot_map().tail, 1);
        assert!(c.virtualizer().is_at_end());
        assert_eq!(c.next_action(), Some(Direction::Forward));
    }

    #[tokio::test]
    async fn test_settle_respects_step_limit_at_live_edge() {
        let mut c = coordinator();
        let committed = c.settle(&source(), 6).await;

        assert_eq!(committed, 6);
        assert_eq!(c.controller().store().page_count(), 3);
        assert_eq!(c.controller().store().id_range(), Some(30..=59));
    }

    #[tokio::test]
    async fn test_layout_is_stable_between_inputs() {
        let mut c = coordinator();
        c.settle(&source(), 2).await;
        assert_eq!(c.layout(), c.layout());
        assert_eq!(c.snapshot(), c.snapshot());
    }

    #[tokio::test]
    async fn test_measurements_follow_prepended_records() {
        let mut c = coordinator();
        for _ in 0..5 {
            force(&mut c, Direction::Forward).await;
        }
        // Record 25 sits at slot 6 behind the head loader
        let index = c.slot_map().index_of(25).unwrap();
        assert_eq!(index, 6);
        c.measure(index, 300.0);

        c.scroll_to_offset(f64::NEG_INFINITY);
        force(&mut c, Direction::Backward).await;
        let moved = c.slot_map().index_of(25).unwrap();
        assert_eq!(moved, 16);
        assert_eq!(c.virtualizer().size_of(moved), 300.0);
        assert_eq!(c.virtualizer().size_of(index), 100.0);
    }
}
