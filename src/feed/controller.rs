//! Pagination controller: cursor derivation and per-direction fetch state.

use super::{DataSource, Direction, FeedError, FeedResult, FetchResponse, Page, PageStore};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use tracing::{debug, info, warn};

/// Fetch state of one direction
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FetchState {
    /// Nothing in flight
    #[default]
    Idle,
    /// A fetch with this cursor is outstanding
    Fetching { cursor: u64 },
    /// The last fetch failed; behaves like `Idle` for new triggers
    Error(String),
}

impl FetchState {
    pub fn is_fetching(&self) -> bool {
        matches!(self, FetchState::Fetching { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            FetchState::Error(message) => Some(message),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FetchState::Idle => "idle",
            FetchState::Fetching { .. } => "fetching",
            FetchState::Error(_) => "error",
        }
    }
}

/// A fetch that was started and must be handed back to
/// [`PaginationController::complete_fetch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FetchRequest {
    pub direction: Direction,
    pub cursor: u64,
    pub limit: usize,
}

/// What a successful completion changed in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub direction: Direction,

    /// Ids added by the page, `None` for an empty page
    pub inserted: Option<RangeInclusive<u64>>,

    /// Id ranges dropped by eviction
    pub evicted: Vec<RangeInclusive<u64>>,
}

impl CommitReport {
    pub fn inserted_len(&self) -> u64 {
        self.inserted
            .as_ref()
            .map_or(0, |range| range.end() - range.start() + 1)
    }

    pub fn evicted_len(&self) -> u64 {
        self.evicted
            .iter()
            .map(|range| range.end() - range.start() + 1)
            .sum()
    }
}

/// Paging parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Records requested per fetch
    pub page_size: usize,

    /// Cursor of the very first forward fetch
    pub initial_cursor: u64,

    /// Pages kept resident before eviction kicks in
    pub max_resident_pages: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            initial_cursor: 0,
            max_resident_pages: 3,
        }
    }
}

/// Orchestrates forward and backward fetches against a [`PageStore`].
///
/// Each direction runs `Idle -> Fetching -> Idle` on success and
/// `Idle -> Fetching -> Error` on failure. Starting a fetch and committing
/// its result are separate calls so a front end can run the I/O elsewhere
/// and apply the result on its own schedule.
#[derive(Debug)]
pub struct PaginationController<T> {
    config: FeedConfig,
    store: PageStore<T>,
    forward: FetchState,
    backward: FetchState,

    /// First id known not to exist going forward
    forward_end: Option<u64>,

    /// Lowest id known to exist; nothing lies before it
    backward_end: Option<u64>,
}

impl<T> PaginationController<T> {
    pub fn new(config: FeedConfig) -> Self {
        let store = PageStore::new(config.max_resident_pages);
        Self::with_store(config, store)
    }

    /// Use a preconfigured store, e.g. one with a custom eviction policy
    pub fn with_store(config: FeedConfig, store: PageStore<T>) -> Self {
        Self {
            config,
            store,
            forward: FetchState::Idle,
            backward: FetchState::Idle,
            forward_end: None,
            backward_end: None,
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn store(&self) -> &PageStore<T> {
        &self.store
    }

    pub fn state(&self, direction: Direction) -> &FetchState {
        match direction {
            Direction::Forward => &self.forward,
            Direction::Backward => &self.backward,
        }
    }

    pub fn is_fetching(&self, direction: Direction) -> bool {
        self.state(direction).is_fetching()
    }

    /// Cursor for the next forward fetch
    pub fn next_cursor(&self) -> Option<u64> {
        let cursor = match self.store.last_id() {
            Some(last) => last + 1,
            None => self.config.initial_cursor,
        };
        match self.forward_end {
            Some(end) if cursor >= end => None,
            _ => Some(cursor),
        }
    }

    /// Cursor for the next backward fetch
    pub fn previous_cursor(&self) -> Option<u64> {
        let first = self.store.first_id()?;
        if first == 0 {
            return None;
        }
        match self.backward_end {
            Some(end) if first <= end => None,
            _ => Some(first),
        }
    }

    pub fn has_next_page(&self) -> bool {
        self.next_cursor().is_some()
    }

    pub fn has_previous_page(&self) -> bool {
        self.previous_cursor().is_some()
    }

    /// Forget that the source was exhausted going forward, so the live
    /// edge is probed again
    pub fn reset_forward_end(&mut self) {
        if self.forward_end.take().is_some() {
            debug!("forward end cleared");
        }
    }

    /// Mark a direction as fetching and return the request to run
    pub fn begin_fetch(&mut self, direction: Direction) -> FeedResult<FetchRequest> {
        if self.is_fetching(direction) {
            return Err(FeedError::FetchAlreadyInProgress(direction));
        }

        let cursor = match direction {
            Direction::Forward => self.next_cursor(),
            Direction::Backward => self.previous_cursor(),
        }
        .ok_or(FeedError::NoMoreData(direction))?;

        let limit = match direction {
            Direction::Forward => self.config.page_size,
            Direction::Backward => {
                let below = usize::try_from(cursor).unwrap_or(usize::MAX);
                self.config.page_size.min(below)
            }
        };

        *self.state_mut(direction) = FetchState::Fetching { cursor };
        debug!(%direction, cursor, limit, "fetch started");

        Ok(FetchRequest {
            direction,
            cursor,
            limit,
        })
    }

    /// Apply the outcome of a fetch started with [`Self::begin_fetch`].
    /// Eviction keeps the edge that was just extended.
    pub fn complete_fetch(
        &mut self,
        request: FetchRequest,
        outcome: FeedResult<FetchResponse<T>>,
    ) -> FeedResult<CommitReport> {
        self.complete_fetch_near(request, outcome, None)
    }

    /// Like [`Self::complete_fetch`], but eviction keeps the pages closest
    /// to `keep_id`, normally the record under the viewport
    pub fn complete_fetch_near(
        &mut self,
        request: FetchRequest,
        outcome: FeedResult<FetchResponse<T>>,
        keep_id: Option<u64>,
    ) -> FeedResult<CommitReport> {
        let direction = request.direction;
        if *self.state(direction) != (FetchState::Fetching { cursor: request.cursor }) {
            return Err(FeedError::UnexpectedCompletion(direction));
        }

        // The other direction committed and evicted while this one was in flight
        if !self.store.is_empty() && self.edge_cursor(direction) != Some(request.cursor) {
            debug!(%direction, cursor = request.cursor, "dropping stale completion");
            *self.state_mut(direction) = FetchState::Idle;
            return Err(FeedError::StalePage {
                direction,
                cursor: request.cursor,
            });
        }

        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                let err = match err {
                    FeedError::FetchFailed(_) => err,
                    other => FeedError::FetchFailed(other.to_string()),
                };
                warn!(%direction, cursor = request.cursor, error = %err, "fetch failed");
                *self.state_mut(direction) = FetchState::Error(err.to_string());
                return Err(err);
            }
        };

        match self.commit(request, response, keep_id) {
            Ok(report) => {
                *self.state_mut(direction) = FetchState::Idle;
                info!(
                    %direction,
                    cursor = request.cursor,
                    inserted = report.inserted_len(),
                    evicted = report.evicted_len(),
                    resident_pages = self.store.page_count(),
                    "page committed"
                );
                Ok(report)
            }
            Err(err) => {
                warn!(%direction, cursor = request.cursor, error = %err, "page rejected");
                *self.state_mut(direction) = FetchState::Error(err.to_string());
                Err(err)
            }
        }
    }

    /// Fetch and commit the next forward page
    pub async fn fetch_next(&mut self, source: &dyn DataSource<T>) -> FeedResult<CommitReport> {
        self.fetch(Direction::Forward, source).await
    }

    /// Fetch and commit the previous backward page
    pub async fn fetch_previous(&mut self, source: &dyn DataSource<T>) -> FeedResult<CommitReport> {
        self.fetch(Direction::Backward, source).await
    }

    async fn fetch(
        &mut self,
        direction: Direction,
        source: &dyn DataSource<T>,
    ) -> FeedResult<CommitReport> {
        let request = self.begin_fetch(direction)?;
        let outcome = source
            .fetch(request.limit, request.cursor, request.direction)
            .await;
        self.complete_fetch(request, outcome)
    }

    fn commit(
        &mut self,
        request: FetchRequest,
        response: FetchResponse<T>,
        keep_id: Option<u64>,
    ) -> FeedResult<CommitReport> {
        let page = Page::new(
            response.records,
            request.cursor,
            request.direction,
            response.next_cursor,
        );
        Self::check_against_cursor(&page, request)?;

        let inserted = page.id_range();
        let terminal = page.is_terminal();
        match request.direction {
            Direction::Forward => {
                let end = page.last_id().map_or(request.cursor, |last| last + 1);
                self.store.append(page)?;
                if terminal {
                    debug!(end, "forward end reached");
                    self.forward_end = Some(end);
                }
            }
            Direction::Backward => {
                let start = page.first_id().unwrap_or(request.cursor);
                self.store.prepend(page)?;
                if terminal {
                    debug!(start, "backward end reached");
                    self.backward_end = Some(start);
                }
            }
        }

        let anchor = keep_id.or(match request.direction {
            Direction::Forward => self.store.last_id(),
            Direction::Backward => self.store.first_id(),
        });
        let evicted = anchor
            .map(|anchor_id| self.store.evict_if_needed(anchor_id))
            .unwrap_or_default();

        Ok(CommitReport {
            direction: request.direction,
            inserted,
            evicted,
        })
    }

    /// Cursor a fetch in `direction` must carry to attach to the store
    fn edge_cursor(&self, direction: Direction) -> Option<u64> {
        match direction {
            Direction::Forward => self.store.last_id().map(|last| last + 1),
            Direction::Backward => self.store.first_id(),
        }
    }

    /// The page must touch the cursor it was requested with
    fn check_against_cursor(page: &Page<T>, request: FetchRequest) -> FeedResult<()> {
        match request.direction {
            Direction::Forward => match page.first_id() {
                Some(first) if first != request.cursor => Err(FeedError::OutOfOrderPage {
                    expected: request.cursor,
                    found: first,
                }),
                _ => Ok(()),
            },
            Direction::Backward => match page.last_id() {
                Some(last) if last.checked_add(1) != Some(request.cursor) => {
                    Err(FeedError::OutOfOrderPage {
                        expected: request.cursor.saturating_sub(1),
                        found: last,
                    })
                }
                _ => Ok(()),
            },
        }
    }

    fn state_mut(&mut self, direction: Direction) -> &mut FetchState {
        match direction {
            Direction::Forward => &mut self.forward,
            Direction::Backward => &mut self.backward,
        }
    }
}
