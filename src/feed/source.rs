//! Data source trait and the delay-based stub generator

use super::{Direction, FeedError, FeedResult, Record};
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tracing::debug;

/// Result of one fetch call
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse<T> {
    /// Records in ascending id order
    pub records: Vec<Record<T>>,

    /// Cursor for continuing in the requested direction, `None` when exhausted
    pub next_cursor: Option<u64>,
}

/// Supplies records page by page.
///
/// A forward fetch returns ids `cursor..cursor + limit`; a backward fetch
/// returns the `limit` ids ending just before `cursor`. Records are always
/// ascending by id.
#[async_trait]
pub trait DataSource<T>: Send + Sync {
    /// Fetch up to `limit` records next to `cursor`
    async fn fetch(
        &self,
        limit: usize,
        cursor: u64,
        direction: Direction,
    ) -> FeedResult<FetchResponse<T>>;

    /// Source name for logging
    fn name(&self) -> &str;
}

/// Stub backend generating `"Async loaded row #<id>"` rows after a delay
#[derive(Debug, Clone)]
pub struct DelayedSource {
    /// Simulated round trip
    latency: Duration,

    /// Exclusive upper bound on ids; unbounded when `None`
    end: Option<u64>,

    /// Probability in `[0, 1]` that a fetch fails
    failure_rate: f64,
}

impl Default for DelayedSource {
    fn default() -> Self {
        Self::new(Duration::from_millis(2000))
    }
}

impl DelayedSource {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            end: None,
            failure_rate: 0.0,
        }
    }

    /// Stop producing records at `end` (exclusive)
    pub fn with_end(mut self, end: Option<u64>) -> Self {
        self.end = end;
        self
    }

    /// Fail fetches with the given probability
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    /// Ids a request covers, clipped to `[0, end)`
    fn id_span(&self, limit: usize, cursor: u64, direction: Direction) -> std::ops::Range<u64> {
        let limit = limit as u64;
        let (start, stop) = match direction {
            Direction::Forward => (cursor, cursor.saturating_add(limit)),
            Direction::Backward => (cursor.saturating_sub(limit), cursor),
        };
        match self.end {
            Some(end) => start.min(end)..stop.min(end),
            None => start..stop,
        }
    }

    fn should_fail(&self) -> bool {
        self.failure_rate > 0.0 && rand::thread_rng().gen_bool(self.failure_rate)
    }
}

#[async_trait]
impl DataSource<String> for DelayedSource {
    async fn fetch(
        &self,
        limit: usize,
        cursor: u64,
        direction: Direction,
    ) -> FeedResult<FetchResponse<String>> {
        debug!(limit, cursor, %direction, "fetching server page");

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.should_fail() {
            return Err(FeedError::FetchFailed(format!(
                "simulated failure at cursor {}",
                cursor
            )));
        }

        let span = self.id_span(limit, cursor, direction);
        let records: Vec<Record<String>> = span
            .clone()
            .map(|id| Record::new(id, format!("Async loaded row #{}", id)))
            .collect();

        let next_cursor = match direction {
            Direction::Forward => match self.end {
                Some(end) if span.end >= end => None,
                _ => Some(span.end),
            },
            Direction::Backward => (span.start > 0).then_some(span.start),
        };

        debug!(
            from = span.start,
            to = span.end,
            next_cursor = ?next_cursor,
            "returning rows"
        );
        Ok(FetchResponse {
            records,
            next_cursor,
        })
    }

    fn name(&self) -> &str {
        "delayed"
    }
}
