//! Error types for the paginated feed

use super::Direction;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Out of order page: expected id {expected}, found {found}")]
    OutOfOrderPage { expected: u64, found: u64 },

    #[error("A {0} fetch is already in progress")]
    FetchAlreadyInProgress(Direction),

    #[error("No more data in the {0} direction")]
    NoMoreData(Direction),

    #[error("Completion does not match the in-flight {0} fetch")]
    UnexpectedCompletion(Direction),

    #[error("Stale {direction} page at cursor {cursor}: the resident range moved")]
    StalePage { direction: Direction, cursor: u64 },
}

impl FeedError {
    /// Rejections that only suppress a duplicate or pointless trigger
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            FeedError::FetchAlreadyInProgress(_)
                | FeedError::NoMoreData(_)
                | FeedError::StalePage { .. }
        )
    }
}

pub type FeedResult<T> = Result<T, FeedError>;
