//! Bidirectional infinite scrolling over a cursor-paginated feed.
//!
//! The core is split into three layers that know nothing about terminals:
//!
//! - [`feed`]: the page cache, eviction and the per-direction fetch state
//!   machine driven against an async [`feed::DataSource`].
//! - [`virtualizer`]: windowed layout of a long list of variably sized items.
//! - [`scroll`]: the coordinator deciding when to fetch and keeping the scroll
//!   position anchored while pages are inserted and evicted.
//!
//! [`cli`] and [`tui`] wire them to a command line and a ratatui front end.

pub mod cli;
pub mod config;
pub mod feed;
pub mod scroll;
pub mod tui;
pub mod virtualizer;
