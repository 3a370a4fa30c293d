//! Scroll coordination between the virtual window and the page cache.

pub mod anchor;
pub mod coordinator;

pub use anchor::*;
pub use coordinator::*;
