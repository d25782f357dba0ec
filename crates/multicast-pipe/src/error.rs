//! Error types for the multicast-pipe crate.
//!
//! Per-subscriber delivery failures never appear here: they are absorbed by
//! detaching the subscriber. Only producer-visible conditions are errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipeError {
    /// `subscribe`, `write` or `flush` was called after `close`.
    #[error("Pipe already closed")]
    Closed,

    /// Reading from the source being pumped into the pipe failed.
    #[error("Source read error: {0}")]
    Source(#[source] std::io::Error),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, PipeError>;
