//! Turn-level error taxonomy.
//!
//! Only failures that abort a turn live here. Tool failures never do
//! (they become error-flagged tool results), store failures on
//! non-critical paths are logged and absorbed at the call site, and
//! budget blocks resolve at the router before a turn ever starts.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TurnError {
    /// The user sent a newer message; this turn stops with nothing
    /// persisted and no completion event.
    #[error("turn cancelled by a newer message")]
    Cancelled,

    /// The model provider failed mid-turn.
    #[error("provider error: {0}")]
    Provider(#[source] anyhow::Error),

    /// A store write on the critical path failed (e.g. persisting the
    /// final assistant message).
    #[error("store error: {0}")]
    Store(#[source] anyhow::Error),
}
