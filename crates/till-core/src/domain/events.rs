//! Events - progress notifications emitted by processors.

use std::fmt;

/// Progress-event vocabulary of one queue domain.
///
/// Events are observational only: nothing in the engine depends on them for
/// correctness. Every vocabulary must nevertheless be able to express the two
/// lifecycle events the plumbing emits on its own.
pub trait ProcessingEvent: Clone + fmt::Debug + Send + Sync + 'static {
    /// Emitted once when an item starts processing.
    fn started() -> Self;

    /// Emitted when a processor is aborted.
    fn canceled() -> Self;

    fn is_started(&self) -> bool;
}
