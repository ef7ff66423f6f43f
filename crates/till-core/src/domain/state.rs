//! State - engine-observable processing state.

use super::errors::ProcessingError;
use super::item::QueueItem;

/// Processing state of one queue run.
///
/// State transitions:
/// - Idle -> ItemProcessing -> ItemDone -> ... -> QueueDone
/// - ItemProcessing -> ItemFailed -> ItemRetrying (RETRY, same item re-dispatched)
/// - ItemProcessing -> ItemFailed -> ItemSkipped (SKIP, item moved to the tail)
/// - ItemProcessing -> ItemFailed -> ItemAborted (ABORT, item dropped)
/// - any -> QueueCanceled (ABORT_ALL, `abort()`, `clear_queue()` while running)
///
/// Exactly one state is current at a time; the queue manager is the only writer.
#[derive(Debug, Clone)]
pub enum ProcessingState<T: QueueItem> {
    /// Nothing has run yet (or the queue was reset).
    Idle,
    ItemProcessing(T),
    /// The item is dispatched again right after a RETRY decision.
    ItemRetrying(T),
    ItemDone {
        item: T,
        success: T::Success,
    },
    ItemFailed {
        item: T,
        error: ProcessingError,
    },
    /// Skipped at confirmation (dropped) or after a failure (moved to the tail).
    ItemSkipped(T),
    /// Dropped by an ABORT decision or removed while in flight.
    ItemAborted(T),
    QueueCanceled,
    QueueDone,
}

impl<T: QueueItem> Default for ProcessingState<T> {
    fn default() -> Self {
        ProcessingState::Idle
    }
}

impl<T: QueueItem> ProcessingState<T> {
    /// The item this state refers to, if any.
    pub fn item(&self) -> Option<&T> {
        match self {
            ProcessingState::ItemProcessing(item)
            | ProcessingState::ItemRetrying(item)
            | ProcessingState::ItemSkipped(item)
            | ProcessingState::ItemAborted(item)
            | ProcessingState::ItemDone { item, .. }
            | ProcessingState::ItemFailed { item, .. } => Some(item),
            ProcessingState::Idle
            | ProcessingState::QueueCanceled
            | ProcessingState::QueueDone => None,
        }
    }

    /// Is an item currently being dispatched to the processor?
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            ProcessingState::ItemProcessing(_) | ProcessingState::ItemRetrying(_)
        )
    }

    /// Does this state end a run?
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessingState::QueueCanceled | ProcessingState::QueueDone
        )
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            ProcessingState::Idle => "idle",
            ProcessingState::ItemProcessing(_) => "item_processing",
            ProcessingState::ItemRetrying(_) => "item_retrying",
            ProcessingState::ItemDone { .. } => "item_done",
            ProcessingState::ItemFailed { .. } => "item_failed",
            ProcessingState::ItemSkipped(_) => "item_skipped",
            ProcessingState::ItemAborted(_) => "item_aborted",
            ProcessingState::QueueCanceled => "queue_canceled",
            ProcessingState::QueueDone => "queue_done",
        }
    }
}
