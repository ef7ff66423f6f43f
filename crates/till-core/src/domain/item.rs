//! Work item model shared by every queue domain.

use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use super::events::ProcessingEvent;
use super::ids::ItemId;

/// One unit of work submitted to a queue.
///
/// The engine only ever looks at `id` and `processor_type`; everything else is
/// domain payload owned by the implementing type. Each domain also names its
/// proof-of-completion type (`Success`) and its progress-event vocabulary
/// (`Event`), so a whole queue is parametric over a single item type.
pub trait QueueItem: Clone + fmt::Debug + Send + Sync + 'static {
    /// Selects which concrete strategy handles the item.
    type ProcessorType: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    /// Domain proof of completion (authorization code, transaction id, ...).
    type Success: Clone + fmt::Debug + Send + Sync + 'static;

    /// Progress notifications emitted while the item is processed.
    type Event: ProcessingEvent;

    fn id(&self) -> ItemId;

    fn processor_type(&self) -> Self::ProcessorType;

    /// Ordering hint. Advisory: the queue dispatches in FIFO order.
    fn priority(&self) -> i32 {
        0
    }
}

/// Status mirrored to storage for each item.
///
/// State transitions:
/// - Pending -> Processing -> Completed
/// - Pending -> Processing -> Pending (skipped, retried later)
/// - Pending -> Processing -> Failed (aborted by the operator)
/// - any -> Cancelled (queue cleared)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl ItemStatus {
    /// Is this a terminal status (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ItemStatus::Completed | ItemStatus::Failed | ItemStatus::Cancelled
        )
    }
}
