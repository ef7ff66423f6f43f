use serde::{Deserialize, Serialize};

/// Progress counters of the current run.
///
/// - `full_size`: items seen by this run (completed + still enqueued)
/// - `enqueued_size`: items still in the collection, in-flight item included
/// - `current_index`: 1-based position of the head item within the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub full_size: usize,
    pub enqueued_size: usize,
    pub current_index: usize,
}

impl QueueCounts {
    pub fn new(completed: usize, enqueued: usize) -> Self {
        let full_size = completed + enqueued;
        Self {
            full_size,
            enqueued_size: enqueued,
            current_index: full_size - enqueued + 1,
        }
    }
}

impl Default for QueueCounts {
    fn default() -> Self {
        Self::new(0, 0)
    }
}
