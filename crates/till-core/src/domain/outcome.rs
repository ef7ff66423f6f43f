//! Outcome model: the result of one processing attempt.

use super::errors::ProcessingError;

/// Result of processing one item attempt.
///
/// `Ok` carries the domain proof of completion, `Err` exactly one
/// [`ProcessingError`]. Produced exactly once per attempt.
pub type ProcessingResult<S> = Result<S, ProcessingError>;
