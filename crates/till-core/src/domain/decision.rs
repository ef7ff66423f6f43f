//! Decision model: how failed items and unanswered questions are resolved.
//!
//! The engine never picks a failure policy on its own. The caller answers an
//! `ErrorRetryOrSkip` request with an [`ErrorHandlingAction`]; when a queue
//! request times out, the configured [`QueueTimeoutPolicy`] answers instead.

use serde::{Deserialize, Serialize};

/// The only vocabulary a caller may use to resolve an `ItemFailed` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorHandlingAction {
    /// Dispatch the same item again, immediately.
    Retry,
    /// Move the item to the tail of the queue (deferred retry).
    Skip,
    /// Drop this item only and continue with the next one.
    Abort,
    /// Cancel the whole run.
    AbortAll,
}

/// Whether each item needs an explicit go-ahead before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessorStartMode {
    /// Dispatch immediately (unattended).
    #[default]
    Immediate,
    /// Emit `ConfirmNextProcessor` and wait before each dispatch.
    Confirmation,
}

/// When the storage mirror is told about queue mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PersistenceStrategy {
    /// Storage writes complete before the mutation returns.
    #[default]
    Immediate,
    /// Storage writes are spawned and not awaited.
    OnBackground,
    /// Memory only.
    Never,
}

impl PersistenceStrategy {
    pub fn is_enabled(self) -> bool {
        !matches!(self, PersistenceStrategy::Never)
    }
}

/// Action taken when a `ConfirmNextProcessor` request times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmTimeoutAction {
    Proceed,
    Skip,
    Abort,
}

/// Per-request-kind answer used when a queue input request times out.
///
/// Pure data: the run loop asks the policy and applies the answer exactly as
/// if the caller had sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueTimeoutPolicy {
    #[serde(default = "QueueTimeoutPolicy::default_confirm")]
    pub on_confirm_timeout: ConfirmTimeoutAction,
    #[serde(default = "QueueTimeoutPolicy::default_error")]
    pub on_error_timeout: ErrorHandlingAction,
}

impl QueueTimeoutPolicy {
    fn default_confirm() -> ConfirmTimeoutAction {
        ConfirmTimeoutAction::Skip
    }

    fn default_error() -> ErrorHandlingAction {
        ErrorHandlingAction::AbortAll
    }
}

impl Default for QueueTimeoutPolicy {
    /// Never move money without an answer: unconfirmed items are skipped and
    /// an unanswered failure stops the run.
    fn default() -> Self {
        Self {
            on_confirm_timeout: Self::default_confirm(),
            on_error_timeout: Self::default_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_serialize_as_required_names() {
        let s = serde_json::to_string(&ErrorHandlingAction::AbortAll).unwrap();
        assert_eq!(s, "\"ABORT_ALL\"");

        let s = serde_json::to_string(&PersistenceStrategy::OnBackground).unwrap();
        assert_eq!(s, "\"ON_BACKGROUND\"");
    }

    #[test]
    fn timeout_policy_fills_missing_fields_with_defaults() {
        let policy: QueueTimeoutPolicy =
            serde_json::from_str(r#"{"on_error_timeout":"SKIP"}"#).unwrap();
        assert_eq!(policy.on_confirm_timeout, ConfirmTimeoutAction::Skip);
        assert_eq!(policy.on_error_timeout, ErrorHandlingAction::Skip);
    }
}
