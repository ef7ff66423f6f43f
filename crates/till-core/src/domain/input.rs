//! Input requests and responses.
//!
//! Two question/answer protocols share one correlation mechanism:
//! - queue level: the engine asks the caller before dispatching an item and
//!   after an item failed (`QueueInputRequest` / `QueueInputResponse`)
//! - user level: a processor asks for domain data in the middle of an
//!   operation (`UserInputRequest` / `UserInputResponse`)
//!
//! A response is matched to its request by `RequestId` only.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::decision::ErrorHandlingAction;
use super::errors::ProcessingError;
use super::ids::{ItemId, RequestId};
use crate::correlation::Correlated;

// ────────────────────────────────────────────────────────────────────────────
// Queue level
// ────────────────────────────────────────────────────────────────────────────

/// Question emitted by the queue manager's run loop.
#[derive(Debug, Clone)]
pub enum QueueInputRequest<T> {
    /// Asked before each dispatch in `Confirmation` start mode. The answer may
    /// carry a modified item (amount, method, ...).
    ConfirmNextProcessor {
        id: RequestId,
        current_index: usize,
        total_items: usize,
        item: T,
        next_item_id: Option<ItemId>,
        timeout: Option<Duration>,
    },
    /// Asked after an item failed. Answered with an [`ErrorHandlingAction`].
    ErrorRetryOrSkip {
        id: RequestId,
        item_id: ItemId,
        error: ProcessingError,
        timeout: Option<Duration>,
    },
}

impl<T> QueueInputRequest<T> {
    pub fn id(&self) -> RequestId {
        match self {
            QueueInputRequest::ConfirmNextProcessor { id, .. }
            | QueueInputRequest::ErrorRetryOrSkip { id, .. } => *id,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        match self {
            QueueInputRequest::ConfirmNextProcessor { timeout, .. }
            | QueueInputRequest::ErrorRetryOrSkip { timeout, .. } => *timeout,
        }
    }
}

/// Answer to a [`QueueInputRequest`].
#[derive(Debug, Clone)]
pub enum QueueInputValue<T> {
    /// Go ahead, optionally with a replacement for the current item.
    Proceed(Option<T>),
    /// Do not dispatch this item.
    Skip,
    /// Resolution of a failed item.
    ErrorAction(ErrorHandlingAction),
    /// The wait ended because its timeout elapsed.
    Timeout,
    /// The wait ended because the queue was aborted.
    Canceled,
}

#[derive(Debug, Clone)]
pub struct QueueInputResponse<T> {
    pub request_id: RequestId,
    pub value: QueueInputValue<T>,
}

impl<T> QueueInputResponse<T> {
    pub fn new(request_id: RequestId, value: QueueInputValue<T>) -> Self {
        Self { request_id, value }
    }

    /// Proceed with the item as enqueued.
    pub fn proceed(request_id: RequestId) -> Self {
        Self::new(request_id, QueueInputValue::Proceed(None))
    }

    /// Proceed after replacing the current item.
    pub fn proceed_with(request_id: RequestId, item: T) -> Self {
        Self::new(request_id, QueueInputValue::Proceed(Some(item)))
    }

    pub fn skip(request_id: RequestId) -> Self {
        Self::new(request_id, QueueInputValue::Skip)
    }

    /// Retry the same processor immediately without moving the item.
    pub fn on_error_retry(request_id: RequestId) -> Self {
        Self::new(request_id, QueueInputValue::ErrorAction(ErrorHandlingAction::Retry))
    }

    /// Move the item to the end of the queue for a later retry.
    pub fn on_error_skip(request_id: RequestId) -> Self {
        Self::new(request_id, QueueInputValue::ErrorAction(ErrorHandlingAction::Skip))
    }

    /// Drop the failed item and continue.
    pub fn on_error_abort(request_id: RequestId) -> Self {
        Self::new(request_id, QueueInputValue::ErrorAction(ErrorHandlingAction::Abort))
    }

    /// Cancel the entire run.
    pub fn on_error_abort_all(request_id: RequestId) -> Self {
        Self::new(
            request_id,
            QueueInputValue::ErrorAction(ErrorHandlingAction::AbortAll),
        )
    }

    pub fn error_action(&self) -> Option<ErrorHandlingAction> {
        match self.value {
            QueueInputValue::ErrorAction(action) => Some(action),
            _ => None,
        }
    }
}

impl<T: Send + 'static> Correlated for QueueInputResponse<T> {
    fn request_id(&self) -> RequestId {
        self.request_id
    }

    fn timed_out(request_id: RequestId) -> Self {
        Self::new(request_id, QueueInputValue::Timeout)
    }

    fn canceled(request_id: RequestId) -> Self {
        Self::new(request_id, QueueInputValue::Canceled)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// User level
// ────────────────────────────────────────────────────────────────────────────

/// What a processor is asking for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserInputKind {
    ConfirmCustomerReceiptPrinting,
    ConfirmMerchantPixKey,
    /// The customer must scan and pay this PIX code.
    MerchantPixScanning { pix_code: String },
    ConfirmPrinterNetworkInfo,
    ConfirmNfcKeys,
    ConfirmNfcTagAuth { pin: String, subject_id: String },
    ConfirmNfcTagCustomerData,
    /// The customer must confirm they saved their tag PIN.
    ConfirmNfcTagCustomerSavePin { pin: String },
    ConfirmPrinterPaperCut,
}

impl UserInputKind {
    /// Default time the operator has to answer this kind of question.
    pub fn default_timeout(&self) -> Duration {
        let secs = match self {
            UserInputKind::ConfirmCustomerReceiptPrinting => 10,
            UserInputKind::ConfirmMerchantPixKey => 60,
            UserInputKind::MerchantPixScanning { .. } => 60,
            UserInputKind::ConfirmPrinterNetworkInfo => 5,
            UserInputKind::ConfirmNfcKeys => 5,
            UserInputKind::ConfirmNfcTagAuth { .. } => 30,
            UserInputKind::ConfirmNfcTagCustomerData => 300,
            UserInputKind::ConfirmNfcTagCustomerSavePin { .. } => 90,
            UserInputKind::ConfirmPrinterPaperCut => 10,
        };
        Duration::from_secs(secs)
    }
}

/// Question emitted by a processor in the middle of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInputRequest {
    pub id: RequestId,
    pub kind: UserInputKind,
    /// `None` waits indefinitely (until answered or canceled).
    pub timeout: Option<Duration>,
    pub issued_at: DateTime<Utc>,
}

impl UserInputRequest {
    /// New request with the kind's default timeout.
    pub fn new(id: RequestId, kind: UserInputKind, issued_at: DateTime<Utc>) -> Self {
        let timeout = Some(kind.default_timeout());
        Self {
            id,
            kind,
            timeout,
            issued_at,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Answer to a [`UserInputRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserInputValue {
    /// Arbitrary typed answer (a boolean, a PIX key, edited customer data...).
    Value(serde_json::Value),
    Timeout,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInputResponse {
    pub request_id: RequestId,
    pub value: UserInputValue,
}

impl UserInputResponse {
    pub fn value(request_id: RequestId, value: serde_json::Value) -> Self {
        Self {
            request_id,
            value: UserInputValue::Value(value),
        }
    }

    /// Yes/no answer.
    pub fn confirm(request_id: RequestId, yes: bool) -> Self {
        Self::value(request_id, serde_json::Value::Bool(yes))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.value, UserInputValue::Timeout)
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self.value, UserInputValue::Canceled)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &self.value {
            UserInputValue::Value(v) => v.as_bool(),
            UserInputValue::Timeout | UserInputValue::Canceled => None,
        }
    }

    /// Decode the answer into a domain type. `None` for timeouts, cancellations
    /// and answers of the wrong shape.
    pub fn decode<V: DeserializeOwned>(&self) -> Option<V> {
        match &self.value {
            UserInputValue::Value(v) => serde_json::from_value(v.clone()).ok(),
            UserInputValue::Timeout | UserInputValue::Canceled => None,
        }
    }
}

impl Correlated for UserInputResponse {
    fn request_id(&self) -> RequestId {
        self.request_id
    }

    fn timed_out(request_id: RequestId) -> Self {
        Self {
            request_id,
            value: UserInputValue::Timeout,
        }
    }

    fn canceled(request_id: RequestId) -> Self {
        Self {
            request_id,
            value: UserInputValue::Canceled,
        }
    }
}
