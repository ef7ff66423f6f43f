//! Errors - processing error vocabulary and its classification.
//!
//! Concrete processors map every vendor/hardware status into a
//! [`ProcessingError`]; raw vendor types never leave a processor.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Operational classification of a [`ProcessingError`].
///
/// - Generic: unclassified failure
/// - Canceled: user or system initiated cancellation
/// - Validation: the item or the data gathered for it is invalid
/// - Timeout: an external actor (tag, network, operator) did not answer in time
/// - Vendor: reported by the hardware/SDK behind the processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Generic,
    Canceled,
    Validation,
    Timeout,
    Vendor,
}

/// Closed error vocabulary carried by `ProcessingResult::Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingError {
    #[error("generic error")]
    Generic,
    #[error("unexpected error, try again")]
    UnexpectedError,
    #[error("generic error, try again")]
    GenericRetry,
    #[error("operation canceled")]
    OperationCanceled,
    #[error("no suitable processor found")]
    ProcessorNotFound,
    #[error("operation not supported by this processor")]
    UnsupportedOperation,

    #[error("invalid transaction amount")]
    InvalidTransactionAmount,
    #[error("invalid merchant PIX key")]
    InvalidPixKey,
    #[error("invalid file, try again with a valid file")]
    InvalidFile,
    #[error("NFC tag has invalid keys")]
    NfcTagInvalidKeys,
    #[error("NFC tag keys are missing")]
    NfcTagMissingKeys,
    #[error("NFC tag customer PIN is incorrect")]
    NfcTagCustomerPinIncorrect,

    #[error("NFC tag not found")]
    NfcTagNotFound,
    #[error("timed out waiting for the tag to be reached")]
    TagReachTimeout,
    #[error("network timeout")]
    NetworkTimeout,
    #[error("no answer from the operator in time")]
    UserInputTimeout,

    #[error("NFC read error")]
    NfcReadError,
    #[error("NFC write error, check the tag is writable")]
    NfcWriteError,
    #[error("error refunding transaction, try again later")]
    RefundError,
    #[error("attempts exceeded, use another card")]
    AttemptsExceeded,
    #[error("installment not allowed for this transaction")]
    InstallmentNotAllowed,
    #[error("card declined")]
    CardDeclined,
    #[error("printer is out of paper")]
    PrinterOutOfPaper,
    #[error("printer is not connected")]
    PrinterNotConnected,
}

impl ProcessingError {
    pub fn kind(self) -> ErrorKind {
        use ProcessingError::*;
        match self {
            Generic | UnexpectedError | GenericRetry | ProcessorNotFound | UnsupportedOperation => {
                ErrorKind::Generic
            }
            OperationCanceled => ErrorKind::Canceled,
            InvalidTransactionAmount
            | InvalidPixKey
            | InvalidFile
            | NfcTagInvalidKeys
            | NfcTagMissingKeys
            | NfcTagCustomerPinIncorrect => ErrorKind::Validation,
            NfcTagNotFound | TagReachTimeout | NetworkTimeout | UserInputTimeout => {
                ErrorKind::Timeout
            }
            NfcReadError
            | NfcWriteError
            | RefundError
            | AttemptsExceeded
            | InstallmentNotAllowed
            | CardDeclined
            | PrinterOutOfPaper
            | PrinterNotConnected => ErrorKind::Vendor,
        }
    }
}
