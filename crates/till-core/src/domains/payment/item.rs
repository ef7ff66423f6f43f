//! Payment items, proof of completion and progress events.

use serde::{Deserialize, Serialize};

use crate::domain::{ItemId, ProcessingEvent, QueueItem};

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Credit,
    Debit,
    Voucher,
    Pix,
    MerchantPix,
    Cash,
    LnBitcoin,
}

/// Which strategy processes a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentProcessorType {
    /// Card/PIX through the acquirer SDK. No local implementation.
    Acquirer,
    Cash,
    MerchantPix,
    /// Records the sale without moving money.
    Transactionless,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentItem {
    pub id: ItemId,
    /// Amount in cents.
    pub amount: u64,
    pub method: PaymentMethod,
    pub commission: bool,
    pub processor_type: PaymentProcessorType,
    #[serde(default)]
    pub priority: i32,
}

impl PaymentItem {
    pub fn new(amount: u64, method: PaymentMethod, processor_type: PaymentProcessorType) -> Self {
        Self {
            id: ItemId::generate(),
            amount,
            method,
            commission: false,
            processor_type,
            priority: 0,
        }
    }

    pub fn with_commission(mut self, commission: bool) -> Self {
        self.commission = commission;
        self
    }

    /// Same item (same id) with a different amount. Used to answer a
    /// confirmation with an edited item.
    pub fn with_amount(mut self, amount: u64) -> Self {
        self.amount = amount;
        self
    }
}

impl QueueItem for PaymentItem {
    type ProcessorType = PaymentProcessorType;
    type Success = PaymentSuccess;
    type Event = PaymentEvent;

    fn id(&self) -> ItemId {
        self.id
    }

    fn processor_type(&self) -> PaymentProcessorType {
        self.processor_type
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// Proof of a completed payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSuccess {
    /// Acquirer transaction key. Empty for local processors.
    pub atk: String,
    pub transaction_id: String,
}

impl PaymentSuccess {
    pub fn local(transaction_id: impl Into<String>) -> Self {
        Self {
            atk: String::new(),
            transaction_id: transaction_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentEvent {
    Start,
    CardReachOrInsert,
    TransactionProcessing,
    /// The customer must scan this PIX code.
    QrCodeScan { pix_code: String },
    Authorizing,
    ApprovalSucceeded,
    ApprovalDeclined,
    TransactionDone,
    Canceled,
}

impl ProcessingEvent for PaymentEvent {
    fn started() -> Self {
        PaymentEvent::Start
    }

    fn canceled() -> Self {
        PaymentEvent::Canceled
    }

    fn is_started(&self) -> bool {
        matches!(self, PaymentEvent::Start)
    }
}
