//! Payment domain.
//!
//! # 使用例
//! ```ignore
//! let processor = payment::local_processor(Duration::ZERO)?;
//! let queue = QueueBuilder::new(Arc::new(processor)).build()?;
//! queue.enqueue(PaymentItem::new(2500, PaymentMethod::Cash, PaymentProcessorType::Cash)).await?;
//! ```

pub mod item;
pub mod pix;
pub mod processors;

pub use self::item::{
    PaymentEvent, PaymentItem, PaymentMethod, PaymentProcessorType, PaymentSuccess,
};
pub use self::processors::{
    CashHandler, MIN_CASH_AMOUNT, MerchantPixHandler, TransactionlessHandler, local_processor,
};
