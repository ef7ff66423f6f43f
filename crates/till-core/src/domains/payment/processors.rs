//! Local payment processors (no acquirer SDK).
//!
//! # 学習ポイント
//! - ドメイン処理は ProcessorHandler だけを実装し、配管は BaseProcessor に任せる
//! - ユーザー入力の結果（timeout / canceled / 値）を ProcessingError に翻訳する
//! - DynamicProcessorBuilder で processor type ごとに組み立てる

use std::time::Duration;

use async_trait::async_trait;

use super::item::{
    PaymentEvent, PaymentItem, PaymentMethod, PaymentProcessorType, PaymentSuccess,
};
use super::pix;
use crate::domain::{ProcessingError, ProcessingResult, UserInputKind, UserInputResponse};
use crate::error::RegistryError;
use crate::processor::{
    BaseProcessor, DynamicProcessor, DynamicProcessorBuilder, ProcessorContext, ProcessorHandler,
};

/// Amounts at or below this (in cents) are rejected by the cash drawer.
pub const MIN_CASH_AMOUNT: u64 = 1000;

/// Dynamic processor with every local strategy registered. Items routed to
/// the acquirer fail with `ProcessorNotFound`.
pub fn local_processor(
    step_delay: Duration,
) -> Result<DynamicProcessor<PaymentItem>, RegistryError> {
    DynamicProcessorBuilder::new()
        .register(
            PaymentProcessorType::Cash,
            BaseProcessor::new(CashHandler::new(step_delay)).into_shared(),
        )?
        .register(
            PaymentProcessorType::MerchantPix,
            BaseProcessor::new(MerchantPixHandler::new(step_delay)).into_shared(),
        )?
        .register(
            PaymentProcessorType::Transactionless,
            BaseProcessor::new(TransactionlessHandler::new(step_delay)).into_shared(),
        )?
        .fallback(PaymentProcessorType::Acquirer)
        .expect_types(&[
            PaymentProcessorType::Cash,
            PaymentProcessorType::MerchantPix,
            PaymentProcessorType::Transactionless,
        ])
        .build()
}

fn transaction_id(prefix: &str) -> String {
    format!("{prefix}-{:08x}", rand::random::<u32>())
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Map the canonical non-answers of a user input request.
fn unanswered(response: &UserInputResponse) -> Option<ProcessingError> {
    if response.is_timeout() {
        Some(ProcessingError::UserInputTimeout)
    } else if response.is_canceled() {
        Some(ProcessingError::OperationCanceled)
    } else {
        None
    }
}

// ────────────────────────────────────────────────────────────────────────────

pub struct CashHandler {
    step_delay: Duration,
}

impl CashHandler {
    pub fn new(step_delay: Duration) -> Self {
        Self { step_delay }
    }
}

#[async_trait]
impl ProcessorHandler<PaymentItem> for CashHandler {
    async fn process_item(
        &self,
        item: &PaymentItem,
        ctx: &ProcessorContext<PaymentEvent>,
    ) -> ProcessingResult<PaymentSuccess> {
        if item.method != PaymentMethod::Cash {
            return Err(ProcessingError::UnsupportedOperation);
        }

        pause(self.step_delay).await;
        if item.amount <= MIN_CASH_AMOUNT {
            return Err(ProcessingError::InvalidTransactionAmount);
        }
        if ctx.is_aborted() {
            return Err(ProcessingError::OperationCanceled);
        }

        ctx.emit(PaymentEvent::TransactionDone);
        pause(self.step_delay).await;
        Ok(PaymentSuccess::local(transaction_id("CASH")))
    }
}

// ────────────────────────────────────────────────────────────────────────────

/// PIX paid straight to the merchant's key, confirmed by the operator.
pub struct MerchantPixHandler {
    step_delay: Duration,
}

impl MerchantPixHandler {
    pub fn new(step_delay: Duration) -> Self {
        Self { step_delay }
    }

    async fn request_pix_key(
        &self,
        ctx: &ProcessorContext<PaymentEvent>,
    ) -> ProcessingResult<String> {
        let response = ctx
            .request_user_input(UserInputKind::ConfirmMerchantPixKey)
            .await;
        if let Some(error) = unanswered(&response) {
            return Err(error);
        }
        match response.decode::<String>() {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(ProcessingError::InvalidPixKey),
        }
    }

    /// Did the customer scan and pay? A missing flag counts as yes.
    async fn request_pix_scanning(
        &self,
        ctx: &ProcessorContext<PaymentEvent>,
        pix_code: String,
    ) -> ProcessingResult<bool> {
        let response = ctx
            .request_user_input(UserInputKind::MerchantPixScanning { pix_code })
            .await;
        if let Some(error) = unanswered(&response) {
            return Err(error);
        }
        Ok(response.as_bool().unwrap_or(true))
    }
}

#[async_trait]
impl ProcessorHandler<PaymentItem> for MerchantPixHandler {
    async fn process_item(
        &self,
        item: &PaymentItem,
        ctx: &ProcessorContext<PaymentEvent>,
    ) -> ProcessingResult<PaymentSuccess> {
        if !matches!(item.method, PaymentMethod::Pix | PaymentMethod::MerchantPix) {
            return Err(ProcessingError::UnsupportedOperation);
        }
        ctx.emit(PaymentEvent::TransactionProcessing);

        let pix_key = self.request_pix_key(ctx).await?;
        let pix_code = pix::merchant_code(&pix_key, item.amount)?;
        ctx.emit(PaymentEvent::QrCodeScan {
            pix_code: pix_code.clone(),
        });

        if !self.request_pix_scanning(ctx, pix_code).await? {
            return Err(ProcessingError::GenericRetry);
        }

        ctx.emit(PaymentEvent::Authorizing);
        pause(self.step_delay).await;
        ctx.emit(PaymentEvent::TransactionDone);
        Ok(PaymentSuccess::local(transaction_id("PIX")))
    }
}

// ────────────────────────────────────────────────────────────────────────────

pub struct TransactionlessHandler {
    step_delay: Duration,
}

impl TransactionlessHandler {
    pub fn new(step_delay: Duration) -> Self {
        Self { step_delay }
    }
}

#[async_trait]
impl ProcessorHandler<PaymentItem> for TransactionlessHandler {
    async fn process_item(
        &self,
        _item: &PaymentItem,
        ctx: &ProcessorContext<PaymentEvent>,
    ) -> ProcessingResult<PaymentSuccess> {
        pause(self.step_delay).await;
        ctx.emit(PaymentEvent::TransactionDone);
        Ok(PaymentSuccess::local(transaction_id("TRANSACTIONLESS")))
    }
}
