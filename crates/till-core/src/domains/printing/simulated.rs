//! SimulatedPrinter - ハードウェアなしで印刷フローを再現する
//!
//! ネットワークプリンタと同じ順で質問する（ネットワーク情報 → 用紙カット）。
//! ソケットは開かない。

use std::time::Duration;

use async_trait::async_trait;

use super::item::{PrinterNetworkInfo, PrintingEvent, PrintingItem, PrintingSuccess};
use crate::domain::{ProcessingError, ProcessingResult, UserInputKind};
use crate::processor::{ProcessorContext, ProcessorHandler};

const SUPPORTED_EXTENSIONS: [&str; 2] = [".png", ".bmp"];

pub struct SimulatedPrinter {
    print_time: Duration,
}

impl SimulatedPrinter {
    pub fn new(print_time: Duration) -> Self {
        Self { print_time }
    }

    fn validate(item: &PrintingItem) -> ProcessingResult<()> {
        let path = item.file_path.trim().to_ascii_lowercase();
        if path.is_empty() || !SUPPORTED_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            return Err(ProcessingError::InvalidFile);
        }
        Ok(())
    }

    /// An unanswered or malformed answer falls back to the default address.
    async fn network_info(
        &self,
        ctx: &ProcessorContext<PrintingEvent>,
    ) -> ProcessingResult<PrinterNetworkInfo> {
        let response = ctx
            .request_user_input(UserInputKind::ConfirmPrinterNetworkInfo)
            .await;
        if response.is_canceled() {
            return Err(ProcessingError::OperationCanceled);
        }
        Ok(response.decode().unwrap_or_default())
    }
}

#[async_trait]
impl ProcessorHandler<PrintingItem> for SimulatedPrinter {
    async fn process_item(
        &self,
        item: &PrintingItem,
        ctx: &ProcessorContext<PrintingEvent>,
    ) -> ProcessingResult<PrintingSuccess> {
        ctx.emit(PrintingEvent::Processing);
        Self::validate(item)?;

        let printer = self.network_info(ctx).await?;
        tracing::debug!(ip = %printer.ip_address, port = printer.port, "printing");
        ctx.emit(PrintingEvent::Printing);
        if !self.print_time.is_zero() {
            tokio::time::sleep(self.print_time).await;
        }

        let cut = ctx
            .request_user_input(UserInputKind::ConfirmPrinterPaperCut)
            .await;
        match cut.as_bool() {
            Some(true) => {
                ctx.emit(PrintingEvent::PaperCut);
                Ok(PrintingSuccess {
                    file_path: item.file_path.clone(),
                    printer,
                })
            }
            Some(false) => Err(ProcessingError::PrinterOutOfPaper),
            None if cut.is_timeout() => Err(ProcessingError::UserInputTimeout),
            None => Err(ProcessingError::OperationCanceled),
        }
    }
}
