use serde::{Deserialize, Serialize};

use crate::domain::{ItemId, ProcessingEvent, QueueItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrintingProcessorType {
    /// Printer built into the acquirer terminal. No local implementation.
    Acquirer,
    /// Network thermal printer (ESC/POS over TCP). No local implementation.
    Mp4200Hs,
    Simulated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintingItem {
    pub id: ItemId,
    pub file_path: String,
    pub processor_type: PrintingProcessorType,
}

impl PrintingItem {
    pub fn new(file_path: impl Into<String>, processor_type: PrintingProcessorType) -> Self {
        Self {
            id: ItemId::generate(),
            file_path: file_path.into(),
            processor_type,
        }
    }
}

impl QueueItem for PrintingItem {
    type ProcessorType = PrintingProcessorType;
    type Success = PrintingSuccess;
    type Event = PrintingEvent;

    fn id(&self) -> ItemId {
        self.id
    }

    fn processor_type(&self) -> PrintingProcessorType {
        self.processor_type
    }
}

/// Where a network printer listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterNetworkInfo {
    pub ip_address: String,
    pub port: u16,
}

impl Default for PrinterNetworkInfo {
    fn default() -> Self {
        Self {
            ip_address: "192.168.0.2".into(),
            port: 9100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintingSuccess {
    pub file_path: String,
    pub printer: PrinterNetworkInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrintingEvent {
    Start,
    Processing,
    Printing,
    PaperCut,
    Canceled,
}

impl ProcessingEvent for PrintingEvent {
    fn started() -> Self {
        PrintingEvent::Start
    }

    fn canceled() -> Self {
        PrintingEvent::Canceled
    }

    fn is_started(&self) -> bool {
        matches!(self, PrintingEvent::Start)
    }
}
