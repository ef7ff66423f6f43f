//! Printing domain: receipts and labels rendered to image files upstream.

pub mod item;
pub mod simulated;

pub use self::item::{
    PrinterNetworkInfo, PrintingEvent, PrintingItem, PrintingProcessorType, PrintingSuccess,
};
pub use self::simulated::SimulatedPrinter;
