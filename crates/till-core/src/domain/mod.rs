//! Domain model: ids, items, results, states, decisions and input protocols.
//!
//! Nothing here performs I/O. The queue manager and the processors in
//! [`crate::app`] and [`crate::processor`] are the only writers of these types.

pub mod decision;
pub mod errors;
pub mod events;
pub mod ids;
pub mod input;
pub mod item;
pub mod outcome;
pub mod state;

pub use decision::{
    ConfirmTimeoutAction, ErrorHandlingAction, PersistenceStrategy, ProcessorStartMode,
    QueueTimeoutPolicy,
};
pub use errors::{ErrorKind, ProcessingError};
pub use events::ProcessingEvent;
pub use ids::{ItemId, RequestId};
pub use input::{
    QueueInputRequest, QueueInputResponse, QueueInputValue, UserInputKind, UserInputRequest,
    UserInputResponse, UserInputValue,
};
pub use item::{ItemStatus, QueueItem};
pub use outcome::ProcessingResult;
pub use state::ProcessingState;
