//! Engine-level errors.
//!
//! Item failures never surface here: they travel as `ProcessingError` inside
//! `ProcessingState::ItemFailed`. These types cover misuse of the API and
//! storage/wiring failures.

use thiserror::Error;

use crate::domain::ItemId;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("item {0} is already enqueued")]
    DuplicateItem(ItemId),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("item {0} not found in storage")]
    NotFound(ItemId),

    #[error("item {0} already stored")]
    AlreadyStored(ItemId),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Errors raised while wiring processors together.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("processor for type '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("missing processor types: {0:?}. These types were expected but not registered.")]
    MissingProcessorTypes(Vec<String>),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid queue config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid queue config: {0}")]
    Invalid(String),
}
