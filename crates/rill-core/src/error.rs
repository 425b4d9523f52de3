//! Error types for the item store and its persistence backends

use thiserror::Error;

pub const EMPTY_TEXT_MESSAGE: &str = "Please enter a task.";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{EMPTY_TEXT_MESSAGE}")]
    EmptyText,

    #[error("no task id left above the largest stored id")]
    IdSpaceExhausted,

    #[error("failed to persist change: {0}")]
    Persist(#[from] PersistError),
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote store returned {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::EmptyText)
    }
}
