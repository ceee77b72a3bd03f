use thiserror::Error;

use crate::{domain::tags::TagError, infra::error::InfraError};

/// A lifecycle-stage failure. Fatal to the response: remaining stages are
/// skipped, and the response is forced to a 500 if the head is still
/// uncommitted.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Tag(#[from] TagError),
    #[error("unexpected engine failure: {0}")]
    Unexpected(String),
}

impl EngineError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

/// Top-level error for the server binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
