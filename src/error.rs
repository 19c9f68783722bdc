//! Typed domain errors.
//!
//! The matching and price-tick hot paths never produce an error —
//! `EngineError` is only surfaced at the API boundary: order validation,
//! cancel-of-unknown-id, margin checks and match join/leave guards.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("insufficient margin for this order")]
    InsufficientMargin,

    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid state: {0}")]
    InvalidState(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
