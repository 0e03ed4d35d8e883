//! Error taxonomy for the journal core
//!
//! Every failure is scoped to one user's in-flight operation: input errors
//! re-prompt the same step, validation errors return to the editing hub,
//! not-found aborts the sub-flow. Nothing here is fatal to the process.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JournalError {
    /// Text input failed to parse as the expected type. Recovery: re-prompt
    /// the same step, draft unchanged.
    #[error("expected {what}, got {input:?}")]
    InputFormat { what: String, input: String },

    /// Finalize attempted with required fields missing. Recovery: back to
    /// the editing hub with the full list.
    #[error("missing required fields: {}", .0.join(", "))]
    Validation(Vec<&'static str>),

    /// Referenced trade is absent or already closed. Recovery: abort the
    /// sub-flow to the main menu.
    #[error("trade #{0} not found or already closed")]
    NotFound(i64),

    /// Entry price or position size is zero at computation time. Validation
    /// prevents this; the engine refuses anyway rather than persist NaN.
    #[error("cannot compute PnL: entry price and position size must be non-zero")]
    DivisionUndefined,

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, JournalError>;
