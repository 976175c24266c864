// keysentry/src/error.rs
//
// Library error type. Only structurally invalid input and invalid
// configuration are errors; short batches, missing pastes and unparseable
// individual timestamps are reported inside the result instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The input is not a sequence of event-like records.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid config field `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
