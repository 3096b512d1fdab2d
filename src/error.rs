use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the fetch engine.
///
/// Transient upstream failures never appear here: the retry client absorbs
/// them until its attempt budget runs out, then reports the last failure as
/// [`FetchError::Upstream`] or [`FetchError::Transport`]. Every variant is
/// fatal for the session that produced it.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Non-retryable status, or a retryable one that exhausted its attempts.
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    /// Connection-level failure that outlived the retry budget.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response did not have the shape the fetcher was told to expect.
    #[error("unexpected response: {0}")]
    Protocol(String),

    #[error("invalid JSON in response: {0}")]
    Json(#[from] serde_json::Error),

    /// A bounded polling loop ran past its wait budget.
    #[error("{operation} did not complete within {waited:?}")]
    Timeout { operation: String, waited: Duration },

    /// Cursor values of different kinds were compared.
    #[error("cannot compare cursor value {left} with {right}")]
    TypeMismatch { left: String, right: String },

    #[error("record has no value for cursor field `{0}`")]
    MissingCursorValue(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Upstream { status, .. } => Some(*status),
            FetchError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True for failures caused by the data rather than the transport.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            FetchError::TypeMismatch { .. } | FetchError::MissingCursorValue(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;
