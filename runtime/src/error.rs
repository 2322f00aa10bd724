//! Error taxonomy for page resolution.
//!
//! Browser calls return `anyhow` errors; [`classify_error`] sorts them into
//! transient context loss (retried), explicit closure (never retried), and
//! everything else.

/// Failures the resolver raises itself.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("page was closed")]
    PageClosed,

    #[error("page context kept failing after {attempts} attempts: {last}")]
    AttemptsExhausted { attempts: u32, last: String },

    #[error("artifact text extraction failed: {0}")]
    Extraction(String),

    #[error("artifact fetch failed with status {status}")]
    Fetch { status: u16 },
}

/// How an error should be treated by retry loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Execution context lost; the operation may succeed if retried.
    Transient,
    /// The page was deliberately closed.
    Closed,
    Other,
}

/// Message fragments that identify transient context loss.
const TRANSIENT_SIGNATURES: &[&str] = &[
    "execution context was destroyed",
    "cannot find context with specified id",
    "detached frame",
    "frame was detached",
    "target closed",
    "session closed",
    "connection closed",
    "websocket closed",
    "navigation failed",
    "net::err_aborted",
];

/// Classify an error for retry purposes.
pub fn classify_error(err: &anyhow::Error) -> ErrorClass {
    if let Some(resolve) = err.downcast_ref::<ResolveError>() {
        return match resolve {
            ResolveError::PageClosed => ErrorClass::Closed,
            _ => ErrorClass::Other,
        };
    }

    let message = format!("{err:#}").to_lowercase();
    if TRANSIENT_SIGNATURES.iter().any(|sig| message.contains(sig)) {
        ErrorClass::Transient
    } else {
        ErrorClass::Other
    }
}

/// Shorthand for `classify_error(err) == ErrorClass::Transient`.
pub fn is_transient(err: &anyhow::Error) -> bool {
    classify_error(err) == ErrorClass::Transient
}
