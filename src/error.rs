//! Error types for the client.
//!
//! `ApiError` covers everything the backend can do to us; `SessionError`
//! adds the input-ordering mistakes a user can make at the prompt. Nothing
//! here is fatal to the process; the worst case is `Unauthorized`, which
//! the REPL answers with a logout.

use thiserror::Error;

/// Errors produced by calls to the tutoring backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Credentials missing or rejected. The session is torn down on sight.
    #[error("unauthorized - your session has expired, please log in again")]
    Unauthorized,

    /// A question fetch found nothing for the requested topics.
    #[error("no question matches the requested topics")]
    NoMatch,

    /// The explain handshake failed before any fragment arrived.
    #[error("explain request failed with status {status}")]
    ExplainRequestFailed { status: u16 },

    /// Any other non-success response, with the server's detail message.
    #[error("server error {status}: {detail}")]
    Api { status: u16, detail: String },

    /// Transport-level failure (connect, timeout, decode).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Errors produced by the session controller's input dispatch.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Free text arrived before any mode was selected.
    #[error("select a mode first: /explain, /practice or /daily")]
    NoModeSelected,

    /// Daily mode only accepts answers once a question has been fetched.
    #[error("no daily question loaded - use /daily to fetch one")]
    NoQuestionLoaded,

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl SessionError {
    /// True when the only sane reaction is to log out.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, SessionError::Api(ApiError::Unauthorized))
    }

    /// Input-ordering mistakes recover locally with a hint, no state change.
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            SessionError::NoModeSelected | SessionError::NoQuestionLoaded
        )
    }
}
