//! Error types for tool handling
//!
//! Every externally observable failure becomes a structured
//! `{code, message}` payload; the code mapping lives here so handlers
//! never hand a raw error (let alone a stack trace) to the wire.

use bridge::HandlerError;
use capture::CaptureError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolError>;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("no active tab")]
    NoActiveTab,

    #[error("page cannot be captured: {0}")]
    RestrictedPage(String),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ToolError {
    pub fn code(&self) -> &'static str {
        match self {
            ToolError::NoActiveTab => "NO_ACTIVE_TAB",
            ToolError::RestrictedPage(_) => "RESTRICTED_PAGE",
            ToolError::Capture(CaptureError::RestrictedPage(_)) => "RESTRICTED_PAGE",
            ToolError::Capture(_) => "CAPTURE_FAILED",
            ToolError::Browser(_) => "BROWSER_ERROR",
            ToolError::InvalidParams(_) => "INVALID_PARAMS",
            ToolError::Json(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<ToolError> for HandlerError {
    fn from(err: ToolError) -> Self {
        HandlerError::with_code(err.code(), err.to_string())
    }
}
