//! Error types for capture operations
//!
//! Flat hierarchy; every failure is scoped to the single capture in
//! progress and never corrupts state shared with other operations.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CaptureError>;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("page cannot be captured: {0}")]
    RestrictedPage(String),

    #[error("browser driver error: {0}")]
    Driver(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("capture produced no segments")]
    Empty,

    #[error("page reports a zero-height viewport")]
    ZeroViewport,
}
