//! Full-Page Screenshot Pipeline
//!
//! Scroll a page in viewport-sized increments, capture each position,
//! stitch the segments into one bitmap, and split oversized results into
//! size-bounded chunks.
//!
//! ## Core Design
//!
//! ```text
//! PageMetrics → scroll plan → segments (throttled) → canvas → image | chunks
//! ```
//!
//! The crate owns geometry and composition only; every browser side effect
//! goes through the [`driver::PageDriver`] collaborator trait.

pub mod driver;
pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod stitcher;
pub mod types;

pub use driver::PageDriver;
pub use error::{CaptureError, Result};
pub use orchestrator::{CaptureConfig, CaptureOrchestrator};
pub use stitcher::{chunk_count, MAX_CHUNK_HEIGHT, MIME_PNG};
pub use types::{CaptureSegment, PageMetrics, ScreenshotChunk, ScreenshotResult};
