//! Capture Data Model
//!
//! The snapshot/segment/chunk types the orchestrator and stitcher pass
//! around. Wire-facing structs serialize in camelCase to match the
//! extension protocol.

use serde::{Deserialize, Serialize};

/// Page geometry, read once per full-page capture and treated as immutable
/// for its duration - the whole scroll plan derives from this snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetrics {
    pub scroll_height: u32,
    pub scroll_width: u32,
    pub viewport_height: u32,
    pub viewport_width: u32,
    #[serde(rename = "currentScrollX")]
    pub scroll_x: u32,
    #[serde(rename = "currentScrollY")]
    pub scroll_y: u32,
}

/// One captured viewport frame (encoded PNG bytes) and the document offset
/// it was taken at. Ephemeral - consumed by the stitcher and discarded.
#[derive(Debug, Clone)]
pub struct CaptureSegment {
    pub data: Vec<u8>,
    pub y_offset: u32,
}

/// One slice of an oversized composite. Chunks for a capture form a
/// contiguous, non-overlapping vertical partition of the page, ordered by
/// their 1-based `index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotChunk {
    pub image_data: String,
    pub width: u32,
    pub height: u32,
    pub y_offset: u32,
    pub index: u32,
    pub total: u32,
}

/// Screenshot tool result: a single image or a chunk sequence, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum ScreenshotResult {
    Single {
        image_data: String,
        mime_type: String,
        width: u32,
        height: u32,
    },
    Chunked {
        chunks: Vec<ScreenshotChunk>,
        mime_type: String,
        width: u32,
        height: u32,
    },
}
