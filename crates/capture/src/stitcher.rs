//! Stitcher - Segment Composition and Chunking
//!
//! Segments are composited once into a single full-height canvas even when
//! the output must be chunked: partition boundaries are independent of the
//! per-viewport capture boundaries, and cutting the finished canvas is the
//! only way to avoid seams or duplicated rows.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{imageops, ImageFormat, RgbaImage};

use crate::error::{CaptureError, Result};
use crate::plan;
use crate::types::{CaptureSegment, PageMetrics, ScreenshotChunk, ScreenshotResult};

/// Tallest image returned in one piece. Chosen conservatively below the
/// downstream consumer's image-size limit.
pub const MAX_CHUNK_HEIGHT: u32 = 7_000;

pub const MIME_PNG: &str = "image/png";

/// Number of chunks a composite of the given height splits into.
/// Monotonic non-decreasing; a degenerate zero-height canvas still counts
/// as one chunk.
pub fn chunk_count(height: u32) -> u32 {
    height.div_ceil(MAX_CHUNK_HEIGHT).max(1)
}

/// Wrap an already-encoded single-viewport capture. Dimensions are read
/// from the image itself.
pub fn single_image(data: Vec<u8>) -> Result<ScreenshotResult> {
    let decoded = image::load_from_memory(&data)?;
    Ok(ScreenshotResult::Single {
        image_data: BASE64.encode(&data),
        mime_type: MIME_PNG.to_string(),
        width: decoded.width(),
        height: decoded.height(),
    })
}

/// Compose ordered segments into one `scroll_width x scroll_height` canvas
/// and encode it - whole when it fits, otherwise as a chunk sequence.
///
/// Non-final segments are drawn at full height at their recorded offsets.
/// When the page height is not a viewport multiple, the browser clamped
/// the last scroll, so only the bottom `remainder` rows of the final frame
/// are new content; the rows above were already captured.
pub fn stitch(metrics: &PageMetrics, segments: Vec<CaptureSegment>) -> Result<ScreenshotResult> {
    if segments.is_empty() {
        return Err(CaptureError::Empty);
    }

    let width = metrics.scroll_width;
    let height = metrics.scroll_height;
    let remainder = plan::final_segment_remainder(metrics);
    let last_index = segments.len() - 1;

    let mut canvas = RgbaImage::new(width, height);
    for (index, segment) in segments.iter().enumerate() {
        let frame = image::load_from_memory(&segment.data)?.to_rgba8();
        if index == last_index && remainder > 0 {
            let crop_y = frame.height().saturating_sub(remainder);
            let tail = imageops::crop_imm(&frame, 0, crop_y, frame.width(), remainder).to_image();
            imageops::overlay(&mut canvas, &tail, 0, i64::from(segment.y_offset));
        } else {
            imageops::overlay(&mut canvas, &frame, 0, i64::from(segment.y_offset));
        }
    }

    if height <= MAX_CHUNK_HEIGHT {
        return Ok(ScreenshotResult::Single {
            image_data: BASE64.encode(encode_png(&canvas)?),
            mime_type: MIME_PNG.to_string(),
            width,
            height,
        });
    }

    let total = chunk_count(height);
    let mut chunks = Vec::with_capacity(total as usize);
    for slot in 0..total {
        let y_offset = slot * MAX_CHUNK_HEIGHT;
        let chunk_height = (height - y_offset).min(MAX_CHUNK_HEIGHT);
        let slice = imageops::crop_imm(&canvas, 0, y_offset, width, chunk_height).to_image();
        chunks.push(ScreenshotChunk {
            image_data: BASE64.encode(encode_png(&slice)?),
            width,
            height: chunk_height,
            y_offset,
            index: slot + 1,
            total,
        });
    }
    Ok(ScreenshotResult::Chunked {
        chunks,
        mime_type: MIME_PNG.to_string(),
        width,
        height,
    })
}

fn encode_png(canvas: &RgbaImage) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    canvas.write_to(&mut std::io::Cursor::new(&mut out), ImageFormat::Png)?;
    Ok(out)
}
