//! Page Driver - Collaborator Interface
//!
//! The browser automation surface supplies these primitives; the
//! orchestrator only sequences them. Implementations translate to CDP
//! commands (or to mocks in tests).

use async_trait::async_trait;

use crate::error::Result;
use crate::types::PageMetrics;

#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Read the page geometry snapshot the scroll plan is computed from.
    async fn metrics(&self) -> Result<PageMetrics>;

    /// Capture the currently visible viewport as an encoded PNG.
    async fn capture_viewport(&self) -> Result<Vec<u8>>;

    /// Scroll the document to the given position.
    async fn scroll_to(&self, x: u32, y: u32) -> Result<()>;

    /// Hide fixed/sticky-positioned elements so they do not repeat in
    /// every segment of a multi-segment capture.
    async fn hide_fixed_elements(&self) -> Result<()>;

    /// Undo [`hide_fixed_elements`](Self::hide_fixed_elements).
    async fn restore_fixed_elements(&self) -> Result<()>;

    /// Wait until images inside the viewport have finished loading. The
    /// orchestrator bounds this call with its own timeout; a stalled image
    /// must never stall the capture.
    async fn wait_for_images(&self) -> Result<()>;
}
