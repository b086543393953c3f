//! Capture Orchestrator
//!
//! Drives viewport-by-viewport scrolling and capture for full-page
//! screenshots. Strictly sequential per segment - each step depends on the
//! rendered state the previous one left behind - and rate-limited, because
//! the platform throttles how often a visible tab may be captured.

use std::time::{Duration, Instant};

use crate::driver::PageDriver;
use crate::error::Result;
use crate::plan;
use crate::stitcher;
use crate::types::{CaptureSegment, ScreenshotResult};

/// Minimum spacing between capture calls, measured from the end of the
/// previous call. Chrome rejects captures beyond ~2 per second.
pub const MIN_CAPTURE_INTERVAL_MS: u64 = 500;

/// Delay after each scroll for the render to settle before capturing.
pub const SETTLE_DELAY_MS: u64 = 350;

/// Upper bound on waiting for in-viewport images. A stalled image stops
/// delaying the capture once this elapses.
pub const IMAGE_LOAD_TIMEOUT_MS: u64 = 3_000;

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub min_capture_interval: Duration,
    pub settle_delay: Duration,
    pub image_load_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            min_capture_interval: Duration::from_millis(MIN_CAPTURE_INTERVAL_MS),
            settle_delay: Duration::from_millis(SETTLE_DELAY_MS),
            image_load_timeout: Duration::from_millis(IMAGE_LOAD_TIMEOUT_MS),
        }
    }
}

pub struct CaptureOrchestrator {
    config: CaptureConfig,
}

impl Default for CaptureOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureOrchestrator {
    pub fn new() -> Self {
        Self::with_config(CaptureConfig::default())
    }

    pub fn with_config(config: CaptureConfig) -> Self {
        Self { config }
    }

    /// Capture the whole scrollable height of the page.
    ///
    /// A page no taller than its viewport degrades to a single capture
    /// with no scrolling or element hiding. Otherwise fixed elements are
    /// hidden for the duration and the page is walked one viewport at a
    /// time. Hidden elements and the original scroll position are restored
    /// unconditionally - a half-scrolled page with hidden chrome is a
    /// worse outcome than the capture itself failing.
    pub async fn capture_full_page(&self, driver: &dyn PageDriver) -> Result<ScreenshotResult> {
        let metrics = driver.metrics().await?;

        if !plan::needs_scrolling(&metrics) {
            let data = driver.capture_viewport().await?;
            return stitcher::single_image(data);
        }

        driver.hide_fixed_elements().await?;
        let outcome = self.capture_segments(driver, &metrics).await;

        if let Err(err) = driver.restore_fixed_elements().await {
            tracing::warn!("Failed to restore hidden elements: {}", err);
        }
        if let Err(err) = driver.scroll_to(metrics.scroll_x, metrics.scroll_y).await {
            tracing::warn!("Failed to restore scroll position: {}", err);
        }

        stitcher::stitch(&metrics, outcome?)
    }

    /// Capture exactly the current viewport, no scrolling.
    pub async fn capture_viewport(&self, driver: &dyn PageDriver) -> Result<ScreenshotResult> {
        let data = driver.capture_viewport().await?;
        stitcher::single_image(data)
    }

    async fn capture_segments(
        &self,
        driver: &dyn PageDriver,
        metrics: &crate::types::PageMetrics,
    ) -> Result<Vec<CaptureSegment>> {
        let offsets = plan::scroll_offsets(metrics);
        let mut segments = Vec::with_capacity(offsets.len());
        let mut last_capture_end: Option<Instant> = None;

        for y_offset in offsets {
            driver.scroll_to(0, y_offset).await?;
            tokio::time::sleep(self.config.settle_delay).await;

            match tokio::time::timeout(self.config.image_load_timeout, driver.wait_for_images())
                .await
            {
                Ok(result) => result?,
                Err(_) => {
                    tracing::debug!("Image load wait timed out at offset {}, capturing anyway", y_offset);
                }
            }

            self.throttle(last_capture_end).await;
            let data = driver.capture_viewport().await?;
            last_capture_end = Some(Instant::now());

            segments.push(CaptureSegment { data, y_offset });
        }
        Ok(segments)
    }

    async fn throttle(&self, last_capture_end: Option<Instant>) {
        if let Some(previous) = last_capture_end {
            let elapsed = previous.elapsed();
            if elapsed < self.config.min_capture_interval {
                tokio::time::sleep(self.config.min_capture_interval - elapsed).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaptureError;
    use crate::types::PageMetrics;
    use async_trait::async_trait;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn tiny_config() -> CaptureConfig {
        CaptureConfig {
            min_capture_interval: Duration::from_millis(1),
            settle_delay: Duration::from_millis(1),
            image_load_timeout: Duration::from_millis(20),
        }
    }

    struct MockDriver {
        metrics: PageMetrics,
        calls: Mutex<Vec<String>>,
        captures: AtomicUsize,
        fail_capture_at: Option<usize>,
        hang_image_wait: bool,
    }

    impl MockDriver {
        fn new(scroll_height: u32, viewport_height: u32) -> Self {
            Self {
                metrics: PageMetrics {
                    scroll_height,
                    scroll_width: 4,
                    viewport_height,
                    viewport_width: 4,
                    scroll_x: 0,
                    scroll_y: 7,
                },
                calls: Mutex::new(Vec::new()),
                captures: AtomicUsize::new(0),
                fail_capture_at: None,
                hang_image_wait: false,
            }
        }

        fn log(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn frame(&self) -> Vec<u8> {
            let img = RgbaImage::from_pixel(
                self.metrics.viewport_width,
                self.metrics.viewport_height,
                Rgba([7, 7, 7, 255]),
            );
            let mut out = Vec::new();
            img.write_to(&mut std::io::Cursor::new(&mut out), ImageFormat::Png)
                .unwrap();
            out
        }
    }

    #[async_trait]
    impl PageDriver for MockDriver {
        async fn metrics(&self) -> Result<PageMetrics> {
            self.log("metrics");
            Ok(self.metrics)
        }

        async fn capture_viewport(&self) -> Result<Vec<u8>> {
            let n = self.captures.fetch_add(1, Ordering::SeqCst);
            if self.fail_capture_at == Some(n) {
                self.log("capture:fail");
                return Err(CaptureError::Driver("tab went away".into()));
            }
            self.log("capture");
            Ok(self.frame())
        }

        async fn scroll_to(&self, x: u32, y: u32) -> Result<()> {
            self.log(format!("scroll:{},{}", x, y));
            Ok(())
        }

        async fn hide_fixed_elements(&self) -> Result<()> {
            self.log("hide");
            Ok(())
        }

        async fn restore_fixed_elements(&self) -> Result<()> {
            self.log("restore");
            Ok(())
        }

        async fn wait_for_images(&self) -> Result<()> {
            if self.hang_image_wait {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn short_page_degrades_to_single_capture() {
        let driver = MockDriver::new(10, 12);
        let orchestrator = CaptureOrchestrator::with_config(tiny_config());

        let result = orchestrator.capture_full_page(&driver).await.unwrap();
        assert!(matches!(result, ScreenshotResult::Single { .. }));

        let calls = driver.calls();
        assert_eq!(calls, vec!["metrics", "capture"]);
    }

    #[tokio::test]
    async fn tall_page_scrolls_hides_and_restores() {
        let driver = MockDriver::new(30, 12);
        let orchestrator = CaptureOrchestrator::with_config(tiny_config());

        let result = orchestrator.capture_full_page(&driver).await.unwrap();
        assert!(matches!(result, ScreenshotResult::Single { .. }));

        let calls = driver.calls();
        assert_eq!(
            calls,
            vec![
                "metrics",
                "hide",
                "scroll:0,0",
                "capture",
                "scroll:0,12",
                "capture",
                "scroll:0,24",
                "capture",
                "restore",
                "scroll:0,7", // original position from the metrics snapshot
            ]
        );
    }

    #[tokio::test]
    async fn restore_runs_even_when_a_capture_fails_mid_loop() {
        let mut driver = MockDriver::new(30, 12);
        driver.fail_capture_at = Some(1);
        let orchestrator = CaptureOrchestrator::with_config(tiny_config());

        let result = orchestrator.capture_full_page(&driver).await;
        assert!(matches!(result, Err(CaptureError::Driver(_))));

        let calls = driver.calls();
        assert!(calls.contains(&"restore".to_string()));
        assert_eq!(calls.last().unwrap(), "scroll:0,7");
    }

    #[tokio::test]
    async fn captures_respect_the_minimum_interval() {
        let driver = MockDriver::new(30, 10);
        let orchestrator = CaptureOrchestrator::with_config(CaptureConfig {
            min_capture_interval: Duration::from_millis(60),
            settle_delay: Duration::from_millis(1),
            image_load_timeout: Duration::from_millis(20),
        });

        let started = Instant::now();
        orchestrator.capture_full_page(&driver).await.unwrap();
        // Three captures -> two enforced gaps.
        assert!(started.elapsed() >= Duration::from_millis(120));
    }

    #[tokio::test]
    async fn stalled_images_do_not_stall_the_capture() {
        let mut driver = MockDriver::new(30, 12);
        driver.hang_image_wait = true;
        let orchestrator = CaptureOrchestrator::with_config(tiny_config());

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            orchestrator.capture_full_page(&driver),
        )
        .await
        .expect("capture must not hang on image loads");
        assert!(result.is_ok());
    }
}
