//! Browser Automation Surface - Collaborator Interface
//!
//! The dispatcher treats the browser as given: everything it needs is
//! behind this trait, implemented over CDP in production and over mocks in
//! tests. Capture primitives for the focused tab come along as a
//! [`PageDriver`].

use async_trait::async_trait;
use bridge::{StatusSource, TabInfo};
use capture::PageDriver;
use serde_json::Value;

use crate::error::Result;

#[async_trait]
pub trait BrowserSurface: Send + Sync {
    /// Identity of the currently focused tab.
    async fn active_tab(&self) -> Result<TabInfo>;

    /// Evaluate a JavaScript expression in the active tab.
    async fn evaluate(&self, expression: &str) -> Result<Value>;

    /// Structured DOM snapshot of the active tab.
    async fn dom_snapshot(&self) -> Result<Value>;

    /// Performance metrics of the active tab.
    async fn performance_metrics(&self) -> Result<Value>;

    /// Cookie/local/session storage visible to the active tab.
    async fn storage_data(&self) -> Result<Value>;

    /// Reload the active tab.
    async fn reload(&self) -> Result<()>;

    /// Capture primitives bound to the active tab.
    fn page_driver(&self) -> &dyn PageDriver;
}

/// Last-known active tab, published into transport status announcements.
/// The browser event glue writes it; the reconnecting client reads it on
/// every status frame.
pub struct ActiveTabCell {
    current: std::sync::RwLock<Option<TabInfo>>,
}

impl ActiveTabCell {
    pub fn new() -> Self {
        Self {
            current: std::sync::RwLock::new(None),
        }
    }

    pub fn set(&self, tab: Option<TabInfo>) {
        if let Ok(mut guard) = self.current.write() {
            *guard = tab;
        }
    }

    pub fn get(&self) -> Option<TabInfo> {
        self.current.read().ok().and_then(|guard| guard.clone())
    }
}

impl Default for ActiveTabCell {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSource for ActiveTabCell {
    fn active_tab(&self) -> Option<TabInfo> {
        self.get()
    }
}
