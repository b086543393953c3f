//! Lifecycle Collector - tab attach/detach bookkeeping

use async_trait::async_trait;
use std::sync::Arc;

use crate::events::{TabEvent, TabObserver};
use crate::tabs::TabRegistry;

/// Creates per-tab state on attach and destroys it on detach. Navigation
/// is noted but deliberately does not reset buffers - callers often want
/// the logs that led up to a navigation.
pub struct LifecycleCollector {
    registry: Arc<TabRegistry>,
}

impl LifecycleCollector {
    pub fn new(registry: Arc<TabRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl TabObserver for LifecycleCollector {
    fn name(&self) -> &str {
        "lifecycle"
    }

    async fn on_event(&self, event: &TabEvent) {
        match event {
            TabEvent::Attached { tab_id } => {
                self.registry.attach(*tab_id);
                tracing::debug!("Attached tab {}", tab_id);
            }
            TabEvent::Detached { tab_id } => {
                self.registry.detach(*tab_id);
                tracing::debug!("Detached tab {}", tab_id);
            }
            TabEvent::Navigated { tab_id, url } => {
                tracing::debug!("Tab {} navigated to {}", tab_id, url);
            }
            _ => {}
        }
    }
}
