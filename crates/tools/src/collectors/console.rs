//! Console Collector - buffers intercepted console messages per tab

use async_trait::async_trait;
use std::sync::Arc;

use crate::events::{TabEvent, TabObserver};
use crate::tabs::{ConsoleEntry, TabRegistry};

pub struct ConsoleCollector {
    registry: Arc<TabRegistry>,
}

impl ConsoleCollector {
    pub fn new(registry: Arc<TabRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl TabObserver for ConsoleCollector {
    fn name(&self) -> &str {
        "console"
    }

    async fn on_event(&self, event: &TabEvent) {
        if let TabEvent::ConsoleMessage {
            tab_id,
            level,
            text,
            timestamp,
        } = event
        {
            let stored = self.registry.push_console(
                *tab_id,
                ConsoleEntry {
                    level: *level,
                    text: text.clone(),
                    timestamp: *timestamp,
                },
            );
            if !stored {
                tracing::debug!("Dropping console message for unattached tab {}", tab_id);
            }
        }
    }
}
