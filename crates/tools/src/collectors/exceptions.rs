//! Exception Collector - buffers uncaught exceptions per tab

use async_trait::async_trait;
use std::sync::Arc;

use crate::events::{TabEvent, TabObserver};
use crate::tabs::{ExceptionEntry, TabRegistry};

pub struct ExceptionCollector {
    registry: Arc<TabRegistry>,
}

impl ExceptionCollector {
    pub fn new(registry: Arc<TabRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl TabObserver for ExceptionCollector {
    fn name(&self) -> &str {
        "exceptions"
    }

    async fn on_event(&self, event: &TabEvent) {
        if let TabEvent::ExceptionThrown {
            tab_id,
            message,
            stack,
            timestamp,
        } = event
        {
            let stored = self.registry.push_exception(
                *tab_id,
                ExceptionEntry {
                    message: message.clone(),
                    stack: stack.clone(),
                    timestamp: *timestamp,
                },
            );
            if !stored {
                tracing::debug!("Dropping exception for unattached tab {}", tab_id);
            }
        }
    }
}
