//! Network Collector - tracks requests from in-flight to completed

use async_trait::async_trait;
use std::sync::Arc;

use crate::events::{TabEvent, TabObserver};
use crate::tabs::{NetworkRequestRecord, TabRegistry};

pub struct NetworkCollector {
    registry: Arc<TabRegistry>,
}

impl NetworkCollector {
    pub fn new(registry: Arc<TabRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl TabObserver for NetworkCollector {
    fn name(&self) -> &str {
        "network"
    }

    async fn on_event(&self, event: &TabEvent) {
        let stored = match event {
            TabEvent::RequestWillBeSent {
                tab_id,
                request_id,
                url,
                method,
                timestamp,
            } => self.registry.begin_request(
                *tab_id,
                NetworkRequestRecord {
                    request_id: request_id.clone(),
                    url: url.clone(),
                    method: method.clone(),
                    timestamp: *timestamp,
                    status: None,
                    mime_type: None,
                    error_text: None,
                    finished: false,
                },
            ),
            TabEvent::ResponseReceived {
                tab_id,
                request_id,
                status,
                mime_type,
            } => self
                .registry
                .record_response(*tab_id, request_id, *status, mime_type),
            TabEvent::LoadingFinished { tab_id, request_id } => {
                self.registry.finish_request(*tab_id, request_id, None)
            }
            TabEvent::LoadingFailed {
                tab_id,
                request_id,
                error_text,
            } => self
                .registry
                .finish_request(*tab_id, request_id, Some(error_text.clone())),
            _ => return,
        };
        if !stored {
            tracing::debug!("Dropping network event for unknown tab or request");
        }
    }
}
