//! Collectors - observers that populate per-tab debug state
//!
//! One focused observer per concern; each translates its slice of the tab
//! event stream into registry mutations. Events for tabs that are not
//! attached are dropped with a debug log.

mod console;
mod exceptions;
mod lifecycle;
mod network;

pub use console::ConsoleCollector;
pub use exceptions::ExceptionCollector;
pub use lifecycle::LifecycleCollector;
pub use network::NetworkCollector;

use std::sync::Arc;

use crate::events::ObserverHub;
use crate::tabs::TabRegistry;

/// Hub wired with the standard collector set, in the order state must be
/// built: lifecycle first so attach events precede the data they gate.
pub fn default_hub(registry: Arc<TabRegistry>) -> ObserverHub {
    let mut hub = ObserverHub::new();
    hub.register(Arc::new(LifecycleCollector::new(Arc::clone(&registry))));
    hub.register(Arc::new(ConsoleCollector::new(Arc::clone(&registry))));
    hub.register(Arc::new(NetworkCollector::new(Arc::clone(&registry))));
    hub.register(Arc::new(ExceptionCollector::new(registry)));
    hub
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ConsoleLevel, TabEvent};

    #[tokio::test]
    async fn events_flow_through_the_hub_into_the_registry() {
        let registry = Arc::new(TabRegistry::new());
        let hub = default_hub(Arc::clone(&registry));

        hub.dispatch(&TabEvent::Attached { tab_id: 5 }).await;
        hub.dispatch(&TabEvent::ConsoleMessage {
            tab_id: 5,
            level: ConsoleLevel::Error,
            text: "boom".into(),
            timestamp: 1.0,
        })
        .await;
        hub.dispatch(&TabEvent::ExceptionThrown {
            tab_id: 5,
            message: "TypeError: x is undefined".into(),
            stack: Some("at main.js:3".into()),
            timestamp: 2.0,
        })
        .await;
        hub.dispatch(&TabEvent::RequestWillBeSent {
            tab_id: 5,
            request_id: "r-1".into(),
            url: "https://example.test/api".into(),
            method: "POST".into(),
            timestamp: 3.0,
        })
        .await;
        hub.dispatch(&TabEvent::ResponseReceived {
            tab_id: 5,
            request_id: "r-1".into(),
            status: 503,
            mime_type: "application/json".into(),
        })
        .await;
        hub.dispatch(&TabEvent::LoadingFinished {
            tab_id: 5,
            request_id: "r-1".into(),
        })
        .await;

        assert_eq!(registry.console_logs(5, None).len(), 1);
        assert_eq!(registry.exceptions(5).len(), 1);
        let requests = registry.network_requests(5);
        assert_eq!(requests.len(), 1);
        assert!(requests[0].finished);
        assert_eq!(requests[0].status, Some(503));

        hub.dispatch(&TabEvent::Detached { tab_id: 5 }).await;
        assert!(!registry.is_attached(5));
    }

    #[tokio::test]
    async fn events_for_unattached_tabs_are_dropped() {
        let registry = Arc::new(TabRegistry::new());
        let hub = default_hub(Arc::clone(&registry));

        hub.dispatch(&TabEvent::ConsoleMessage {
            tab_id: 9,
            level: ConsoleLevel::Log,
            text: "orphan".into(),
            timestamp: 0.0,
        })
        .await;

        assert!(registry.is_empty());
    }
}
