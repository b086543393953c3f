//! Tab Event Stream - Unified Subscription Surface
//!
//! CDP event callbacks, console interception, and socket message handlers
//! are all the same underlying shape: an external source pushes a typed
//! message into a single-threaded dispatcher. Everything funnels through
//! one [`TabEvent`] enum and one [`ObserverHub`], so the ordering guarantee
//! is stated exactly once:
//!
//! Events are dispatched in emission order and observers run sequentially
//! in registration order. No reordering, no deduplication. The underlying
//! transport is assumed to deliver per-tab events in emission order; the
//! hub preserves that, it does not enforce it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Severity of an intercepted console message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Info,
    Warning,
    Error,
    Debug,
}

/// Every event the debug-state subsystem reacts to, keyed by tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TabEvent {
    Attached {
        tab_id: i64,
    },
    Detached {
        tab_id: i64,
    },
    Navigated {
        tab_id: i64,
        url: String,
    },
    ConsoleMessage {
        tab_id: i64,
        level: ConsoleLevel,
        text: String,
        timestamp: f64,
    },
    ExceptionThrown {
        tab_id: i64,
        message: String,
        stack: Option<String>,
        timestamp: f64,
    },
    RequestWillBeSent {
        tab_id: i64,
        request_id: String,
        url: String,
        method: String,
        timestamp: f64,
    },
    ResponseReceived {
        tab_id: i64,
        request_id: String,
        status: u16,
        mime_type: String,
    },
    LoadingFinished {
        tab_id: i64,
        request_id: String,
    },
    LoadingFailed {
        tab_id: i64,
        request_id: String,
        error_text: String,
    },
}

/// Observer of the tab event stream.
#[async_trait]
pub trait TabObserver: Send + Sync {
    /// Human-readable name for logging
    fn name(&self) -> &str;

    /// Called for every event; the observer decides what it cares about.
    async fn on_event(&self, event: &TabEvent);
}

/// Dispatches each event to every registered observer, sequentially.
/// Sequential on purpose: observers mutate shared per-tab state, and the
/// append order must match the arrival order.
pub struct ObserverHub {
    observers: Vec<Arc<dyn TabObserver>>,
}

impl ObserverHub {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    pub fn register(&mut self, observer: Arc<dyn TabObserver>) {
        tracing::debug!("Registered observer: {}", observer.name());
        self.observers.push(observer);
    }

    pub async fn dispatch(&self, event: &TabEvent) {
        for observer in &self.observers {
            observer.on_event(event).await;
        }
    }
}

impl Default for ObserverHub {
    fn default() -> Self {
        Self::new()
    }
}
