//! Per-Tab Debug State
//!
//! One record per attached browser tab: bounded ring buffers for console
//! messages and exceptions, plus network requests tracked from in-flight
//! to completed. Created lazily on attach, destroyed on detach or tab
//! close. Keys are externally stable tab IDs, so a plain keyed store with
//! explicit insert/remove/clear is all that is needed - no arena, no
//! generation scheme, and never a raw shared global.

use std::collections::{HashMap, VecDeque};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::events::ConsoleLevel;

/// Ring buffer bounds. Old entries fall off the front.
pub const CONSOLE_BUFFER_CAP: usize = 1_000;
pub const EXCEPTION_BUFFER_CAP: usize = 250;
pub const COMPLETED_REQUEST_CAP: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleEntry {
    pub level: ConsoleLevel,
    pub text: String,
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionEntry {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRequestRecord {
    pub request_id: String,
    pub url: String,
    pub method: String,
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
    pub finished: bool,
}

/// Debug state for one tab.
#[derive(Debug, Default)]
struct TabDebugState {
    console: VecDeque<ConsoleEntry>,
    exceptions: VecDeque<ExceptionEntry>,
    inflight: HashMap<String, NetworkRequestRecord>,
    completed: VecDeque<NetworkRequestRecord>,
}

/// Keyed store of per-tab debug state.
///
/// All mutation goes through these methods; mutators return `false` when
/// the tab is not attached so callers can log-and-drop.
pub struct TabRegistry {
    tabs: DashMap<i64, TabDebugState>,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self {
            tabs: DashMap::new(),
        }
    }

    /// Attach a tab, creating its (empty) state. Idempotent.
    pub fn attach(&self, tab_id: i64) {
        self.tabs.entry(tab_id).or_default();
    }

    /// Detach a tab and drop its state.
    pub fn detach(&self, tab_id: i64) {
        self.tabs.remove(&tab_id);
    }

    pub fn clear(&self) {
        self.tabs.clear();
    }

    pub fn is_attached(&self, tab_id: i64) -> bool {
        self.tabs.contains_key(&tab_id)
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn push_console(&self, tab_id: i64, entry: ConsoleEntry) -> bool {
        match self.tabs.get_mut(&tab_id) {
            Some(mut state) => {
                push_bounded(&mut state.console, entry, CONSOLE_BUFFER_CAP);
                true
            }
            None => false,
        }
    }

    pub fn push_exception(&self, tab_id: i64, entry: ExceptionEntry) -> bool {
        match self.tabs.get_mut(&tab_id) {
            Some(mut state) => {
                push_bounded(&mut state.exceptions, entry, EXCEPTION_BUFFER_CAP);
                true
            }
            None => false,
        }
    }

    /// Start tracking a network request as in-flight.
    pub fn begin_request(&self, tab_id: i64, record: NetworkRequestRecord) -> bool {
        match self.tabs.get_mut(&tab_id) {
            Some(mut state) => {
                state.inflight.insert(record.request_id.clone(), record);
                true
            }
            None => false,
        }
    }

    /// Record response metadata on an in-flight request.
    pub fn record_response(
        &self,
        tab_id: i64,
        request_id: &str,
        status: u16,
        mime_type: &str,
    ) -> bool {
        match self.tabs.get_mut(&tab_id) {
            Some(mut state) => match state.inflight.get_mut(request_id) {
                Some(record) => {
                    record.status = Some(status);
                    record.mime_type = Some(mime_type.to_string());
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    /// Move an in-flight request to the completed list, optionally with a
    /// failure reason.
    pub fn finish_request(&self, tab_id: i64, request_id: &str, error_text: Option<String>) -> bool {
        match self.tabs.get_mut(&tab_id) {
            Some(mut state) => match state.inflight.remove(request_id) {
                Some(mut record) => {
                    record.finished = true;
                    record.error_text = error_text;
                    push_bounded(&mut state.completed, record, COMPLETED_REQUEST_CAP);
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    /// Console snapshot, oldest first; `limit` keeps the newest entries.
    pub fn console_logs(&self, tab_id: i64, limit: Option<usize>) -> Vec<ConsoleEntry> {
        let Some(state) = self.tabs.get(&tab_id) else {
            return Vec::new();
        };
        let entries: Vec<ConsoleEntry> = state.console.iter().cloned().collect();
        match limit {
            Some(limit) if entries.len() > limit => entries[entries.len() - limit..].to_vec(),
            _ => entries,
        }
    }

    pub fn exceptions(&self, tab_id: i64) -> Vec<ExceptionEntry> {
        self.tabs
            .get(&tab_id)
            .map(|state| state.exceptions.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Completed requests (oldest first) followed by still-in-flight ones.
    pub fn network_requests(&self, tab_id: i64) -> Vec<NetworkRequestRecord> {
        let Some(state) = self.tabs.get(&tab_id) else {
            return Vec::new();
        };
        let mut records: Vec<NetworkRequestRecord> = state.completed.iter().cloned().collect();
        let mut inflight: Vec<NetworkRequestRecord> = state.inflight.values().cloned().collect();
        inflight.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        records.extend(inflight);
        records
    }
}

impl Default for TabRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, entry: T, cap: usize) {
    if buffer.len() == cap {
        buffer.pop_front();
    }
    buffer.push_back(entry);
}
