//! Browser Tool Integration Layer
//!
//! Everything between the transport and the browser: per-tab debug state
//! fed by the event stream, and the dispatcher that turns protocol actions
//! into answers.
//!
//! ```text
//! CDP events → TabEvent → ObserverHub → collectors → TabRegistry
//!                                                        ↑
//! server → Request envelope → Dispatcher ────────────────┘
//!                                  ↓
//!                          BrowserSurface / PageDriver
//! ```

pub mod collectors;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod surface;
pub mod tabs;

pub use collectors::{
    default_hub, ConsoleCollector, ExceptionCollector, LifecycleCollector, NetworkCollector,
};
pub use dispatch::Dispatcher;
pub use error::ToolError;
pub use events::{ConsoleLevel, ObserverHub, TabEvent, TabObserver};
pub use surface::{ActiveTabCell, BrowserSurface};
pub use tabs::{ConsoleEntry, ExceptionEntry, NetworkRequestRecord, TabRegistry};
