//! Port Allocation
//!
//! Several tool-hosting processes may run on one machine at once, so the
//! listening port cannot be fixed: scan a bounded range and take the first
//! port that binds. Every bind failure - in use, permission, transient -
//! just advances the scan; only exhausting the whole range is an error,
//! and it is a distinct one so callers can tell it from a plain bind error.

use std::net::TcpListener as StdTcpListener;

use thiserror::Error;
use tokio::net::TcpListener;

/// First port tried when none is configured.
pub const DEFAULT_BASE_PORT: u16 = 8765;

/// Number of consecutive ports scanned. The extension side scans the same
/// range, which is how the two sides find each other without negotiation.
pub const DEFAULT_PORT_RANGE: u16 = 10;

pub type Result<T> = std::result::Result<T, PortError>;

#[derive(Debug, Error)]
pub enum PortError {
    #[error("no available port in range [{base}, {base}+{range})")]
    Exhausted { base: u16, range: u16 },

    #[error("listener setup failed: {0}")]
    Listener(#[from] std::io::Error),
}

/// Bind the first free port in `[base, base + range)`, in order.
///
/// Returns a tokio listener ready for `accept()`. Must be called from
/// within a tokio runtime (the std listener is registered with the
/// reactor here).
pub fn bind_first_free(base: u16, range: u16) -> Result<TcpListener> {
    let listener = scan_with(base, range, |port| {
        StdTcpListener::bind(("127.0.0.1", port))
    })?;
    listener.set_nonblocking(true)?;
    Ok(TcpListener::from_std(listener)?)
}

/// Scan core, generic over the binder so skip behavior is testable without
/// occupying real ports.
fn scan_with<T>(
    base: u16,
    range: u16,
    mut bind: impl FnMut(u16) -> std::io::Result<T>,
) -> Result<T> {
    for offset in 0..range {
        let port = base.saturating_add(offset);
        match bind(port) {
            Ok(bound) => {
                tracing::debug!("Bound port {}", port);
                return Ok(bound);
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!("Port {} in use, trying next", port);
            }
            Err(err) => {
                // Permission and transient errors on one port often clear
                // up on the next; treat them the same as in-use.
                tracing::debug!("Skipping port {} after bind error: {}", port, err);
            }
        }
    }
    Err(PortError::Exhausted { base, range })
}
