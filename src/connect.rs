//! Connection provisioning
//!
//! Resolves the transport mode and port for a [`ConnectionSpec`] and opens
//! the session through a [`Connector`]. `auto` mode walks a fixed order
//! (SSL, then STARTTLS, then plaintext) and stops at the first success.

use crate::errors::{ConnectFailure, ConnectionError};
use crate::imap::Connector;
use crate::models::{ConnectionSpec, TransportMode};
use crate::observer::RunObserver;

/// Conventional IMAPS port
pub const IMAPS_PORT: u16 = 993;
/// Conventional IMAP port (plaintext and STARTTLS)
pub const IMAP_PORT: u16 = 143;

/// Auto-detection order
pub const AUTO_ORDER: [TransportMode; 3] = [
    TransportMode::Ssl,
    TransportMode::StartTls,
    TransportMode::Plain,
];

/// Port for `mode`, honouring an explicit override
pub fn port_for(mode: TransportMode, explicit: Option<u16>) -> u16 {
    explicit.unwrap_or(match mode {
        TransportMode::Ssl => IMAPS_PORT,
        _ => IMAP_PORT,
    })
}

/// Modes to attempt for a connection, in order
///
/// An explicit mode is tried alone; `auto` always follows [`AUTO_ORDER`].
/// An explicit port applies to every attempt.
pub fn attempt_plan(spec: &ConnectionSpec) -> Vec<(TransportMode, u16)> {
    match spec.mode {
        TransportMode::Auto => AUTO_ORDER
            .into_iter()
            .map(|mode| (mode, port_for(mode, spec.port)))
            .collect(),
        mode => vec![(mode, port_for(mode, spec.port))],
    }
}

/// Open an authenticated session
///
/// # Errors
///
/// Returns the last attempt's [`ConnectionError`] when every planned mode
/// fails. A rejected login ends auto-detection immediately; credentials are
/// never resent over a weaker transport.
pub async fn connect<C: Connector>(
    connector: &C,
    spec: &ConnectionSpec,
    observer: &dyn RunObserver,
) -> Result<C::Session, ConnectionError> {
    let mut last_error = None;
    for (mode, port) in attempt_plan(spec) {
        observer.connect_attempt(mode, port);
        match connector.connect(spec, mode, port).await {
            Ok(session) => {
                tracing::info!(host = %spec.host, port, %mode, "connected and authenticated");
                return Ok(session);
            }
            Err(err) => {
                observer.connect_failed(mode, port, &err);
                let fatal = err.cause == ConnectFailure::AuthRejected;
                last_error = Some(err);
                if fatal {
                    // Credentials are never resent over a weaker transport.
                    break;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        ConnectionError::new(ConnectFailure::Protocol, "no transport mode attempted")
    }))
}
