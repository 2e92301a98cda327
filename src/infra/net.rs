//! Listener binding with fallback to the next free port.

use std::{io, net::SocketAddr};

use tokio::net::TcpListener;
use tracing::warn;

use super::error::InfraError;

/// Bind `addr`, moving up one port at a time while the port is in use.
///
/// At most `fallback_attempts` ports after the requested one are tried. Errors
/// other than "address in use" abort immediately.
pub async fn bind_with_fallback(
    addr: SocketAddr,
    fallback_attempts: u16,
) -> Result<TcpListener, InfraError> {
    let mut candidate = addr;
    let mut remaining = fallback_attempts;

    loop {
        match TcpListener::bind(candidate).await {
            Ok(listener) => {
                if candidate.port() != addr.port() {
                    warn!(
                        target = "livedoc::serve",
                        requested_port = addr.port(),
                        port = candidate.port(),
                        "Requested port in use; listening on fallback port"
                    );
                }
                return Ok(listener);
            }
            Err(err) if err.kind() == io::ErrorKind::AddrInUse && remaining > 0 => {
                let Some(next) = candidate.port().checked_add(1) else {
                    return Err(InfraError::bind(candidate, err));
                };
                remaining -= 1;
                candidate.set_port(next);
            }
            Err(err) => return Err(InfraError::bind(candidate, err)),
        }
    }
}
