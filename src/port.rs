//! Local port discovery for the bridge channel.
//!
//! The port is only known to be free at the moment it is discovered. Between
//! [`allocate_port`] returning and the container engine publishing the port,
//! another process may take it; the launch then fails and surfaces as
//! [`Error::ContainerProvisioningFailure`](crate::Error::ContainerProvisioningFailure).

use std::net::{Ipv4Addr, TcpListener};

use crate::error::Result;

/// Asks the OS for an unused TCP port.
///
/// Binds to port 0 on the wildcard address, reads back the assigned port,
/// and releases the socket before returning.
///
/// # Errors
///
/// Returns an I/O error if no socket can be bound.
pub fn allocate_port() -> Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    let port = listener.local_addr()?.port();
    drop(listener);

    tracing::debug!(port = port, "allocated local port");
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocated_port_is_nonzero() {
        let port = allocate_port().unwrap();
        assert_ne!(port, 0);
    }

    #[test]
    fn test_allocated_port_is_bindable() {
        let port = allocate_port().unwrap();
        // Free at discovery time, so an immediate bind normally succeeds.
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port));
        assert!(listener.is_ok());
    }
}
