use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::Datagram;

/// UDP datagram transport.
///
/// A single bound socket serving every peer. Reads block unless a read
/// timeout is set, in which case an expired read surfaces as an error for
/// which [`TransportError::is_timeout`] is true.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind a UDP socket to `addr`.
    ///
    /// Port 0 lets the OS choose; [`UdpTransport::local_addr`] reports the
    /// port actually bound.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = socket.local_addr()?;
        info!(%local_addr, "listening on udp socket");
        Ok(Self { socket, local_addr })
    }

    /// The address this socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Set read timeout on the underlying socket.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.socket.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Try to clone this transport (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            socket: self.socket.try_clone()?,
            local_addr: self.local_addr,
        })
    }
}

impl Datagram for UdpTransport {
    fn send_to(&self, payload: &[u8], addr: SocketAddr) -> Result<()> {
        let sent = self.socket.send_to(payload, addr)?;
        if sent != payload.len() {
            return Err(TransportError::Io(std::io::Error::other(format!(
                "short datagram send ({sent} of {} bytes)",
                payload.len()
            ))));
        }
        debug!(peer = %addr, bytes = sent, "datagram sent");
        Ok(())
    }

    fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        loop {
            match self.socket.recv_from(buf) {
                Ok(received) => return Ok(received),
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn test_bind_reports_ephemeral_port() {
        let transport = UdpTransport::bind(loopback()).unwrap();
        assert_ne!(transport.local_addr().port(), 0);
    }

    #[test]
    fn test_send_and_receive() {
        let server = UdpTransport::bind(loopback()).unwrap();
        let client = UdpTransport::bind(loopback()).unwrap();
        server
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();

        client.send_to(b"/connect/7/", server.local_addr()).unwrap();

        let mut buf = [0u8; 64];
        let (n, from) = server.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"/connect/7/");
        assert_eq!(from, client.local_addr());
    }

    #[test]
    fn test_read_timeout_is_reported_as_timeout() {
        let transport = UdpTransport::bind(loopback()).unwrap();
        transport
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();

        let err = transport.recv_from(&mut [0u8; 16]).unwrap_err();
        assert!(err.is_timeout(), "unexpected error: {err}");
    }

    #[test]
    fn test_bind_conflict_is_bind_error() {
        let first = UdpTransport::bind(loopback()).unwrap();
        let result = UdpTransport::bind(first.local_addr());
        assert!(matches!(result, Err(TransportError::Bind { .. })));
    }

    #[test]
    fn test_cloned_transport_shares_socket() {
        let server = UdpTransport::bind(loopback()).unwrap();
        let clone = server.try_clone().unwrap();
        assert_eq!(clone.local_addr(), server.local_addr());

        clone
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let client = UdpTransport::bind(loopback()).unwrap();
        client.send_to(b"ping", server.local_addr()).unwrap();

        let mut buf = [0u8; 8];
        let (n, _) = clone.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");
    }
}
