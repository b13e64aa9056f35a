use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::Result;

/// Largest datagram the receive path reads in one call.
///
/// Frames are far smaller; the slack lets oversized datagrams be read whole
/// and rejected by the codec instead of being silently truncated.
pub const MAX_DATAGRAM: usize = 64 * 1024;

/// An unreliable, unordered datagram endpoint.
///
/// Implementations deliver each payload as a unit or not at all. Both methods
/// take `&self` so one endpoint can be shared between the dispatch thread and
/// retransmit timers.
pub trait Datagram: Send + Sync {
    /// Send one datagram to `addr`.
    fn send_to(&self, payload: &[u8], addr: SocketAddr) -> Result<()>;

    /// Receive the next datagram into `buf`, returning its length and source.
    fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)>;
}

impl<T: Datagram + ?Sized> Datagram for Arc<T> {
    fn send_to(&self, payload: &[u8], addr: SocketAddr) -> Result<()> {
        (**self).send_to(payload, addr)
    }

    fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        (**self).recv_from(buf)
    }
}

impl<T: Datagram + ?Sized> Datagram for &T {
    fn send_to(&self, payload: &[u8], addr: SocketAddr) -> Result<()> {
        (**self).send_to(payload, addr)
    }

    fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        (**self).recv_from(buf)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
    }

    impl Datagram for Recorder {
        fn send_to(&self, payload: &[u8], addr: SocketAddr) -> Result<()> {
            self.sent.lock().unwrap().push((payload.to_vec(), addr));
            Ok(())
        }

        fn recv_from(&self, _buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
            Err(crate::TransportError::Shutdown)
        }
    }

    fn addr() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    #[test]
    fn arc_forwards_to_inner() {
        let inner = Arc::new(Recorder::default());
        let shared: Arc<dyn Datagram> = inner.clone();

        shared.send_to(b"/connect/1/", addr()).unwrap();

        let sent = inner.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, b"/connect/1/");
        assert_eq!(sent[0].1, addr());
    }

    fn round_trip<D: Datagram>(endpoint: D) -> crate::TransportError {
        endpoint.send_to(b"x", addr()).unwrap();
        endpoint.recv_from(&mut [0u8; 4]).unwrap_err()
    }

    #[test]
    fn reference_forwards_to_inner() {
        let inner = Recorder::default();

        let err = round_trip(&inner);

        assert!(matches!(err, crate::TransportError::Shutdown));
        assert_eq!(inner.sent.lock().unwrap().len(), 1);
    }
}
