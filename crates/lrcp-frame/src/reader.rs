use std::net::SocketAddr;

use lrcp_transport::{Datagram, MAX_DATAGRAM};

use crate::codec::{decode_frame, Frame, FrameConfig};
use crate::error::Result;

/// Reads datagrams from a [`Datagram`] endpoint and decodes them as frames.
///
/// Owns the receive buffer so callers only ever see complete datagrams.
pub struct FrameReader<T> {
    inner: T,
    buf: Vec<u8>,
    config: FrameConfig,
}

impl<T: Datagram> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: vec![0u8; MAX_DATAGRAM],
            config,
        }
    }

    /// Receive the next raw datagram (blocking).
    pub fn read_datagram(&mut self) -> Result<(&[u8], SocketAddr)> {
        let (len, from) = self.inner.recv_from(&mut self.buf)?;
        Ok((&self.buf[..len], from))
    }

    /// Receive and decode the next datagram (blocking).
    ///
    /// A malformed datagram is returned as an error for which
    /// [`crate::FrameError::is_decode`] is true; the reader stays usable.
    pub fn read_frame(&mut self) -> Result<(Frame, SocketAddr)> {
        let max = self.config.max_frame_size;
        let (raw, from) = self.read_datagram()?;
        let frame = decode_frame(raw, max)?;
        Ok((frame, from))
    }

    /// Borrow the underlying endpoint.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }
}
