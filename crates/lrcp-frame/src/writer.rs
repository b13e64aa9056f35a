use std::net::SocketAddr;

use bytes::BytesMut;
use lrcp_transport::Datagram;
use tracing::debug;

use crate::codec::{encode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

/// Encodes frames and sends each as one datagram.
///
/// Takes `&self` so a single writer (over a shared endpoint) can be cloned
/// into every thread that emits frames.
#[derive(Clone)]
pub struct FrameWriter<T> {
    inner: T,
    config: FrameConfig,
}

impl<T: Datagram> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self { inner, config }
    }

    /// Encode `frame` and send it to `addr`.
    ///
    /// Frames that would reach the size ceiling are refused before anything
    /// is sent.
    pub fn send(&self, frame: &Frame, addr: SocketAddr) -> Result<()> {
        let size = frame.wire_size();
        if size >= self.config.max_frame_size {
            return Err(FrameError::TooLarge {
                size,
                max: self.config.max_frame_size,
            });
        }

        let mut buf = BytesMut::with_capacity(size);
        encode_frame(frame, &mut buf);
        self.inner.send_to(&buf, addr)?;
        debug!(peer = %addr, %frame, "frame sent");
        Ok(())
    }

    /// Send every frame in order, stopping at the first failure.
    pub fn send_all<'a>(
        &self,
        frames: impl IntoIterator<Item = &'a Frame>,
        addr: SocketAddr,
    ) -> Result<()> {
        for frame in frames {
            self.send(frame, addr)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::codec::{decode_frame, DEFAULT_MAX_FRAME};

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
    }

    impl Datagram for Recorder {
        fn send_to(&self, payload: &[u8], addr: SocketAddr) -> lrcp_transport::Result<()> {
            self.sent.lock().unwrap().push((payload.to_vec(), addr));
            Ok(())
        }

        fn recv_from(&self, _buf: &mut [u8]) -> lrcp_transport::Result<(usize, SocketAddr)> {
            Err(lrcp_transport::TransportError::Shutdown)
        }
    }

    fn peer() -> SocketAddr {
        "10.0.0.1:4000".parse().unwrap()
    }

    #[test]
    fn write_single_frame() {
        let endpoint = Arc::new(Recorder::default());
        let writer = FrameWriter::new(Arc::clone(&endpoint));
        writer.send(&Frame::Connect { session: 3 }, peer()).unwrap();

        let sent = endpoint.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, b"/connect/3/");
        assert_eq!(sent[0].1, peer());
    }

    #[test]
    fn send_all_preserves_order() {
        let endpoint = Arc::new(Recorder::default());
        let writer = FrameWriter::new(Arc::clone(&endpoint));
        let frames = [
            Frame::data(1, 0, "ab"),
            Frame::data(1, 2, "cd"),
            Frame::Close { session: 1 },
        ];
        writer.send_all(&frames, peer()).unwrap();

        let sent = endpoint.sent.lock().unwrap();
        let decoded: Vec<Frame> = sent
            .iter()
            .map(|(raw, _)| decode_frame(raw, DEFAULT_MAX_FRAME).unwrap())
            .collect();
        assert_eq!(decoded, frames);
    }

    #[test]
    fn oversized_frame_rejected_before_sending() {
        let endpoint = Arc::new(Recorder::default());
        let writer = FrameWriter::new(Arc::clone(&endpoint));
        let frame = Frame::data(1, 0, vec![b'\\'; 600]);

        let err = writer.send(&frame, peer()).unwrap_err();

        assert!(matches!(err, FrameError::TooLarge { .. }));
        assert!(endpoint.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn cloned_writers_share_endpoint() {
        let endpoint = Arc::new(Recorder::default());
        let writer = FrameWriter::new(Arc::clone(&endpoint));
        let clone = writer.clone();

        writer.send(&Frame::Close { session: 1 }, peer()).unwrap();
        clone.send(&Frame::Close { session: 2 }, peer()).unwrap();

        assert_eq!(endpoint.sent.lock().unwrap().len(), 2);
    }
}
