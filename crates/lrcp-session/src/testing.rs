//! Doubles shared by the unit tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use lrcp_frame::{decode_frame, Frame, FrameWriter, SessionId, DEFAULT_MAX_FRAME};
use lrcp_transport::{Datagram, Result, TransportError};

use crate::app::StreamHandler;
use crate::dispatcher::Outbound;

pub(crate) fn peer() -> SocketAddr {
    "127.0.0.1:9999".parse().unwrap()
}

/// Poll `condition` until it holds or `timeout` passes.
pub(crate) fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Records every frame sent through it.
#[derive(Default)]
pub(crate) struct Recorder {
    sent: Mutex<Vec<(Frame, SocketAddr)>>,
}

impl Recorder {
    pub(crate) fn frames(&self) -> Vec<Frame> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(frame, _)| frame.clone())
            .collect()
    }

    pub(crate) fn take(&self) -> Vec<Frame> {
        self.take_with_addr()
            .into_iter()
            .map(|(frame, _)| frame)
            .collect()
    }

    pub(crate) fn take_with_addr(&self) -> Vec<(Frame, SocketAddr)> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

impl Datagram for Recorder {
    fn send_to(&self, payload: &[u8], addr: SocketAddr) -> Result<()> {
        let frame = decode_frame(payload, DEFAULT_MAX_FRAME).expect("sent frames decode");
        self.sent.lock().unwrap().push((frame, addr));
        Ok(())
    }

    fn recv_from(&self, _buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        Err(TransportError::Shutdown)
    }
}

pub(crate) fn outbound(recorder: &Arc<Recorder>) -> Outbound {
    let endpoint: Arc<dyn Datagram> = recorder.clone();
    FrameWriter::new(endpoint)
}

/// Handler that keeps what it is given and never replies.
#[derive(Clone, Default)]
pub(crate) struct Collect {
    inner: Arc<Mutex<(Vec<u8>, usize)>>,
}

impl Collect {
    pub(crate) fn bytes(&self) -> Vec<u8> {
        self.inner.lock().unwrap().0.clone()
    }

    pub(crate) fn closes(&self) -> usize {
        self.inner.lock().unwrap().1
    }
}

impl StreamHandler for Collect {
    fn on_bytes(&mut self, _session: SessionId, bytes: &[u8]) -> Vec<u8> {
        self.inner.lock().unwrap().0.extend_from_slice(bytes);
        Vec::new()
    }

    fn on_close(&mut self, _session: SessionId) {
        self.inner.lock().unwrap().1 += 1;
    }
}
