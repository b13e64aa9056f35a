use std::fmt;
use std::net::SocketAddr;

use bytes::{Buf, BytesMut};
use lrcp_frame::{data_frames, Frame, SessionId, MAX_INT};
use serde::Serialize;
use tracing::{debug, warn};

use crate::app::StreamHandler;
use crate::error::{Result, SessionError};
use crate::retransmit::RetransmitTimer;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Open,
    Closed,
}

/// Why a session was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The peer sent `close`.
    PeerRequested,
    /// The peer acknowledged bytes that were never sent.
    ProtocolViolation,
    /// Nothing was heard from the peer within the idle timeout.
    IdleTimeout,
    /// The local side shut the session down.
    LocalShutdown,
}

impl CloseReason {
    /// Whether closing for this reason tells the peer with a `close` frame.
    pub fn notifies_peer(self) -> bool {
        matches!(self, Self::ProtocolViolation | Self::LocalShutdown)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::PeerRequested => "peer requested",
            Self::ProtocolViolation => "protocol violation",
            Self::IdleTimeout => "idle timeout",
            Self::LocalShutdown => "local shutdown",
        };
        f.write_str(text)
    }
}

/// Result of applying an inbound `ack`.
#[derive(Debug, PartialEq)]
pub enum AckOutcome {
    /// Duplicate or stale; nothing changed.
    Stale,
    /// The acknowledged offset moved forward. `resend` holds the data still
    /// outstanding, to be transmitted immediately.
    Advanced { resend: Vec<Frame> },
    /// The peer acknowledged past what was sent; the session must close.
    Violation,
}

/// What a retransmit tick asks its timer to do.
#[derive(Debug, PartialEq)]
pub enum Tick {
    /// Send these frames and keep running.
    Resend(Vec<Frame>),
    /// Everything is acknowledged; the timer is released.
    Idle,
    /// The tick belongs to a timer that is no longer the session's.
    Stale,
    /// The session closed; the timer must exit.
    Closed,
}

/// Point-in-time counters for one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStats {
    pub id: SessionId,
    pub peer: SocketAddr,
    pub state: SessionState,
    pub received: u64,
    pub sent: u64,
    pub acknowledged: u64,
    pub pending: usize,
}

/// One side of a reliable, ordered byte stream.
///
/// Pure state machine: every inbound event returns the frames it produces
/// and the caller transmits them. All counters are byte offsets into their
/// stream; `acknowledged <= sent` always holds and `pending` is exactly
/// the bytes in `acknowledged..sent`.
pub struct Session {
    id: SessionId,
    peer: SocketAddr,
    state: SessionState,
    received: u64,
    sent: u64,
    acknowledged: u64,
    pending: BytesMut,
    chunk_size: usize,
    handler: Box<dyn StreamHandler>,
    retransmit: Option<RetransmitTimer>,
    timer_generation: u64,
    peer_confirmed: bool,
}

impl Session {
    pub fn new(
        id: SessionId,
        peer: SocketAddr,
        handler: Box<dyn StreamHandler>,
        chunk_size: usize,
    ) -> Self {
        Self {
            id,
            peer,
            state: SessionState::Open,
            received: 0,
            sent: 0,
            acknowledged: 0,
            pending: BytesMut::new(),
            chunk_size: chunk_size.max(1),
            handler,
            retransmit: None,
            timer_generation: 0,
            peer_confirmed: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Address outbound frames are sent to.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Whether the peer has acknowledged anything, including the `ack` that
    /// answers our `connect`.
    pub fn peer_confirmed(&self) -> bool {
        self.peer_confirmed
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            id: self.id,
            peer: self.peer,
            state: self.state,
            received: self.received,
            sent: self.sent,
            acknowledged: self.acknowledged,
            pending: self.pending.len(),
        }
    }

    /// Point the session at a new peer address.
    pub fn rebind(&mut self, peer: SocketAddr) {
        self.peer = peer;
    }

    /// Frame that opens this session from the initiating side.
    pub fn connect_frame(&self) -> Frame {
        Frame::Connect { session: self.id }
    }

    /// Handle `connect`: acknowledge everything received so far.
    pub fn on_connect(&mut self) -> Frame {
        self.ack_frame()
    }

    /// Handle `data` at `pos`.
    ///
    /// Bytes are delivered only when `pos` is exactly the next expected
    /// offset. Out-of-order and duplicate data is dropped and answered with
    /// the current cumulative `ack` so the peer retransmits. The handler's
    /// reply, if any, follows the `ack` as new outbound data.
    pub fn on_data(&mut self, pos: u32, data: &[u8]) -> Vec<Frame> {
        if self.is_closed() {
            return Vec::new();
        }

        let pos = u64::from(pos);
        let mut reply = Vec::new();
        if pos == self.received && !data.is_empty() {
            let end = self.received + data.len() as u64;
            if end > u64::from(MAX_INT) {
                warn!(
                    session = self.id,
                    received = self.received,
                    len = data.len(),
                    "dropping data past the largest acknowledgeable offset"
                );
            } else {
                self.received = end;
                reply = self.handler.on_bytes(self.id, data);
            }
        } else if pos != self.received {
            debug!(
                session = self.id,
                pos,
                expected = self.received,
                "data out of order"
            );
        }

        let mut frames = vec![self.ack_frame()];
        if !reply.is_empty() {
            match self.app_send(&reply) {
                Ok(data) => frames.extend(data),
                Err(err) => warn!(session = self.id, error = %err, "dropping reply"),
            }
        }
        frames
    }

    /// Handle `ack` of `length` bytes.
    pub fn on_ack(&mut self, length: u32) -> AckOutcome {
        if self.is_closed() {
            return AckOutcome::Stale;
        }
        self.peer_confirmed = true;

        let length = u64::from(length);
        if length <= self.acknowledged {
            return AckOutcome::Stale;
        }
        if length > self.sent {
            warn!(
                session = self.id,
                length,
                sent = self.sent,
                "peer acknowledged unsent data"
            );
            return AckOutcome::Violation;
        }

        self.pending.advance((length - self.acknowledged) as usize);
        self.acknowledged = length;

        if self.acknowledged == self.sent {
            self.cancel_timer();
            return AckOutcome::Advanced { resend: Vec::new() };
        }
        AckOutcome::Advanced {
            resend: self.pending_frames(),
        }
    }

    /// Queue application bytes on the outbound stream.
    ///
    /// Returns the `data` frames to transmit now; the same bytes stay pending
    /// until acknowledged.
    pub fn app_send(&mut self, bytes: &[u8]) -> Result<Vec<Frame>> {
        if self.is_closed() {
            return Err(SessionError::Closed(self.id));
        }
        let frames = data_frames(self.id, self.sent, bytes, self.chunk_size)
            .map_err(|_| SessionError::StreamExhausted { id: self.id })?;

        self.pending.extend_from_slice(bytes);
        self.sent += bytes.len() as u64;
        Ok(frames)
    }

    /// Handle a retransmit tick from the timer with `generation`.
    pub fn on_tick(&mut self, generation: u64) -> Tick {
        if self.is_closed() {
            return Tick::Closed;
        }
        match &self.retransmit {
            Some(timer) if timer.generation() == generation => {}
            _ => return Tick::Stale,
        }

        if self.acknowledged < self.sent {
            Tick::Resend(self.pending_frames())
        } else {
            self.retransmit = None;
            Tick::Idle
        }
    }

    /// Close the session.
    ///
    /// Idempotent. Cancels the retransmit timer and notifies the handler.
    /// Returns the `close` frame to send when `reason` calls for one.
    pub fn close(&mut self, reason: CloseReason) -> Option<Frame> {
        if self.is_closed() {
            return None;
        }
        self.state = SessionState::Closed;
        self.cancel_timer();
        self.handler.on_close(self.id);

        reason
            .notifies_peer()
            .then_some(Frame::Close { session: self.id })
    }

    /// Whether unacknowledged data is waiting without a timer to resend it.
    pub(crate) fn needs_timer(&self) -> bool {
        !self.is_closed() && self.retransmit.is_none() && self.acknowledged < self.sent
    }

    /// Reserve the generation for the next timer.
    pub(crate) fn next_timer_generation(&mut self) -> u64 {
        self.timer_generation += 1;
        self.timer_generation
    }

    pub(crate) fn arm_timer(&mut self, timer: RetransmitTimer) {
        self.cancel_timer();
        self.retransmit = Some(timer);
    }

    pub(crate) fn timer_armed(&self) -> bool {
        self.retransmit.is_some()
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.retransmit.take() {
            timer.cancel();
        }
    }

    fn ack_frame(&self) -> Frame {
        Frame::Ack {
            session: self.id,
            // `received` never passes MAX_INT.
            length: self.received as u32,
        }
    }

    fn pending_frames(&self) -> Vec<Frame> {
        match data_frames(self.id, self.acknowledged, &self.pending, self.chunk_size) {
            Ok(frames) => frames,
            Err(err) => {
                warn!(session = self.id, error = %err, "cannot frame pending data");
                Vec::new()
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state)
            .field("received", &self.received)
            .field("sent", &self.sent)
            .field("acknowledged", &self.acknowledged)
            .field("pending", &self.pending.len())
            .field("timer", &self.retransmit.is_some())
            .finish()
    }
}
