use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use lrcp_frame::{decode_frame, Frame, FrameWriter, SessionId};
use lrcp_transport::Datagram;
use tracing::{debug, info, warn};

use crate::app::HandlerFactory;
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::retransmit;
use crate::session::{AckOutcome, CloseReason, Session, SessionStats};
use crate::table::{lock, SessionTable, SharedSession};

/// Frame sink shared by the dispatcher and every retransmit timer.
pub type Outbound = FrameWriter<Arc<dyn Datagram>>;

/// Send `frames` to `peer`, logging instead of failing.
///
/// Delivery is best effort; lost frames are recovered by retransmission.
pub(crate) fn emit(outbound: &Outbound, frames: &[Frame], peer: SocketAddr) {
    if let Err(err) = outbound.send_all(frames, peer) {
        warn!(peer = %peer, error = %err, "failed to send frame");
    }
}

/// Routes inbound frames to sessions and exposes the application side.
///
/// All methods take `&self`; the receive loop and any number of application
/// threads can share one dispatcher behind an `Arc`.
pub struct Dispatcher {
    table: Mutex<SessionTable>,
    outbound: Outbound,
    handlers: HandlerFactory,
    config: SessionConfig,
}

impl Dispatcher {
    pub fn new(outbound: Outbound, handlers: HandlerFactory, config: SessionConfig) -> Self {
        Self {
            table: Mutex::new(SessionTable::new()),
            outbound,
            handlers,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Decode one datagram from `from` and act on it.
    ///
    /// Datagrams that are not valid frames are logged and dropped.
    pub fn handle(&self, raw: &[u8], from: SocketAddr) {
        match decode_frame(raw, self.config.frame.max_frame_size) {
            Ok(frame) => {
                debug!(peer = %from, %frame, "frame received");
                self.handle_frame(frame, from);
            }
            Err(err) => {
                warn!(peer = %from, len = raw.len(), error = %err, "dropping invalid datagram");
            }
        }
    }

    /// Act on one decoded frame from `from`.
    pub fn handle_frame(&self, frame: Frame, from: SocketAddr) {
        match frame {
            Frame::Connect { session } => self.on_connect(session, from),
            Frame::Data { session, pos, data } => self.on_data(session, pos, &data, from),
            Frame::Ack { session, length } => self.on_ack(session, length, from),
            Frame::Close { session } => self.on_close(session, from),
        }
    }

    fn on_connect(&self, id: SessionId, from: SocketAddr) {
        let (shared, created) = self.lock_table().get_or_insert_with(id, || {
            Session::new(
                id,
                from,
                (self.handlers)(id),
                self.config.frame.max_chunk_size,
            )
        });

        let mut session = lock(&shared);
        if created {
            info!(session = id, peer = %from, "session opened");
        } else if session.peer() != from {
            info!(
                session = id,
                old = %session.peer(),
                new = %from,
                "session moved to new peer address"
            );
            session.rebind(from);
        }
        let ack = session.on_connect();
        emit(&self.outbound, &[ack], session.peer());
    }

    fn on_data(&self, id: SessionId, pos: u32, data: &[u8], from: SocketAddr) {
        let Some(shared) = self.live(id) else {
            return self.reject(id, from);
        };
        let mut session = lock(&shared);
        if session.is_closed() {
            drop(session);
            return self.reject(id, from);
        }

        let frames = session.on_data(pos, data);
        emit(&self.outbound, &frames, session.peer());
        retransmit::ensure_running(
            &shared,
            &mut session,
            &self.outbound,
            self.config.retransmit_interval,
        );
    }

    fn on_ack(&self, id: SessionId, length: u32, from: SocketAddr) {
        let Some(shared) = self.live(id) else {
            return self.reject(id, from);
        };
        let mut session = lock(&shared);
        if session.is_closed() {
            drop(session);
            return self.reject(id, from);
        }

        match session.on_ack(length) {
            AckOutcome::Stale => {}
            AckOutcome::Advanced { resend } => {
                emit(&self.outbound, &resend, session.peer());
            }
            AckOutcome::Violation => {
                drop(session);
                self.close(id, CloseReason::ProtocolViolation);
            }
        }
    }

    fn on_close(&self, id: SessionId, from: SocketAddr) {
        if !self.close(id, CloseReason::PeerRequested) {
            debug!(session = id, peer = %from, "close for unknown session");
        }
    }

    /// Answer traffic for a session we do not have.
    fn reject(&self, id: SessionId, from: SocketAddr) {
        debug!(session = id, peer = %from, "traffic for unknown session");
        emit(&self.outbound, &[Frame::Close { session: id }], from);
    }

    /// Queue `bytes` on session `id`'s outbound stream.
    pub fn send(&self, id: SessionId, bytes: &[u8]) -> Result<()> {
        let shared = self.live(id).ok_or(SessionError::UnknownSession(id))?;
        let mut session = lock(&shared);

        let frames = session.app_send(bytes)?;
        emit(&self.outbound, &frames, session.peer());
        retransmit::ensure_running(
            &shared,
            &mut session,
            &self.outbound,
            self.config.retransmit_interval,
        );
        Ok(())
    }

    /// Create session `id` towards `peer` and send `connect`.
    ///
    /// If the session already exists, `connect` is sent again.
    pub fn open(&self, id: SessionId, peer: SocketAddr) {
        let (shared, created) = self.lock_table().get_or_insert_with(id, || {
            Session::new(
                id,
                peer,
                (self.handlers)(id),
                self.config.frame.max_chunk_size,
            )
        });
        let session = lock(&shared);
        if created {
            info!(session = id, peer = %peer, "session opened");
        }
        emit(&self.outbound, &[session.connect_frame()], session.peer());
    }

    /// Whether session `id` has heard any `ack` from its peer.
    ///
    /// `None` if the session does not exist.
    pub fn confirmed(&self, id: SessionId) -> Option<bool> {
        let shared = self.live(id)?;
        let session = lock(&shared);
        Some(session.peer_confirmed())
    }

    /// Close session `id` for `reason`.
    ///
    /// Returns `false` if no such session was live.
    pub fn close(&self, id: SessionId, reason: CloseReason) -> bool {
        let Some(shared) = self.lock_table().remove(id) else {
            return false;
        };
        Self::finish(&self.outbound, id, &shared, reason);
        true
    }

    /// Close every session bound to `peer` after it went quiet.
    ///
    /// No `close` is sent. Returns how many sessions were closed.
    pub fn close_idle(&self, peer: SocketAddr) -> usize {
        let ids = self.lock_table().ids_for_peer(peer);
        ids.into_iter()
            .filter(|id| self.close(*id, CloseReason::IdleTimeout))
            .count()
    }

    /// Close every session, notifying each peer.
    pub fn shutdown(&self) {
        let drained = self.lock_table().drain();
        for (id, shared) in drained {
            Self::finish(&self.outbound, id, &shared, CloseReason::LocalShutdown);
        }
    }

    pub fn stats(&self, id: SessionId) -> Option<SessionStats> {
        let shared = self.live(id)?;
        let session = lock(&shared);
        Some(session.stats())
    }

    pub fn all_stats(&self) -> Vec<SessionStats> {
        self.lock_table().stats()
    }

    pub fn session_count(&self) -> usize {
        self.lock_table().len()
    }

    fn finish(outbound: &Outbound, id: SessionId, shared: &SharedSession, reason: CloseReason) {
        let mut session = lock(shared);
        let peer = session.peer();
        if let Some(frame) = session.close(reason) {
            emit(outbound, &[frame], peer);
        }
        info!(session = id, peer = %peer, %reason, "session closed");
    }

    fn live(&self, id: SessionId) -> Option<SharedSession> {
        self.lock_table().get(id)
    }

    fn lock_table(&self) -> MutexGuard<'_, SessionTable> {
        lock(&self.table)
    }
}
