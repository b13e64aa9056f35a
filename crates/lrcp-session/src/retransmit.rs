//! Per-session retransmission.
//!
//! A session with unacknowledged data owns exactly one timer. The timer
//! thread sleeps for the interval, then asks the session (under its lock)
//! what to resend. Closing the session cancels the timer in the same
//! critical section, and a tick that loses the race still sees the closed
//! state and exits without sending.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use lrcp_frame::SessionId;
use tracing::{debug, warn};

use crate::dispatcher::{emit, Outbound};
use crate::session::{Session, Tick};
use crate::table::{lock, SharedSession};

/// Handle to a running retransmit timer.
///
/// Dropping the handle also stops the timer.
#[derive(Debug)]
pub struct RetransmitTimer {
    generation: u64,
    cancel: Option<Sender<()>>,
}

impl RetransmitTimer {
    /// Spawn a timer thread for `session`.
    pub fn start(
        session: Weak<Mutex<Session>>,
        id: SessionId,
        generation: u64,
        outbound: Outbound,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let (cancel, cancelled) = mpsc::channel();
        thread::Builder::new()
            .name(format!("lrcp-retransmit-{id}"))
            .spawn(move || run(session, id, generation, outbound, interval, cancelled))?;
        debug!(session = id, generation, ?interval, "retransmit timer started");
        Ok(Self {
            generation,
            cancel: Some(cancel),
        })
    }

    /// Handle with no thread behind it.
    #[cfg(test)]
    pub(crate) fn detached(generation: u64) -> Self {
        Self {
            generation,
            cancel: None,
        }
    }

    /// Identifies this timer among all timers the session has owned.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stop the timer. A tick already waiting on the session lock observes
    /// the change and exits.
    pub fn cancel(self) {
        if let Some(cancel) = self.cancel {
            let _ = cancel.send(());
        }
    }
}

fn run(
    session: Weak<Mutex<Session>>,
    id: SessionId,
    generation: u64,
    outbound: Outbound,
    interval: Duration,
    cancelled: Receiver<()>,
) {
    loop {
        match cancelled.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        let Some(shared) = session.upgrade() else {
            break;
        };

        let mut session = lock(&shared);
        match session.on_tick(generation) {
            Tick::Resend(frames) => {
                let stats = session.stats();
                warn!(
                    session = id,
                    acknowledged = stats.acknowledged,
                    pending = stats.pending,
                    "retransmitting unacknowledged data"
                );
                emit(&outbound, &frames, session.peer());
            }
            Tick::Idle | Tick::Stale | Tick::Closed => break,
        }
    }
    debug!(session = id, generation, "retransmit timer stopped");
}

/// Arm a timer for `session` if it has pending data and none is running.
///
/// `session` must be the locked contents of `shared`.
pub(crate) fn ensure_running(
    shared: &SharedSession,
    session: &mut Session,
    outbound: &Outbound,
    interval: Duration,
) {
    if !session.needs_timer() {
        return;
    }
    let generation = session.next_timer_generation();
    match RetransmitTimer::start(
        Arc::downgrade(shared),
        session.id(),
        generation,
        outbound.clone(),
        interval,
    ) {
        Ok(timer) => session.arm_timer(timer),
        Err(err) => warn!(
            session = session.id(),
            error = %err,
            "failed to start retransmit timer"
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use lrcp_frame::Frame;

    use super::*;
    use crate::session::CloseReason;
    use crate::testing::{outbound, peer, wait_until, Collect, Recorder};

    const INTERVAL: Duration = Duration::from_millis(20);

    fn shared_session(id: SessionId) -> SharedSession {
        Arc::new(Mutex::new(Session::new(
            id,
            peer(),
            Box::new(Collect::default()),
            400,
        )))
    }

    #[test]
    fn resends_until_acknowledged() {
        let recorder = Arc::new(Recorder::default());
        let outbound = outbound(&recorder);
        let shared = shared_session(4);

        {
            let mut session = lock(&shared);
            session.app_send(b"abc").unwrap();
            ensure_running(&shared, &mut session, &outbound, INTERVAL);
            assert!(session.timer_armed());
        }

        assert!(wait_until(Duration::from_secs(2), || {
            recorder.frames().len() >= 2
        }));
        assert!(recorder
            .frames()
            .iter()
            .all(|frame| *frame == Frame::data(4, 0, "abc")));

        lock(&shared).on_ack(3);
        assert!(!lock(&shared).timer_armed());

        thread::sleep(INTERVAL * 3);
        let settled = recorder.frames().len();
        thread::sleep(INTERVAL * 3);
        assert_eq!(recorder.frames().len(), settled);
    }

    #[test]
    fn only_one_timer_per_session() {
        let recorder = Arc::new(Recorder::default());
        let outbound = outbound(&recorder);
        let shared = shared_session(4);

        let mut session = lock(&shared);
        session.app_send(b"abc").unwrap();
        ensure_running(&shared, &mut session, &outbound, INTERVAL);
        let first = session.next_timer_generation();
        ensure_running(&shared, &mut session, &outbound, INTERVAL);
        session.app_send(b"def").unwrap();
        ensure_running(&shared, &mut session, &outbound, INTERVAL);

        // Only the first call armed; reading `first` used up one generation.
        assert_eq!(session.next_timer_generation(), first + 1);
    }

    #[test]
    fn close_stops_timer_without_sending() {
        let recorder = Arc::new(Recorder::default());
        let outbound = outbound(&recorder);
        let shared = shared_session(8);

        {
            let mut session = lock(&shared);
            session.app_send(b"abc").unwrap();
            ensure_running(&shared, &mut session, &outbound, INTERVAL);
            session.close(CloseReason::PeerRequested);
        }

        let deadline = Instant::now() + INTERVAL * 5;
        while Instant::now() < deadline {
            thread::sleep(INTERVAL);
        }
        assert!(recorder.frames().is_empty());
    }

    #[test]
    fn dropped_session_ends_timer() {
        let recorder = Arc::new(Recorder::default());
        let outbound = outbound(&recorder);
        let shared = shared_session(8);

        {
            let mut session = lock(&shared);
            session.app_send(b"abc").unwrap();
            ensure_running(&shared, &mut session, &outbound, INTERVAL);
        }
        drop(shared);

        thread::sleep(INTERVAL * 4);
        assert!(recorder.frames().is_empty());
    }
}
