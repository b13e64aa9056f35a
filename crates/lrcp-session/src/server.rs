use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use lrcp_frame::{FrameError, FrameReader, FrameWriter};
use lrcp_transport::{Datagram, IdleTracker, UdpTransport};
use tracing::{debug, info};

use crate::app::{line_reverse, HandlerFactory};
use crate::config::SessionConfig;
use crate::dispatcher::Dispatcher;
use crate::error::Result;

/// Stops a running [`Server`] from another thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// UDP server feeding one dispatch loop.
///
/// A single thread receives every datagram and runs the dispatcher, so
/// inbound frames are applied in arrival order. Peers that stay silent for
/// the idle timeout have their sessions closed.
pub struct Server {
    reader: FrameReader<UdpTransport>,
    dispatcher: Dispatcher,
    idle: IdleTracker<SocketAddr>,
    shutdown: ShutdownHandle,
}

impl Server {
    /// Bind to `addr`, creating a handler from `handlers` for each session.
    pub fn bind(addr: SocketAddr, handlers: HandlerFactory, config: SessionConfig) -> Result<Self> {
        let transport = UdpTransport::bind(addr)?;
        let reader_socket = transport.try_clone()?;
        reader_socket.set_read_timeout(Some(config.poll_interval()))?;
        let local_addr = transport.local_addr();

        let endpoint: Arc<dyn Datagram> = Arc::new(transport);
        let writer = FrameWriter::with_config(endpoint, config.frame.clone());
        let reader = FrameReader::with_config(reader_socket, config.frame.clone());
        let idle = IdleTracker::new(config.idle_timeout);

        info!(
            local = %local_addr,
            retransmit = ?config.retransmit_interval,
            idle = ?config.idle_timeout,
            "server bound"
        );
        Ok(Self {
            reader,
            dispatcher: Dispatcher::new(writer, handlers, config),
            idle,
            shutdown: ShutdownHandle(Arc::new(AtomicBool::new(false))),
        })
    }

    /// Bind a server that reverses each line it receives.
    pub fn line_reverse(addr: SocketAddr, config: SessionConfig) -> Result<Self> {
        Self::bind(addr, line_reverse(), config)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.reader.get_ref().local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Receive and dispatch until shut down, then close every session.
    pub fn run(mut self) -> Result<()> {
        let result = self.serve();
        for stats in self.dispatcher.all_stats() {
            info!(
                session = stats.id,
                peer = %stats.peer,
                received = stats.received,
                sent = stats.sent,
                acknowledged = stats.acknowledged,
                "closing session on shutdown"
            );
        }
        self.dispatcher.shutdown();
        info!(local = %self.local_addr(), "server stopped");
        result
    }

    fn serve(&mut self) -> Result<()> {
        while !self.shutdown.is_shutdown() {
            self.poll()?;
        }
        Ok(())
    }

    /// Wait up to the sweep interval for one datagram, dispatch it, then
    /// close sessions of peers whose idle deadline has passed.
    ///
    /// Returns `true` if a datagram was handled.
    pub fn poll(&mut self) -> Result<bool> {
        let handled = match self.reader.read_datagram() {
            Ok((raw, from)) => {
                self.idle.touch(from, Instant::now());
                self.dispatcher.handle(raw, from);
                true
            }
            Err(FrameError::Transport(err)) if err.is_timeout() => false,
            Err(err) => return Err(err.into()),
        };
        let now = Instant::now();
        if self.idle.next_deadline().is_some_and(|deadline| deadline <= now) {
            self.sweep(now);
        }
        Ok(handled)
    }

    fn sweep(&mut self, now: Instant) {
        for peer in self.idle.expire(now) {
            let closed = self.dispatcher.close_idle(peer);
            if closed > 0 {
                info!(peer = %peer, sessions = closed, "peer idle, sessions closed");
            } else {
                debug!(peer = %peer, "peer idle");
            }
        }
    }
}
