use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use lrcp_frame::{FrameError, FrameReader, FrameWriter, SessionId};
use lrcp_transport::{Datagram, Mailbox, MailboxError, TransportError, UdpTransport};
use tracing::{debug, info, warn};

use crate::app::{HandlerFactory, StreamHandler};
use crate::config::SessionConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{Result, SessionError};
use crate::session::{CloseReason, SessionStats};

/// Hands delivered bytes to the client's reader.
///
/// The inbox holds one chunk at a time, so a slow reader holds back the
/// receive thread instead of buffering without limit.
struct Inbox(Arc<Mailbox<Bytes>>);

impl StreamHandler for Inbox {
    fn on_bytes(&mut self, session: SessionId, bytes: &[u8]) -> Vec<u8> {
        if self.0.put(Bytes::copy_from_slice(bytes)).is_err() {
            debug!(session, "inbox ended, dropping bytes");
        }
        Vec::new()
    }

    fn on_close(&mut self, _session: SessionId) {
        self.0.put_end();
    }
}

/// The initiating side of one session.
///
/// Owns a UDP socket and a background receive thread. Bytes from the server
/// are read back line by line.
pub struct Client {
    id: SessionId,
    server: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    inbox: Arc<Mailbox<Bytes>>,
    stop: Arc<AtomicBool>,
    receiver: Option<JoinHandle<()>>,
}

impl Client {
    /// Open session `id` to `server`.
    ///
    /// `connect` is re-sent every retransmit interval until the server
    /// acknowledges it or the connect timeout passes.
    pub fn connect(server: SocketAddr, id: SessionId, config: SessionConfig) -> Result<Self> {
        let bind: SocketAddr = if server.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let transport = UdpTransport::bind(bind)?;
        let reader_socket = transport.try_clone()?;
        reader_socket.set_read_timeout(Some(config.poll_interval()))?;
        let local_addr = transport.local_addr();

        let inbox = Arc::new(Mailbox::new());
        let sink = Arc::clone(&inbox);
        let handlers: HandlerFactory = Arc::new(move |_: SessionId| -> Box<dyn StreamHandler> {
            Box::new(Inbox(Arc::clone(&sink)))
        });

        let endpoint: Arc<dyn Datagram> = Arc::new(transport);
        let writer = FrameWriter::with_config(endpoint, config.frame.clone());
        let reader = FrameReader::with_config(reader_socket, config.frame.clone());
        let dispatcher = Arc::new(Dispatcher::new(writer, handlers, config));

        let stop = Arc::new(AtomicBool::new(false));
        let receiver = {
            let dispatcher = Arc::clone(&dispatcher);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name(format!("lrcp-client-{id}"))
                .spawn(move || receive(reader, server, dispatcher, stop))
                .map_err(TransportError::from)?
        };

        let client = Self {
            id,
            server,
            dispatcher,
            inbox,
            stop,
            receiver: Some(receiver),
        };
        client.handshake()?;
        info!(session = id, server = %server, local = %local_addr, "client connected");
        Ok(client)
    }

    fn handshake(&self) -> Result<()> {
        let config = self.dispatcher.config();
        let deadline = Instant::now() + config.connect_timeout;

        self.dispatcher.open(self.id, self.server);
        let mut next_connect = Instant::now() + config.retransmit_interval;
        loop {
            match self.dispatcher.confirmed(self.id) {
                Some(true) => return Ok(()),
                Some(false) => {}
                None => return Err(SessionError::Closed(self.id)),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(SessionError::Timeout(config.connect_timeout));
            }
            if now >= next_connect {
                debug!(session = self.id, "connect unanswered, resending");
                self.dispatcher.open(self.id, self.server);
                next_connect = now + config.retransmit_interval;
            }
            thread::sleep(Duration::from_millis(5).min(deadline - now));
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// Queue `bytes` for reliable delivery to the server.
    ///
    /// While a server reply waits for room in the inbox the session stays
    /// busy, so this blocks until [`Client::read_line`] drains it.
    pub fn send(&self, bytes: &[u8]) -> Result<()> {
        self.dispatcher.send(self.id, bytes)
    }

    /// Send `line` followed by a newline.
    pub fn send_line(&self, line: &str) -> Result<()> {
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        self.send(&bytes)
    }

    /// Wait up to `timeout` for the next complete line from the server.
    ///
    /// The newline is stripped. Bytes past it stay queued for the next call.
    pub fn read_line(&self, timeout: Duration) -> Result<String> {
        let deadline = Instant::now() + timeout;
        let mut line = BytesMut::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let chunk = match self.inbox.get(Some(remaining)) {
                Ok(chunk) => chunk,
                Err(err) => {
                    if !line.is_empty() {
                        self.inbox.put_front(line.freeze());
                    }
                    return Err(match err {
                        MailboxError::Ended => SessionError::Closed(self.id),
                        MailboxError::TimedOut(_) => SessionError::Timeout(timeout),
                    });
                }
            };

            match chunk.iter().position(|&b| b == b'\n') {
                Some(end) => {
                    line.extend_from_slice(&chunk[..end]);
                    let rest = chunk.slice(end + 1..);
                    if !rest.is_empty() {
                        self.inbox.put_front(rest);
                    }
                    return Ok(String::from_utf8_lossy(&line).into_owned());
                }
                None => line.extend_from_slice(&chunk),
            }
        }
    }

    /// Counters for this client's session, if it is still open.
    pub fn stats(&self) -> Option<SessionStats> {
        self.dispatcher.stats(self.id)
    }

    /// Close the session, telling the server, and stop receiving.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Release a receive thread blocked on a full inbox before taking the
        // session lock it holds.
        self.inbox.put_end();
        if self.dispatcher.close(self.id, CloseReason::LocalShutdown) {
            debug!(session = self.id, "client session closed");
        }
        self.stop.store(true, Ordering::SeqCst);
        if let Some(receiver) = self.receiver.take() {
            if receiver.join().is_err() {
                warn!(session = self.id, "client receive thread panicked");
            }
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn receive(
    mut reader: FrameReader<UdpTransport>,
    server: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::SeqCst) {
        match reader.read_frame() {
            Ok((frame, from)) if from == server => dispatcher.handle_frame(frame, from),
            Ok((_, from)) => debug!(peer = %from, "ignoring frame from unexpected peer"),
            Err(FrameError::Transport(err)) if err.is_timeout() => {}
            Err(err) if err.is_decode() => warn!(error = %err, "dropping invalid datagram"),
            Err(err) => {
                warn!(error = %err, "client receive failed");
                break;
            }
        }
    }
}
