//! Datagram transport collaborators for lrcp.
//!
//! This is the lowest layer of lrcp. It moves opaque datagrams between
//! addressable peers and knows nothing about sessions or frames:
//! - [`Datagram`]: the send/receive seam everything else builds on
//! - [`UdpTransport`]: the UDP implementation of that seam
//! - [`IdleTracker`]: per-peer activity clock driving idle eviction
//! - [`Mailbox`]: single-consumer rendezvous queue with end-of-stream

pub mod error;
pub mod idle;
pub mod mailbox;
pub mod traits;
pub mod udp;

pub use error::{Result, TransportError};
pub use idle::{IdleTracker, DEFAULT_IDLE_TIMEOUT};
pub use mailbox::{Mailbox, MailboxError};
pub use traits::{Datagram, MAX_DATAGRAM};
pub use udp::UdpTransport;
