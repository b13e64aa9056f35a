//! Reliable, ordered byte streams over UDP.
//!
//! lrcp carries numbered sessions over plain datagrams: data travels at
//! explicit stream offsets, is acknowledged cumulatively and retransmitted
//! until acknowledged, so each side sees its peer's bytes exactly once and
//! in order.
//!
//! # Crate Structure
//!
//! - [`transport`]: UDP endpoint, mailbox and idle tracking
//! - [`frame`]: Slash-delimited text frame codec
//! - [`session`]: Sessions, retransmission, dispatch, server and client
//!   (behind `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use lrcp_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use lrcp_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use lrcp_session::*;
}
