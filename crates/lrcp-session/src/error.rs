use std::time::Duration;

use lrcp_frame::SessionId;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] lrcp_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] lrcp_frame::FrameError),

    /// No live session with this id.
    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    /// The session was closed.
    #[error("session {0} closed")]
    Closed(SessionId),

    /// The outbound stream reached the largest encodable offset.
    #[error("session {id} stream offset space exhausted")]
    StreamExhausted { id: SessionId },

    /// Operation timed out.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, SessionError>;
