/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The datagram or encoded frame reaches the size ceiling.
    #[error("frame too large ({size} bytes, must be below {max})")]
    TooLarge { size: usize, max: usize },

    /// The datagram does not start with `/`.
    #[error("frame does not start with '/'")]
    MissingLeadingSlash,

    /// The last field is not closed by an unescaped `/`.
    #[error("unterminated frame")]
    Unterminated,

    /// A backslash is followed by something other than `/` or `\`.
    #[error("invalid escape sequence")]
    BadEscape,

    /// The first field is not a known frame kind.
    #[error("unknown frame kind '{0}'")]
    UnknownType(String),

    /// Wrong number of fields for the frame kind.
    #[error("'{kind}' expects {expected} fields, got {found}")]
    Arity {
        kind: &'static str,
        expected: usize,
        found: usize,
    },

    /// A numeric field is not a decimal integer in `[0, 2^31)`.
    #[error("invalid integer field '{0}'")]
    InvalidInteger(String),

    /// A stream offset no longer fits in a numeric field.
    #[error("stream offset {0} exceeds the numeric field range")]
    OffsetOutOfRange(u64),

    /// The datagram transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] lrcp_transport::TransportError),
}

impl FrameError {
    /// True for errors describing a malformed datagram, as opposed to a
    /// failing transport. Malformed datagrams are dropped and never fatal.
    pub fn is_decode(&self) -> bool {
        !matches!(
            self,
            FrameError::Transport(_) | FrameError::OffsetOutOfRange(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
