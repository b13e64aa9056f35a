//! Slash-delimited text framing for lrcp datagrams.
//!
//! Every datagram carries exactly one frame:
//! - fields are separated and terminated by `/`
//! - `/` and `\` inside a field are escaped as `\/` and `\\`
//! - the first field names the frame kind and fixes the field count
//!
//! Decoding validates everything once; the rest of the stack only ever sees
//! a typed [`Frame`].

pub mod codec;
pub mod error;
pub mod kind;
pub mod reader;
pub mod writer;

pub use codec::{
    data_frames, decode_frame, encode_frame, escaped_len, Frame, FrameConfig, SessionId,
    DEFAULT_MAX_CHUNK, DEFAULT_MAX_FRAME, MAX_INT,
};
pub use error::{FrameError, Result};
pub use kind::FrameKind;
pub use reader::FrameReader;
pub use writer::FrameWriter;
