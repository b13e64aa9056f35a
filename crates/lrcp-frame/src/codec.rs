use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::kind::FrameKind;

/// Datagrams of this many bytes or more are rejected.
pub const DEFAULT_MAX_FRAME: usize = 1000;

/// Largest payload carried by one outbound `data` frame.
///
/// Even if every byte needs escaping (doubling it) the frame stays well
/// below [`DEFAULT_MAX_FRAME`].
pub const DEFAULT_MAX_CHUNK: usize = 400;

/// Largest value a numeric field may carry (`2^31 - 1`).
pub const MAX_INT: u32 = (1 << 31) - 1;

/// Session identifier chosen by the connecting peer.
pub type SessionId = u32;

/// A decoded protocol frame.
///
/// Numeric fields are already range-checked; `data` is unescaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `/connect/SESSION/`
    Connect { session: SessionId },
    /// `/data/SESSION/POS/DATA/`
    Data {
        session: SessionId,
        pos: u32,
        data: Bytes,
    },
    /// `/ack/SESSION/LENGTH/`
    Ack { session: SessionId, length: u32 },
    /// `/close/SESSION/`
    Close { session: SessionId },
}

impl Frame {
    /// Create a data frame.
    pub fn data(session: SessionId, pos: u32, data: impl Into<Bytes>) -> Self {
        Self::Data {
            session,
            pos,
            data: data.into(),
        }
    }

    /// The kind of this frame.
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Connect { .. } => FrameKind::Connect,
            Self::Data { .. } => FrameKind::Data,
            Self::Ack { .. } => FrameKind::Ack,
            Self::Close { .. } => FrameKind::Close,
        }
    }

    /// The session this frame refers to.
    pub fn session(&self) -> SessionId {
        match self {
            Self::Connect { session }
            | Self::Data { session, .. }
            | Self::Ack { session, .. }
            | Self::Close { session } => *session,
        }
    }

    /// Encode into a fresh buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        encode_frame(self, &mut buf);
        buf.freeze()
    }

    /// The exact encoded size of this frame.
    pub fn wire_size(&self) -> usize {
        let head = 2 + self.kind().name().len();
        head + match self {
            Self::Connect { session } | Self::Close { session } => decimal_len(*session) + 1,
            Self::Ack { session, length } => decimal_len(*session) + decimal_len(*length) + 2,
            Self::Data { session, pos, data } => {
                decimal_len(*session) + decimal_len(*pos) + escaped_len(data) + 3
            }
        }
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect { session } => write!(f, "/connect/{session}/"),
            Self::Close { session } => write!(f, "/close/{session}/"),
            Self::Ack { session, length } => write!(f, "/ack/{session}/{length}/"),
            Self::Data { session, pos, data } => {
                write!(f, "/data/{session}/{pos}/{}/", preview(data))
            }
        }
    }
}

const PREVIEW_LEN: usize = 50;

fn preview(data: &[u8]) -> String {
    let text = String::from_utf8_lossy(&data[..data.len().min(PREVIEW_LEN)]);
    let text = text.escape_debug().to_string();
    if data.len() > PREVIEW_LEN {
        format!("{text}...")
    } else {
        text
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// /KIND/FIELD/FIELD/.../
/// ```
/// Numeric fields are plain decimal. `\` and `/` in the data field are
/// escaped as `\\` and `\/`.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) {
    dst.reserve(frame.wire_size());
    dst.put_u8(b'/');
    dst.put_slice(frame.kind().name().as_bytes());
    dst.put_u8(b'/');
    match frame {
        Frame::Connect { session } | Frame::Close { session } => put_int(dst, *session),
        Frame::Ack { session, length } => {
            put_int(dst, *session);
            put_int(dst, *length);
        }
        Frame::Data { session, pos, data } => {
            put_int(dst, *session);
            put_int(dst, *pos);
            for &byte in data.iter() {
                if byte == b'/' || byte == b'\\' {
                    dst.put_u8(b'\\');
                }
                dst.put_u8(byte);
            }
            dst.put_u8(b'/');
        }
    }
}

fn put_int(dst: &mut BytesMut, value: u32) {
    dst.put_slice(value.to_string().as_bytes());
    dst.put_u8(b'/');
}

fn decimal_len(mut value: u32) -> usize {
    let mut len = 1;
    while value >= 10 {
        value /= 10;
        len += 1;
    }
    len
}

/// Length of `data` once `/` and `\` are escaped.
pub fn escaped_len(data: &[u8]) -> usize {
    data.len()
        + data
            .iter()
            .filter(|&&byte| byte == b'/' || byte == b'\\')
            .count()
}

/// Decode one datagram into a frame.
///
/// The whole datagram must be exactly one frame; anything that is not a
/// well-formed frame is an error and nothing is partially consumed.
pub fn decode_frame(src: &[u8], max_frame_size: usize) -> Result<Frame> {
    if src.len() >= max_frame_size {
        return Err(FrameError::TooLarge {
            size: src.len(),
            max: max_frame_size,
        });
    }

    let rest = src
        .strip_prefix(b"/")
        .ok_or(FrameError::MissingLeadingSlash)?;
    let mut fields = split_fields(rest)?;

    let kind = FrameKind::from_name(&fields[0]).ok_or_else(|| {
        FrameError::UnknownType(String::from_utf8_lossy(&fields[0]).into_owned())
    })?;
    let found = fields.len() - 1;
    if found != kind.field_count() {
        return Err(FrameError::Arity {
            kind: kind.name(),
            expected: kind.field_count(),
            found,
        });
    }

    let session = parse_int(&fields[1])?;
    let frame = match kind {
        FrameKind::Connect => Frame::Connect { session },
        FrameKind::Close => Frame::Close { session },
        FrameKind::Ack => Frame::Ack {
            session,
            length: parse_int(&fields[2])?,
        },
        FrameKind::Data => {
            let pos = parse_int(&fields[2])?;
            let data = fields.pop().unwrap_or_default();
            Frame::Data {
                session,
                pos,
                data: Bytes::from(data),
            }
        }
    };
    Ok(frame)
}

/// Split the bytes after the leading `/` into unescaped fields.
///
/// Never returns an empty list.
fn split_fields(rest: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut fields = Vec::new();
    let mut current = Vec::new();
    let mut bytes = rest.iter().copied();

    while let Some(byte) = bytes.next() {
        match byte {
            b'\\' => match bytes.next() {
                Some(escaped @ (b'\\' | b'/')) => current.push(escaped),
                _ => return Err(FrameError::BadEscape),
            },
            b'/' => fields.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }

    if !current.is_empty() || fields.is_empty() {
        return Err(FrameError::Unterminated);
    }
    Ok(fields)
}

fn parse_int(field: &[u8]) -> Result<u32> {
    let invalid = || FrameError::InvalidInteger(String::from_utf8_lossy(field).into_owned());
    if field.is_empty() {
        return Err(invalid());
    }

    let mut value: u64 = 0;
    for &byte in field {
        if !byte.is_ascii_digit() {
            return Err(invalid());
        }
        value = value * 10 + u64::from(byte - b'0');
        if value > u64::from(MAX_INT) {
            return Err(invalid());
        }
    }
    Ok(value as u32)
}

/// Split `data` into `data` frames starting at stream offset `start`.
///
/// Each frame carries at most `chunk_size` bytes at its own offset. Fails if
/// any offset, including the end of the stream, would not fit a numeric field.
pub fn data_frames(
    session: SessionId,
    start: u64,
    data: &[u8],
    chunk_size: usize,
) -> Result<Vec<Frame>> {
    let end = start + data.len() as u64;
    if end > u64::from(MAX_INT) {
        return Err(FrameError::OffsetOutOfRange(end));
    }

    let mut offset = start;
    let frames = data
        .chunks(chunk_size.max(1))
        .map(|chunk| {
            let frame = Frame::data(session, offset as u32, Bytes::copy_from_slice(chunk));
            offset += chunk.len() as u64;
            frame
        })
        .collect();
    Ok(frames)
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Datagrams this size or larger are rejected. Default: 1000 bytes.
    pub max_frame_size: usize,
    /// Largest payload per outbound data frame. Default: 400 bytes.
    pub max_chunk_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME,
            max_chunk_size: DEFAULT_MAX_CHUNK,
        }
    }
}
