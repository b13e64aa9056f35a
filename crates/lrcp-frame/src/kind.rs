//! Frame kinds and their fixed field counts.

/// The four frame kinds of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Open (or re-acknowledge) a session.
    Connect,
    /// Stream bytes at an offset.
    Data,
    /// Cumulative acknowledgement of a byte count.
    Ack,
    /// Unilateral close.
    Close,
}

impl FrameKind {
    /// Look up a kind by its wire name.
    pub fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"connect" => Some(Self::Connect),
            b"data" => Some(Self::Data),
            b"ack" => Some(Self::Ack),
            b"close" => Some(Self::Close),
            _ => None,
        }
    }

    /// Wire name of this kind.
    pub fn name(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Data => "data",
            Self::Ack => "ack",
            Self::Close => "close",
        }
    }

    /// Number of fields following the kind name.
    pub fn field_count(self) -> usize {
        match self {
            Self::Connect | Self::Close => 1,
            Self::Ack => 2,
            Self::Data => 3,
        }
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
