//! Channel error types

use std::fmt;
use std::io;

/// Error type for supervision channel operations
#[derive(Debug)]
pub enum ChannelError {
    /// Underlying socket failure
    Io(io::Error),
    /// Frame ended before all declared fields were read
    Truncated,
    /// Unknown message tag
    UnknownTag(u8),
    /// Frame length exceeds the allowed maximum
    FrameTooLarge(usize),
    /// String field is not valid UTF-8
    InvalidUtf8,
    /// Peer closed the connection
    Closed,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::Io(e) => write!(f, "{}", e),
            ChannelError::Truncated => write!(f, "Truncated control frame"),
            ChannelError::UnknownTag(tag) => write!(f, "Unknown control message tag: 0x{:02x}", tag),
            ChannelError::FrameTooLarge(len) => write!(f, "Control frame too large: {} bytes", len),
            ChannelError::InvalidUtf8 => write!(f, "Control frame contains invalid UTF-8"),
            ChannelError::Closed => write!(f, "Channel closed by peer"),
        }
    }
}

impl std::error::Error for ChannelError {}

impl From<io::Error> for ChannelError {
    fn from(e: io::Error) -> Self {
        ChannelError::Io(e)
    }
}
