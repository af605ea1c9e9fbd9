//! Control message types and their wire encoding
//!
//! Payload layout (inside the length-prefixed frame):
//! ```text
//! 0x01 - Started
//! 0x02 - Failed  | u16 reason_len | reason | u16 count | (u16 len | quality)*
//! 0x03 - Kill
//! 0x04 - CommandLine | u16 len | command line
//! ```
//!
//! The encoder keeps every frame within [`MAX_FRAME_LEN`]: long reasons are
//! cut at [`MAX_REASON_LEN`] and qualities that do not fit are dropped.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::error::ChannelError;

const TAG_STARTED: u8 = 0x01;
const TAG_FAILED: u8 = 0x02;
const TAG_KILL: u8 = 0x03;
const TAG_COMMAND_LINE: u8 = 0x04;

/// Length prefix size
pub const FRAME_HEADER_LEN: usize = 4;

/// Upper bound on a single frame payload
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Longest failure reason sent, in bytes
pub const MAX_REASON_LEN: usize = 4096;

// Tag byte plus the u16 length of a single string field
const STRING_FIELD_OVERHEAD: usize = 3;

/// Why a worker gave up before (or instead of) streaming
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Failure {
    /// Human readable reason
    pub reason: String,
    /// Valid quality names, sorted, when the plugin got far enough to list them
    pub qualities: Vec<String>,
}

impl Failure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            qualities: Vec::new(),
        }
    }

    /// Attach the list of valid qualities
    pub fn with_qualities(mut self, qualities: Vec<String>) -> Self {
        self.qualities = qualities;
        self
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reason)?;
        if !self.qualities.is_empty() {
            write!(f, " (valid streams: {})", self.qualities.join(", "))?;
        }
        Ok(())
    }
}

/// A message on the supervision channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Worker → shell: pre-buffer succeeded, relaying has begun
    Started,
    /// Worker → shell: terminal failure before streaming
    Failed(Failure),
    /// Shell → worker: stop relaying and exit
    Kill,
    /// Worker → shell: command line of the selected stream, sent instead of
    /// streaming when only the command line was asked for
    CommandLine(String),
}

impl ControlMessage {
    /// Encode this message as a complete frame (length prefix included)
    pub fn encode(&self, buf: &mut BytesMut) {
        let start = buf.len();
        buf.put_u32(0);

        match self {
            ControlMessage::Started => buf.put_u8(TAG_STARTED),
            ControlMessage::Kill => buf.put_u8(TAG_KILL),
            ControlMessage::CommandLine(cmdline) => {
                buf.put_u8(TAG_COMMAND_LINE);
                put_string(buf, cmdline, MAX_FRAME_LEN - STRING_FIELD_OVERHEAD);
            }
            ControlMessage::Failed(failure) => {
                buf.put_u8(TAG_FAILED);
                put_string(buf, &failure.reason, MAX_REASON_LEN);

                let count_at = buf.len();
                buf.put_u16(0);
                let mut count: u16 = 0;
                for quality in &failure.qualities {
                    let payload_len = buf.len() - start - FRAME_HEADER_LEN;
                    if count == u16::MAX || payload_len + 2 + quality.len() > MAX_FRAME_LEN {
                        tracing::debug!(
                            sent = count,
                            total = failure.qualities.len(),
                            "Quality list cut to fit a control frame"
                        );
                        break;
                    }
                    put_string(buf, quality, usize::from(u16::MAX));
                    count += 1;
                }
                buf[count_at..count_at + 2].copy_from_slice(&count.to_be_bytes());
            }
        }

        let payload_len = (buf.len() - start - FRAME_HEADER_LEN) as u32;
        buf[start..start + FRAME_HEADER_LEN].copy_from_slice(&payload_len.to_be_bytes());
    }

    /// Decode a frame payload (without the length prefix)
    pub fn decode(buf: &mut Bytes) -> Result<Self, ChannelError> {
        if !buf.has_remaining() {
            return Err(ChannelError::Truncated);
        }

        match buf.get_u8() {
            TAG_STARTED => Ok(ControlMessage::Started),
            TAG_KILL => Ok(ControlMessage::Kill),
            TAG_COMMAND_LINE => Ok(ControlMessage::CommandLine(get_string(buf)?)),
            TAG_FAILED => {
                let reason = get_string(buf)?;
                if buf.remaining() < 2 {
                    return Err(ChannelError::Truncated);
                }
                let count = buf.get_u16() as usize;
                let mut qualities = Vec::with_capacity(count);
                for _ in 0..count {
                    qualities.push(get_string(buf)?);
                }
                Ok(ControlMessage::Failed(Failure { reason, qualities }))
            }
            tag => Err(ChannelError::UnknownTag(tag)),
        }
    }

    /// Try to split one complete frame off the front of `buf`.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    pub fn parse_frame(buf: &mut BytesMut) -> Result<Option<Self>, ChannelError> {
        if buf.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if len > MAX_FRAME_LEN {
            return Err(ChannelError::FrameTooLarge(len));
        }
        if buf.len() < FRAME_HEADER_LEN + len {
            return Ok(None);
        }

        buf.advance(FRAME_HEADER_LEN);
        let mut payload = buf.split_to(len).freeze();
        Self::decode(&mut payload).map(Some)
    }
}

fn put_string(buf: &mut BytesMut, s: &str, max_len: usize) {
    // Truncate on a char boundary so the field stays valid UTF-8
    let mut end = s.len().min(max_len).min(usize::from(u16::MAX));
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    buf.put_u16(end as u16);
    buf.put_slice(&s.as_bytes()[..end]);
}

fn get_string(buf: &mut Bytes) -> Result<String, ChannelError> {
    if buf.remaining() < 2 {
        return Err(ChannelError::Truncated);
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(ChannelError::Truncated);
    }
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| ChannelError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_frame_layout() {
        let msg = ControlMessage::Failed(
            Failure::new("bad").with_qualities(vec!["240p".into(), "720p".into()]),
        );
        let mut buf = BytesMut::new();
        msg.encode(&mut buf);

        // tag + (2 + 3) + 2 + (2 + 4) + (2 + 4)
        assert_eq!(&buf[..4], &20u32.to_be_bytes());
        assert_eq!(buf[4], TAG_FAILED);

        let parsed = ControlMessage::parse_frame(&mut buf).unwrap();
        assert_eq!(parsed, Some(msg));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frame_waits_for_more() {
        let mut full = BytesMut::new();
        ControlMessage::Kill.encode(&mut full);

        let mut partial = BytesMut::from(&full[..3]);
        assert_eq!(ControlMessage::parse_frame(&mut partial).unwrap(), None);
        assert_eq!(partial.len(), 3);

        partial.extend_from_slice(&full[3..]);
        assert_eq!(
            ControlMessage::parse_frame(&mut partial).unwrap(),
            Some(ControlMessage::Kill)
        );
    }

    #[test]
    fn test_frames_are_read_in_order() {
        let mut buf = BytesMut::new();
        ControlMessage::Started.encode(&mut buf);
        ControlMessage::Kill.encode(&mut buf);

        assert_eq!(
            ControlMessage::parse_frame(&mut buf).unwrap(),
            Some(ControlMessage::Started)
        );
        assert_eq!(
            ControlMessage::parse_frame(&mut buf).unwrap(),
            Some(ControlMessage::Kill)
        );
        assert_eq!(ControlMessage::parse_frame(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let mut payload = Bytes::from_static(&[0x7F]);
        assert!(matches!(
            ControlMessage::decode(&mut payload),
            Err(ChannelError::UnknownTag(0x7F))
        ));
    }

    #[test]
    fn test_truncated_failed_rejected() {
        // Declares a 10-byte reason but carries 2
        let mut payload = Bytes::from_static(&[TAG_FAILED, 0x00, 0x0A, b'h', b'i']);
        assert!(matches!(
            ControlMessage::decode(&mut payload),
            Err(ChannelError::Truncated)
        ));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32((MAX_FRAME_LEN + 1) as u32);
        assert!(matches!(
            ControlMessage::parse_frame(&mut buf),
            Err(ChannelError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn test_huge_quality_list_fits_one_frame() {
        let qualities: Vec<String> = (0..10_000).map(|n| format!("quality-{:05}", n)).collect();
        let msg = ControlMessage::Failed(
            Failure::new("Found streams").with_qualities(qualities.clone()),
        );
        let mut buf = BytesMut::new();
        msg.encode(&mut buf);
        assert!(buf.len() - FRAME_HEADER_LEN <= MAX_FRAME_LEN);

        let Some(ControlMessage::Failed(failure)) = ControlMessage::parse_frame(&mut buf).unwrap()
        else {
            panic!("not a failed frame");
        };
        assert_eq!(failure.reason, "Found streams");
        assert!(!failure.qualities.is_empty());
        assert!(failure.qualities.len() < qualities.len());
        assert_eq!(failure.qualities[..], qualities[..failure.qualities.len()]);
    }

    #[test]
    fn test_long_reason_is_cut() {
        let msg = ControlMessage::Failed(
            Failure::new("é".repeat(50_000)).with_qualities(vec!["live".into()]),
        );
        let mut buf = BytesMut::new();
        msg.encode(&mut buf);

        let Some(ControlMessage::Failed(failure)) = ControlMessage::parse_frame(&mut buf).unwrap()
        else {
            panic!("not a failed frame");
        };
        assert_eq!(failure.reason.len(), MAX_REASON_LEN);
        assert_eq!(failure.qualities, vec!["live"]);
    }

    #[test]
    fn test_command_line_frame() {
        let msg = ControlMessage::CommandLine("rtmpdump -r rtmp://host/app --flv -".into());
        let mut buf = BytesMut::new();
        msg.encode(&mut buf);
        assert_eq!(buf[4], TAG_COMMAND_LINE);
        assert_eq!(ControlMessage::parse_frame(&mut buf).unwrap(), Some(msg));
    }

    #[test]
    fn test_failure_display_lists_qualities() {
        let failure = Failure::new("Invalid stream quality: 1080p")
            .with_qualities(vec!["240p".into(), "720p".into()]);
        assert_eq!(
            failure.to_string(),
            "Invalid stream quality: 1080p (valid streams: 240p, 720p)"
        );
    }
}
