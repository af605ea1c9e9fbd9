//! Port allocation for player commands
//!
//! Player templates may contain a `{PORT}` placeholder (e.g. VLC re-streaming
//! over RTSP for XSplit). Ports are handed out round-robin from a configured
//! range. There is no reservation table: the worker re-checks availability
//! with a real bind right before it starts the player, because allocation and
//! use are separated by user action.
//!
//! Two workers started back to back can still be given ports that collide if
//! the range wraps around while the first one is live. The bind check at use
//! time turns that into a `failed` worker instead of two players fighting over
//! one port.

use std::net::{Ipv4Addr, TcpListener};

use crate::error::ConfigError;

/// Lowest port accepted for a range
pub const MIN_ALLOWED_PORT: u16 = 50000;

/// Default range bounds
pub const DEFAULT_MIN_PORT: u16 = 50000;
pub const DEFAULT_MAX_PORT: u16 = 65000;

/// Inclusive port range, `min < max` and `min >= 50000`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    min: u16,
    max: u16,
}

impl PortRange {
    /// Create a validated range
    pub fn new(min: u16, max: u16) -> Result<Self, ConfigError> {
        if min < MIN_ALLOWED_PORT {
            return Err(ConfigError::PortBelowMinimum(min));
        }
        if min >= max {
            return Err(ConfigError::InvalidPortRange { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> u16 {
        self.min
    }

    pub fn max(&self) -> u16 {
        self.max
    }

    /// Number of ports in the range
    pub fn size(&self) -> u32 {
        u32::from(self.max - self.min) + 1
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.min..=self.max).contains(&port)
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_PORT,
            max: DEFAULT_MAX_PORT,
        }
    }
}

impl std::fmt::Display for PortRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// Round-robin port allocator
#[derive(Debug, Clone)]
pub struct PortAllocator {
    range: PortRange,
    cursor: u16,
}

/// How many candidates `next` probes before giving up on finding a free one
const MAX_PROBES: u32 = 64;

impl PortAllocator {
    pub fn new(range: PortRange) -> Self {
        Self {
            range,
            cursor: range.min(),
        }
    }

    pub fn range(&self) -> PortRange {
        self.range
    }

    /// Replace the range. The cursor restarts at the new minimum.
    pub fn set_range(&mut self, range: PortRange) {
        self.range = range;
        self.cursor = range.min();
    }

    /// Hand out the next port in the range.
    ///
    /// Prefers a port that is free right now, but after a bounded number of
    /// probes returns the next candidate anyway; the worker validates it
    /// again before use.
    pub fn next(&mut self) -> u16 {
        let first = self.advance();
        if is_port_free(first) {
            return first;
        }

        let probes = MAX_PROBES.min(self.range.size());
        for _ in 1..probes {
            let candidate = self.advance();
            if is_port_free(candidate) {
                return candidate;
            }
        }

        tracing::warn!(range = %self.range, port = first, "No free port found, handing out busy candidate");
        first
    }

    fn advance(&mut self) -> u16 {
        let port = self.cursor;
        self.cursor = if port >= self.range.max() {
            self.range.min()
        } else {
            port + 1
        };
        port
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(PortRange::default())
    }
}

/// Check whether `port` can be bound on all interfaces right now
pub fn is_port_free(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok()
}
