use std::time::Duration;

use crate::protocol::{
    DEFAULT_CHUNK_SIZE,
    frame::{DEFAULT_MAX_FRAME_SIZE, DEFAULT_MAX_SEGMENTS},
};

/// Tunables for a [`Connection`](super::Connection).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Largest single read issued by the background reader.
    pub read_chunk_size: usize,
    /// Frames declaring more segments than this break the connection.
    pub max_segments: usize,
    /// Frames larger than this many bytes break the connection.
    pub max_frame_size: usize,
    /// Default deadline for [`RequestContext::read`](super::RequestContext::read).
    /// `None` waits forever.
    pub read_timeout: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_CHUNK_SIZE,
            max_segments: DEFAULT_MAX_SEGMENTS,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_timeout: None,
        }
    }
}

impl ConnectionConfig {
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size;
        self
    }

    pub fn max_segments(mut self, segments: usize) -> Self {
        self.max_segments = segments;
        self
    }

    pub fn max_frame_size(mut self, bytes: usize) -> Self {
        self.max_frame_size = bytes;
        self
    }

    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }
}
