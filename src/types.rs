//! Value types shared by requests, responses and the CLI.
use std::{fmt, str::FromStr};

use bincode::{Decode, Encode};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid stream uuid '{0}'")]
pub struct ParseStreamIdError(String);

/// 128-bit identifier of a stream, printed in hyphenated UUID form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub struct StreamId(pub [u8; 16]);

impl StreamId {
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl From<u128> for StreamId {
    fn from(value: u128) -> Self {
        Self(value.to_be_bytes())
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                write!(f, "-")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for StreamId {
    type Err = ParseStreamIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex: String = s.chars().filter(|c| *c != '-').collect();
        if hex.len() != 32 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ParseStreamIdError(s.to_string()));
        }
        u128::from_str_radix(&hex, 16)
            .map(StreamId::from)
            .map_err(|_| ParseStreamIdError(s.to_string()))
    }
}

/// A single (time, value) point. Times are nanoseconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode)]
pub struct RawPoint {
    pub time: i64,
    pub value: f64,
}

impl RawPoint {
    pub fn new(time: i64, value: f64) -> Self {
        Self { time, value }
    }
}

/// Aggregate over the points falling in one window.
#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode)]
pub struct StatPoint {
    pub time: i64,
    pub count: u64,
    pub min: f64,
    pub mean: f64,
    pub max: f64,
}

/// Time range whose contents differ between two versions of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct ChangedRange {
    pub start_time: i64,
    pub end_time: i64,
}
