//! Segment framing.
//!
//! Every message on the wire is a self-delimiting frame:
//!
//! ```text
//! +-----------+------------------------+---------+-----------------------------+
//! | count (4) | size table (4 * segs)  | padding | segment 0 | ... | segment n |
//! +-----------+------------------------+---------+-----------------------------+
//! ```
//!
//! - `count` is a little-endian `u32` holding the number of segments minus one.
//! - Each size table entry is a little-endian `u32` holding a segment length in
//!   8-byte words.
//! - The count field and the size table together are padded to a multiple of
//!   eight bytes, so the table occupies `segs * 4` bytes plus 4 bytes of padding
//!   whenever `segs * 4` is already a multiple of eight.
//!
//! The [`FrameAssembler`] turns an arbitrarily chunked byte stream back into
//! frames. Header fields are only decoded once enough bytes are buffered, and
//! nothing is handed out until a frame is complete.
use std::ops::Range;

use log::trace;
use thiserror::Error;

pub(crate) const WORD_SIZE: usize = 8;
pub(crate) const COUNT_SIZE: usize = size_of::<u32>();
pub(crate) const SEGMENT_SIZE_ENTRY: usize = size_of::<u32>();

/// Largest number of segments accepted in one frame.
pub const DEFAULT_MAX_SEGMENTS: usize = 512;
/// Largest frame accepted, in bytes (100 million words).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 100_000_000 * WORD_SIZE;

/// Corrupt or oversized frame headers. Byte alignment cannot be recovered
/// once one of these is seen.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame declares {count} segments, limit is {limit}")]
    TooManySegments { count: usize, limit: usize },

    #[error("frame of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },
}

/// Length of the size table including its padding, for `segments` segments.
pub(crate) fn table_len(segments: usize) -> usize {
    let len = segments * SEGMENT_SIZE_ENTRY;
    if len % WORD_SIZE == 0 { len + 4 } else { len }
}

fn read_u32(bytes: &[u8], at: usize) -> usize {
    let mut word = [0_u8; 4];
    word.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(word) as usize
}

/// One complete frame as it appeared on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
    segments: Vec<Range<usize>>,
}

impl Frame {
    /// Builds a frame carrying `segments`, zero-padding each to a word boundary.
    pub fn from_segments<S: AsRef<[u8]>>(segments: &[S]) -> Self {
        let count = segments.len().max(1);
        let header = COUNT_SIZE + table_len(count);
        let mut bytes = vec![0_u8; header];
        bytes[..COUNT_SIZE].copy_from_slice(&((count - 1) as u32).to_le_bytes());

        let mut ranges = Vec::with_capacity(count);
        for (i, segment) in segments.iter().enumerate() {
            let segment = segment.as_ref();
            let words = segment.len().div_ceil(WORD_SIZE);
            let at = COUNT_SIZE + i * SEGMENT_SIZE_ENTRY;
            bytes[at..at + SEGMENT_SIZE_ENTRY].copy_from_slice(&(words as u32).to_le_bytes());

            let start = bytes.len();
            bytes.extend_from_slice(segment);
            bytes.resize(start + words * WORD_SIZE, 0);
            ranges.push(start..bytes.len());
        }
        if segments.is_empty() {
            ranges.push(header..header);
        }

        Self {
            bytes,
            segments: ranges,
        }
    }

    /// Builds a single segment frame.
    pub fn single(payload: &[u8]) -> Self {
        Self::from_segments(&[payload])
    }

    fn from_parts(bytes: Vec<u8>, segments: usize) -> Self {
        let mut offset = COUNT_SIZE + table_len(segments);
        let ranges = (0..segments)
            .map(|i| {
                let len = read_u32(&bytes, COUNT_SIZE + i * SEGMENT_SIZE_ENTRY) * WORD_SIZE;
                let range = offset..offset + len;
                offset += len;
                range
            })
            .collect();
        Self {
            bytes,
            segments: ranges,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segment(&self, index: usize) -> Option<&[u8]> {
        self.segments.get(index).map(|r| &self.bytes[r.clone()])
    }

    /// All segment payloads back to back, without the header.
    pub fn body(&self) -> &[u8] {
        let start = self.segments.first().map_or(self.bytes.len(), |r| r.start);
        &self.bytes[start..]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Fewer than four bytes of the next frame are buffered.
    AwaitingCount,
    /// Segment count known, size table not fully buffered.
    AwaitingTable { segments: usize, table: usize },
    /// Header decoded, waiting for the last payload byte.
    AwaitingPayload {
        segments: usize,
        table: usize,
        payload: usize,
    },
}

/// Streaming frame parser. Feed it bytes in any chunking with [`push`](Self::push).
#[derive(Debug)]
pub struct FrameAssembler {
    buffer: Vec<u8>,
    state: State,
    max_segments: usize,
    max_frame_size: usize,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SEGMENTS, DEFAULT_MAX_FRAME_SIZE)
    }
}

impl FrameAssembler {
    pub fn new(max_segments: usize, max_frame_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            state: State::AwaitingCount,
            max_segments,
            max_frame_size,
        }
    }

    /// Appends `data` and returns every frame it completed, in stream order.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>, FrameError> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.advance()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Bytes buffered but not yet handed out as part of a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// True when the assembler is waiting on the count field of a fresh frame.
    pub fn at_frame_boundary(&self) -> bool {
        self.state == State::AwaitingCount
    }

    fn advance(&mut self) -> Result<Option<Frame>, FrameError> {
        loop {
            match self.state {
                State::AwaitingCount => {
                    if self.buffer.len() < COUNT_SIZE {
                        return Ok(None);
                    }
                    let segments = read_u32(&self.buffer, 0).saturating_add(1);
                    if segments > self.max_segments {
                        return Err(FrameError::TooManySegments {
                            count: segments,
                            limit: self.max_segments,
                        });
                    }
                    self.state = State::AwaitingTable {
                        segments,
                        table: table_len(segments),
                    };
                }
                State::AwaitingTable { segments, table } => {
                    if self.buffer.len() < COUNT_SIZE + table {
                        return Ok(None);
                    }
                    let words: usize = (0..segments)
                        .map(|i| read_u32(&self.buffer, COUNT_SIZE + i * SEGMENT_SIZE_ENTRY))
                        .sum();
                    let payload = words * WORD_SIZE;
                    let size = COUNT_SIZE + table + payload;
                    if size > self.max_frame_size {
                        return Err(FrameError::TooLarge {
                            size,
                            limit: self.max_frame_size,
                        });
                    }
                    self.state = State::AwaitingPayload {
                        segments,
                        table,
                        payload,
                    };
                }
                State::AwaitingPayload {
                    segments,
                    table,
                    payload,
                } => {
                    let size = COUNT_SIZE + table + payload;
                    if self.buffer.len() < size {
                        return Ok(None);
                    }
                    let rest = self.buffer.split_off(size);
                    let bytes = std::mem::replace(&mut self.buffer, rest);
                    self.state = State::AwaitingCount;
                    trace!("assembled frame of {size} bytes ({segments} segments)");
                    return Ok(Some(Frame::from_parts(bytes, segments)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Three one-word segments; count field 2.
    fn three_segment_frame() -> Vec<u8> {
        let mut bytes = vec![2, 0, 0, 0];
        for _ in 0..3 {
            bytes.extend_from_slice(&[1, 0, 0, 0]);
        }
        for seg in 1..=3_u8 {
            bytes.extend_from_slice(&[seg; 8]);
        }
        bytes
    }

    #[test]
    fn table_padding() {
        assert_eq!(table_len(1), 4);
        assert_eq!(table_len(2), 12);
        assert_eq!(table_len(3), 12);
        assert_eq!(table_len(4), 20);
    }

    #[test]
    fn assembles_three_segment_frame() {
        let bytes = three_segment_frame();
        assert_eq!(bytes.len(), 40);

        let mut assembler = FrameAssembler::default();
        let frames = assembler.push(&bytes).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_bytes(), &bytes[..]);
        assert_eq!(frames[0].segment_count(), 3);
        assert_eq!(frames[0].segment(1), Some(&[2_u8; 8][..]));
        assert!(assembler.at_frame_boundary());
        assert_eq!(assembler.buffered(), 0);
    }

    #[test]
    fn trailing_bytes_start_next_frame() {
        let mut bytes = three_segment_frame();
        bytes.extend_from_slice(&[0, 0, 0, 0, 1, 0, 0, 0]);

        let mut assembler = FrameAssembler::default();
        let frames = assembler.push(&bytes).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 40);
        assert_eq!(assembler.buffered(), 8);
        assert!(!assembler.at_frame_boundary());

        let frames = assembler.push(&[7; 8]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].segment(0), Some(&[7_u8; 8][..]));
    }

    #[test]
    fn every_split_point_yields_same_frame() {
        let bytes = three_segment_frame();

        for split in 1..bytes.len() {
            let mut assembler = FrameAssembler::default();
            assert!(assembler.push(&bytes[..split]).unwrap().is_empty());
            let frames = assembler.push(&bytes[split..]).unwrap();
            assert_eq!(frames.len(), 1, "split at {split}");
            assert_eq!(frames[0].as_bytes(), &bytes[..]);
        }
    }

    #[test]
    fn byte_at_a_time() {
        let bytes = three_segment_frame();
        let mut assembler = FrameAssembler::default();
        let mut frames = Vec::new();

        for b in &bytes {
            frames.extend(assembler.push(std::slice::from_ref(b)).unwrap());
        }

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_bytes(), &bytes[..]);
    }

    #[test]
    fn splits_concatenated_frames() {
        let payloads: Vec<Vec<u8>> = vec![vec![1; 3], vec![2; 16], vec![], vec![4; 9]];
        let stream: Vec<u8> = payloads
            .iter()
            .flat_map(|p| Frame::single(p).as_bytes().to_vec())
            .collect();

        for chunk in [1, 3, 7, 64, stream.len()] {
            let mut assembler = FrameAssembler::default();
            let frames: Vec<Frame> = stream
                .chunks(chunk)
                .flat_map(|c| assembler.push(c).unwrap())
                .collect();

            assert_eq!(frames.len(), payloads.len(), "chunk size {chunk}");
            for (frame, payload) in frames.iter().zip(&payloads) {
                assert_eq!(&frame.body()[..payload.len()], &payload[..]);
            }
        }
    }

    #[test]
    fn empty_chunk_is_harmless() {
        let mut assembler = FrameAssembler::default();
        assert!(assembler.push(&[]).unwrap().is_empty());
        assert!(assembler.at_frame_boundary());
    }

    #[test]
    fn builder_pads_segments() {
        let frame = Frame::from_segments(&[vec![9_u8; 5], vec![8_u8; 8]]);

        // count(4) + table(8 + 4 padding) + 8 + 8
        assert_eq!(frame.len(), 32);
        assert_eq!(frame.segment(0), Some(&[9, 9, 9, 9, 9, 0, 0, 0][..]));
        assert_eq!(frame.segment(1), Some(&[8_u8; 8][..]));
        assert_eq!(&frame.as_bytes()[..4], &[1, 0, 0, 0]);
    }

    #[test]
    fn rejects_too_many_segments() {
        let mut assembler = FrameAssembler::new(4, DEFAULT_MAX_FRAME_SIZE);
        let err = assembler.push(&[9, 0, 0, 0]).unwrap_err();
        assert_eq!(err, FrameError::TooManySegments { count: 10, limit: 4 });
    }

    #[test]
    fn rejects_oversized_frame() {
        let mut assembler = FrameAssembler::new(DEFAULT_MAX_SEGMENTS, 64);
        let err = assembler.push(&[0, 0, 0, 0, 100, 0, 0, 0]).unwrap_err();
        assert_eq!(err, FrameError::TooLarge { size: 808, limit: 64 });
    }
}
