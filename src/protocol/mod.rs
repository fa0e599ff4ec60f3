//! Wire protocol.
//!
//! This module defines how BTrDB clients and servers exchange messages over a single
//! persistent stream: the segment framing, the routing envelope every message carries,
//! and the reassembly of responses that arrive in several parts.
//!
//! # Overview
//!
//! The stream is a plain concatenation of frames with no out-of-band length prefix.
//! Each frame describes its own length in its header (see [`frame`]), so a reader can
//! always tell how many more bytes belong to the current frame before it touches the
//! payload.
//!
//! Inside a frame, the message starts with its routing fields:
//!
//! - `echo_tag`: chosen by the client on requests, echoed by the server on responses.
//! - `is_final` (responses only): set on the last part of a possibly multi-part response.
//!
//! Everything after those fields is the operation specific payload.
//!
//! # Key Components
//!
//! - [`FrameAssembler`]: Rebuilds frames from arbitrarily chunked bytes.
//! - [`Envelope`]: Routing view of a decoded response frame.
//! - [`ReassemblyTable`]: Joins multi-part responses by tag.
//! - [`ProtocolTransport`]: Reads and writes frames over a [`Stream`].
//!
//! # Binary Format
//!
//! - Frame headers are little-endian `u32` fields; segment sizes count 8-byte words.
//! - Messages are encoded with bincode using fixed-width little-endian integers.
//! - Segments are zero-padded to a word boundary; decoders ignore the padding.
//!
//! # See Also
//!
//! - [`client`](crate::client): Multiplexes many callers over one transport.
use bincode::config::{Configuration, Fixint, LittleEndian};

pub mod frame;

mod envelope;
mod reassembly;
mod request;
mod response;
mod transport;

pub use envelope::Envelope;
pub use frame::{Frame, FrameAssembler, FrameError};
pub use reassembly::ReassemblyTable;
pub use request::{Request, RequestBody};
pub use response::{Response, ResponseBody, ResponsePayload, StatusCode};
pub use transport::{DEFAULT_CHUNK_SIZE, ProtocolTransport, Stream, TransportError};

/// Encoding used for message bodies.
pub fn wire_config() -> Configuration<LittleEndian, Fixint> {
    bincode::config::standard()
        .with_little_endian()
        .with_fixed_int_encoding()
}
