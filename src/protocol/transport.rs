use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    net::{Shutdown, TcpStream},
};

use bincode::{
    config::{Configuration, Fixint, LittleEndian},
    decode_from_slice, encode_to_vec,
};
use log::trace;
use thiserror::Error;

use super::{
    Frame, FrameAssembler, FrameError, Request, Response,
    frame::{DEFAULT_MAX_FRAME_SIZE, DEFAULT_MAX_SEGMENTS},
    wire_config,
};

pub const DEFAULT_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode message: {0}")]
    Serialize(#[from] bincode::error::EncodeError),
    #[error("failed to decode message: {0}")]
    Deserialize(#[from] bincode::error::DecodeError),
    #[error("malformed frame: {0}")]
    Frame(#[from] FrameError),
    #[error("stream ended inside a frame ({0} bytes buffered)")]
    Truncated(usize),
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
}

/// A bidirectional byte stream that can be split across threads.
pub trait Stream: Read + Write + Send + Sync + Sized + 'static {
    fn try_clone(&self) -> io::Result<Self>;

    /// Shuts down both directions, waking any thread blocked reading.
    fn shutdown(&self) -> io::Result<()>;
}

impl Stream for TcpStream {
    fn try_clone(&self) -> io::Result<Self> {
        TcpStream::try_clone(self)
    }

    fn shutdown(&self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

#[cfg(unix)]
impl Stream for std::os::unix::net::UnixStream {
    fn try_clone(&self) -> io::Result<Self> {
        std::os::unix::net::UnixStream::try_clone(self)
    }

    fn shutdown(&self) -> io::Result<()> {
        std::os::unix::net::UnixStream::shutdown(self, Shutdown::Both)
    }
}

/// Frame level reads and writes over a byte stream.
pub struct ProtocolTransport<T> {
    stream: T,
    config: Configuration<LittleEndian, Fixint>,
    assembler: FrameAssembler,
    ready: VecDeque<Frame>,
    chunk: Vec<u8>,
}

impl<T> ProtocolTransport<T> {
    pub fn new(stream: T) -> Self {
        Self::with_limits(
            stream,
            DEFAULT_CHUNK_SIZE,
            DEFAULT_MAX_SEGMENTS,
            DEFAULT_MAX_FRAME_SIZE,
        )
    }

    pub fn with_limits(
        stream: T,
        chunk_size: usize,
        max_segments: usize,
        max_frame_size: usize,
    ) -> Self {
        Self {
            stream,
            config: wire_config(),
            assembler: FrameAssembler::new(max_segments, max_frame_size),
            ready: VecDeque::new(),
            chunk: vec![0; chunk_size.max(1)],
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }
}

impl<T: Write> ProtocolTransport<T> {
    /// Writes `frame` with a single `write_all`.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), TransportError> {
        self.stream.write_all(frame.as_bytes())?;
        self.stream.flush()?;
        trace!("wrote frame of {} bytes", frame.len());
        Ok(())
    }

    pub fn write_request(&mut self, req: &Request) -> Result<(), TransportError> {
        let bytes = encode_to_vec(req, self.config)?;
        self.write_frame(&Frame::single(&bytes))
    }

    /// Peer side of the exchange, for servers and test doubles. The client
    /// never writes responses.
    pub fn write_response(&mut self, resp: &Response) -> Result<(), TransportError> {
        let bytes = encode_to_vec(resp, self.config)?;
        self.write_frame(&Frame::single(&bytes))
    }
}

impl<T: Read> ProtocolTransport<T> {
    /// Blocks until the next complete frame is available. Returns `Ok(None)`
    /// once the stream ends cleanly on a frame boundary.
    pub fn read_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(Some(frame));
            }

            let n = match self.stream.read(&mut self.chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if n == 0 {
                let buffered = self.assembler.buffered();
                if buffered > 0 {
                    return Err(TransportError::Truncated(buffered));
                }
                return Ok(None);
            }

            trace!("read {n} bytes");
            let frames = self.assembler.push(&self.chunk[..n])?;
            self.ready.extend(frames);
        }
    }

    /// Peer side of the exchange, for servers and test doubles. The client
    /// never reads requests.
    pub fn read_request(&mut self) -> Result<Option<Request>, TransportError> {
        match self.read_frame()? {
            Some(frame) => {
                let (req, _) = decode_from_slice(frame.body(), self.config)?;
                Ok(Some(req))
            }
            None => Ok(None),
        }
    }
}
