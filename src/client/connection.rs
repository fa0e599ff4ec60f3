use std::{
    io,
    net::{TcpStream, ToSocketAddrs},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
};

use log::{debug, info, trace, warn};

use crate::protocol::{Envelope, ProtocolTransport, ReassemblyTable, Request, Stream};

use super::{
    ClientError, ConnectionConfig, RequestContext,
    dispatch::DispatchRegistry,
    waiter::{Failure, Waiter},
};

/// State shared between the connection handle and its reader thread.
#[derive(Debug)]
struct Shared {
    registry: DispatchRegistry,
    alive: AtomicBool,
}

/// One stream to the database, shared by any number of request contexts.
///
/// Dropping the connection closes it.
pub struct Connection<S: Stream = TcpStream> {
    shared: Arc<Shared>,
    writer: Mutex<ProtocolTransport<S>>,
    control: S,
    reader: Mutex<Option<JoinHandle<()>>>,
    config: ConnectionConfig,
}

impl Connection<TcpStream> {
    /// Connects over TCP and starts the background reader.
    pub fn open<A: ToSocketAddrs>(addr: A, config: ConnectionConfig) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        info!("connected to {}", stream.peer_addr()?);
        Self::with_stream(stream, config)
    }
}

impl<S: Stream> Connection<S> {
    /// Takes over an already connected stream and starts the background reader.
    pub fn with_stream(stream: S, config: ConnectionConfig) -> Result<Self, ClientError> {
        let read_half = ProtocolTransport::with_limits(
            stream.try_clone()?,
            config.read_chunk_size,
            config.max_segments,
            config.max_frame_size,
        );
        let control = stream.try_clone()?;
        let writer = ProtocolTransport::new(stream);

        let shared = Arc::new(Shared {
            registry: DispatchRegistry::new(),
            alive: AtomicBool::new(true),
        });
        let reader = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("btrdb-reader".into())
                .spawn(move || read_loop(read_half, shared))?
        };

        Ok(Self {
            shared,
            writer: Mutex::new(writer),
            control,
            reader: Mutex::new(Some(reader)),
            config,
        })
    }

    /// Allocates a tag and registers a waiter for it. Registration happens
    /// before anything is sent so a fast response always finds its waiter.
    pub fn new_context(&self) -> RequestContext<'_, S> {
        let (tag, waiter) = self.register();
        RequestContext::new(self, tag, waiter, self.config.read_timeout)
    }

    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Number of contexts currently holding a tag.
    pub fn registered_contexts(&self) -> usize {
        self.shared.registry.len()
    }

    /// Marks the connection dead, fails every waiting context with
    /// [`ClientError::ConnectionClosed`], closes the stream and waits for the
    /// reader to exit. Calling it again is a no-op.
    pub fn close(&self) -> Result<(), ClientError> {
        let was_alive = self.shared.alive.swap(false, Ordering::SeqCst);
        self.shared.registry.fail_all(Failure::Closed);

        if was_alive {
            info!("closing connection");
            match self.control.shutdown() {
                Err(e) if e.kind() != io::ErrorKind::NotConnected => return Err(e.into()),
                _ => {}
            }
        }

        let handle = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("reader thread panicked");
            }
        }
        Ok(())
    }

    fn writer(&self) -> MutexGuard<'_, ProtocolTransport<S>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes one request frame. The writer lock keeps frames from different
    /// contexts from interleaving. A dead connection reports the failure that
    /// stopped it.
    pub(crate) fn send(&self, req: &Request) -> Result<(), ClientError> {
        if !self.is_alive() {
            return Err(self
                .shared
                .registry
                .failure()
                .map_or(ClientError::ConnectionClosed, ClientError::from));
        }
        self.writer().write_request(req)?;
        trace!("sent request for tag {}", req.echo_tag);
        Ok(())
    }

    pub(crate) fn register(&self) -> (u64, Arc<Waiter>) {
        self.shared.registry.register()
    }

    pub(crate) fn release(&self, tag: u64) {
        self.shared.registry.deregister(tag);
    }

    #[cfg(test)]
    pub(crate) fn is_registered(&self, tag: u64) -> bool {
        self.shared.registry.is_registered(tag)
    }
}

impl<S: Stream> Drop for Connection<S> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("error while closing connection: {e}");
        }
    }
}

/// Background receive pipeline: frames, then envelopes, then reassembly, then
/// dispatch. Runs until the stream ends or a frame cannot be decoded.
fn read_loop<S: Stream>(mut transport: ProtocolTransport<S>, shared: Arc<Shared>) {
    let mut table = ReassemblyTable::new();

    let failure = loop {
        let frame = match transport.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break Failure::Broken("stream closed by peer".into()),
            Err(e) => break Failure::Broken(e.to_string()),
        };
        let envelope = match Envelope::decode(&frame) {
            Ok(envelope) => envelope,
            Err(e) => break Failure::Broken(format!("undecodable frame: {e}")),
        };
        if let Some(parts) = table.accept(envelope) {
            shared.registry.dispatch(parts);
        }
    };

    if shared.alive.swap(false, Ordering::SeqCst) {
        warn!("connection lost: {failure:?}");
        shared.registry.fail_all(failure);
        if let Err(e) = transport.get_ref().shutdown() {
            debug!("shutdown after failure: {e}");
        }
    } else {
        debug!("reader stopped after close");
    }
}
