use std::{net::TcpStream, sync::Arc, time::Duration};

use log::{debug, trace};

use crate::protocol::{Envelope, Request, RequestBody, Stream};

use super::{ClientError, Connection, waiter::Waiter};

/// Caller side handle for one request/response exchange at a time.
///
/// A context owns a routing tag for its whole lifetime and can be reused for
/// any number of serial calls. It must not have a second request in flight
/// before the first response is read; `&mut self` on [`send`](Self::send) and
/// [`read`](Self::read) makes that hard to get wrong, but pairing every send
/// with exactly one read is still up to the caller.
///
/// Use separate contexts, one per thread, for concurrent requests on the same
/// [`Connection`]. Dropping a context releases its tag, whether or not its
/// response ever arrived; a late response is then discarded.
pub struct RequestContext<'a, S: Stream = TcpStream> {
    connection: &'a Connection<S>,
    tag: u64,
    waiter: Arc<Waiter>,
    timeout: Option<Duration>,
}

impl<'a, S: Stream> RequestContext<'a, S> {
    pub(crate) fn new(
        connection: &'a Connection<S>,
        tag: u64,
        waiter: Arc<Waiter>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            connection,
            tag,
            waiter,
            timeout,
        }
    }

    pub fn tag(&self) -> u64 {
        self.tag
    }

    /// Overrides the connection's default read deadline for this context.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Sends `body` tagged with this context's tag.
    pub fn send(&mut self, body: RequestBody) -> Result<(), ClientError> {
        self.connection.send(&Request::new(self.tag, body))
    }

    /// Blocks until the full response for this context's tag has arrived and
    /// returns its parts in arrival order.
    ///
    /// On [`ClientError::Timeout`] the context moves to a fresh tag, so a
    /// response that shows up late is discarded instead of being returned by
    /// the next `read`.
    pub fn read(&mut self) -> Result<Vec<Envelope>, ClientError> {
        match self.waiter.wait(self.tag, self.timeout) {
            Ok(parts) => {
                trace!("tag {} received {} parts", self.tag, parts.len());
                Ok(parts)
            }
            Err(ClientError::Timeout(tag)) => {
                self.retag();
                Err(ClientError::Timeout(tag))
            }
            Err(e) => Err(e),
        }
    }

    fn retag(&mut self) {
        let (tag, waiter) = self.connection.register();
        let abandoned = std::mem::replace(&mut self.tag, tag);
        self.waiter = waiter;
        self.connection.release(abandoned);
        debug!("abandoned tag {abandoned} for {tag}");
    }

    /// Sends `body` and waits for the response.
    pub fn call(&mut self, body: RequestBody) -> Result<Vec<Envelope>, ClientError> {
        self.send(body)?;
        self.read()
    }

    /// Releases the tag. Same as dropping the context.
    pub fn destroy(self) {}
}

impl<S: Stream> Drop for RequestContext<'_, S> {
    fn drop(&mut self) {
        self.connection.release(self.tag);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::net::UnixStream;

    use crate::client::ConnectionConfig;

    use super::*;

    #[test]
    fn drop_releases_tag() {
        let (client, _server) = UnixStream::pair().unwrap();
        let conn = Connection::with_stream(client, ConnectionConfig::default()).unwrap();

        let ctx = conn.new_context();
        let tag = ctx.tag();
        assert!(conn.is_registered(tag));

        ctx.destroy();
        assert!(!conn.is_registered(tag));
        assert_eq!(conn.registered_contexts(), 0);
    }

    #[test]
    fn contexts_get_distinct_tags() {
        let (client, _server) = UnixStream::pair().unwrap();
        let conn = Connection::with_stream(client, ConnectionConfig::default()).unwrap();

        let a = conn.new_context();
        let b = conn.new_context();
        assert_ne!(a.tag(), b.tag());
        assert_eq!(conn.registered_contexts(), 2);
    }

    #[test]
    fn read_times_out_without_response() {
        let (client, _server) = UnixStream::pair().unwrap();
        let config = ConnectionConfig::default().read_timeout(Some(Duration::from_millis(20)));
        let conn = Connection::with_stream(client, config).unwrap();

        let mut ctx = conn.new_context();
        let tag = ctx.tag();
        assert!(matches!(ctx.read(), Err(ClientError::Timeout(t)) if t == tag));

        assert_ne!(ctx.tag(), tag);
        assert!(!conn.is_registered(tag));
        assert!(conn.is_registered(ctx.tag()));
    }

    #[test]
    fn send_after_close_fails() {
        let (client, _server) = UnixStream::pair().unwrap();
        let conn = Connection::with_stream(client, ConnectionConfig::default()).unwrap();
        conn.close().unwrap();

        let mut ctx = conn.new_context();
        let res = ctx.send(RequestBody::QueryVersion { uuids: vec![] });
        assert!(matches!(res, Err(ClientError::ConnectionClosed)));
        assert!(matches!(ctx.read(), Err(ClientError::ConnectionClosed)));
    }
}
