//! Multiplexing client.
//!
//! A [`Connection`] owns one stream to the database and a background reader
//! thread. Any number of [`RequestContext`]s can be created from it and used
//! concurrently from different threads; each one owns a routing tag, sends a
//! request carrying that tag, and blocks until the reader hands it the
//! response parts echoing the same tag.
//!
//! ```no_run
//! use btrdb::{Connection, ConnectionConfig, StreamId};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let conn = Connection::open("127.0.0.1:4410", ConnectionConfig::default())?;
//! let uuid: StreamId = "0123abcd-4567-89ef-0123-456789abcdef".parse()?;
//!
//! // One-shot call on a throwaway context.
//! let (points, version) = conn.query_standard_values(uuid, 0, 1_000_000, 0)?;
//!
//! // Several serial calls on one context.
//! let mut ctx = conn.new_context();
//! let status = ctx.delete_values(uuid, 0, 10)?;
//! let versions = ctx.query_version(&[uuid])?;
//! ctx.destroy();
//!
//! conn.close()?;
//! # Ok(())
//! # }
//! ```
use std::io;

use thiserror::Error;

use crate::protocol::{StatusCode, TransportError};

mod config;
mod connection;
mod context;
mod dispatch;
mod query;
mod waiter;

pub use config::ConnectionConfig;
pub use connection::Connection;
pub use context::RequestContext;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("connection broken: {0}")]
    ConnectionBroken(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("timed out waiting for response to tag {0}")]
    Timeout(u64),

    #[error("server returned status '{0}'")]
    Status(StatusCode),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}
