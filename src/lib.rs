pub mod cli;
pub mod client;
pub mod command;
pub mod protocol;
pub mod types;

pub use cli::prompt;
pub use client::{ClientError, Connection, ConnectionConfig, RequestContext};
pub use command::Command;
pub use types::{ChangedRange, RawPoint, StatPoint, StreamId};
