use bincode::{Decode, Encode};

use crate::types::{RawPoint, StreamId};

/// Operations a client can ask of the database.
#[derive(Debug, Clone, Encode, Decode, PartialEq)]
pub enum RequestBody {
    QueryStandardValues {
        uuid: StreamId,
        start_time: i64,
        end_time: i64,
        version: u64,
    },
    QueryStatisticalValues {
        uuid: StreamId,
        start_time: i64,
        end_time: i64,
        point_width: u8,
        version: u64,
    },
    QueryWindowValues {
        uuid: StreamId,
        start_time: i64,
        end_time: i64,
        width: u64,
        depth: u8,
        version: u64,
    },
    QueryVersion {
        uuids: Vec<StreamId>,
    },
    QueryNearestValue {
        uuid: StreamId,
        time: i64,
        backward: bool,
        version: u64,
    },
    QueryChangedRanges {
        uuid: StreamId,
        from_generation: u64,
        to_generation: u64,
        resolution: u8,
    },
    InsertValues {
        uuid: StreamId,
        values: Vec<RawPoint>,
        sync: bool,
    },
    DeleteValues {
        uuid: StreamId,
        start_time: i64,
        end_time: i64,
    },
}

/// Outbound message. The server echoes `echo_tag` on every response part.
#[derive(Debug, Clone, Encode, Decode, PartialEq)]
pub struct Request {
    pub echo_tag: u64,
    pub body: RequestBody,
}

impl Request {
    pub fn new(echo_tag: u64, body: RequestBody) -> Self {
        Self { echo_tag, body }
    }
}
