use std::fmt;

use bincode::{Decode, Encode};

use crate::types::{ChangedRange, RawPoint, StatPoint, StreamId};

#[derive(Debug, Clone, Copy, Encode, Decode, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    InternalError,
    UnknownStream,
    InvalidParameter,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusCode::Ok => "ok",
            StatusCode::InternalError => "internalError",
            StatusCode::UnknownStream => "unknownStream",
            StatusCode::InvalidParameter => "invalidParameter",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Encode, Decode, PartialEq)]
pub enum ResponseBody {
    Void,
    Records {
        version: u64,
        values: Vec<RawPoint>,
    },
    StatisticalRecords {
        version: u64,
        values: Vec<StatPoint>,
    },
    VersionList {
        uuids: Vec<StreamId>,
        versions: Vec<u64>,
    },
    ChangedRngList {
        version: u64,
        values: Vec<ChangedRange>,
    },
}

/// Everything in a response part after its routing fields.
#[derive(Debug, Clone, Encode, Decode, PartialEq)]
pub struct ResponsePayload {
    pub status: StatusCode,
    pub body: ResponseBody,
}

/// One response part as the server writes it. `echo_tag` and `is_final`
/// lead the encoding so they can be read without touching the payload.
#[derive(Debug, Clone, Encode, Decode, PartialEq)]
pub struct Response {
    pub echo_tag: u64,
    pub is_final: bool,
    pub payload: ResponsePayload,
}

impl Response {
    pub fn new(echo_tag: u64, is_final: bool, status: StatusCode, body: ResponseBody) -> Self {
        Self {
            echo_tag,
            is_final,
            payload: ResponsePayload { status, body },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings() {
        assert_eq!(StatusCode::Ok.to_string(), "ok");
        assert_eq!(StatusCode::InternalError.to_string(), "internalError");
        assert_eq!(StatusCode::UnknownStream.to_string(), "unknownStream");
        assert_eq!(StatusCode::InvalidParameter.to_string(), "invalidParameter");
    }
}
