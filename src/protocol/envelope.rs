use bincode::{Decode, decode_from_slice};

use super::{Frame, transport::TransportError, wire_config};

/// Routing view of one decoded frame: the tag, the final-part flag, and the
/// still-encoded remainder of the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    tag: u64,
    is_final: bool,
    payload: Vec<u8>,
}

impl Envelope {
    pub fn new(tag: u64, is_final: bool, payload: Vec<u8>) -> Self {
        Self {
            tag,
            is_final,
            payload,
        }
    }

    /// Reads the routing fields from the front of the frame body.
    pub fn decode(frame: &Frame) -> Result<Self, TransportError> {
        let body = frame.body();
        let ((tag, is_final), read): ((u64, bool), usize) = decode_from_slice(body, wire_config())?;
        Ok(Self {
            tag,
            is_final,
            payload: body[read..].to_vec(),
        })
    }

    pub fn tag(&self) -> u64 {
        self.tag
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn raw_payload(&self) -> &[u8] {
        &self.payload
    }

    /// Decodes the payload as `T`. Word padding after the message is ignored.
    pub fn payload<T: Decode<()>>(&self) -> Result<T, TransportError> {
        let (value, _) = decode_from_slice(&self.payload, wire_config())?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use bincode::encode_to_vec;

    use crate::protocol::{ResponseBody, ResponsePayload, StatusCode, response::Response};
    use crate::types::RawPoint;

    use super::*;

    fn frame_for(resp: &Response) -> Frame {
        Frame::single(&encode_to_vec(resp, wire_config()).unwrap())
    }

    #[test]
    fn decodes_routing_fields() {
        let resp = Response::new(42, false, StatusCode::Ok, ResponseBody::Void);
        let env = Envelope::decode(&frame_for(&resp)).unwrap();

        assert_eq!(env.tag(), 42);
        assert!(!env.is_final());
    }

    #[test]
    fn payload_survives_padding() {
        let resp = Response::new(
            u64::MAX,
            true,
            StatusCode::Ok,
            ResponseBody::Records {
                version: 9,
                values: vec![RawPoint::new(10, 0.25)],
            },
        );
        let frame = frame_for(&resp);
        assert_eq!(frame.body().len() % 8, 0);

        let env = Envelope::decode(&frame).unwrap();
        let payload: ResponsePayload = env.payload().unwrap();

        assert_eq!(env.tag(), u64::MAX);
        assert!(env.is_final());
        assert_eq!(payload, resp.payload);
    }

    #[test]
    fn empty_frame_is_an_error() {
        let frame = Frame::single(&[]);
        assert!(Envelope::decode(&frame).is_err());
    }
}
