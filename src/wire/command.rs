use bytes::{BufMut, Bytes, BytesMut};

use super::TAG_LEN;

pub const MAP_TAG: &[u8; TAG_LEN] = b"map";
pub const REDUCE_TAG: &[u8; TAG_LEN] = b"red";
pub const RIP_TAG: &[u8; TAG_LEN] = b"rip";

/// Reply a worker sends before shutting down.
pub const RIP_ACK: &[u8] = b"rip";

/// A request frame, demultiplexed on its first three bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Map(Bytes),
    Reduce(Bytes),
    Rip,
    /// Any other tag. Holds the whole frame.
    Unknown(Bytes),
}

impl Request {
    pub fn parse(frame: Bytes) -> Request {
        if frame.len() < TAG_LEN {
            return Request::Unknown(frame);
        }
        match &frame[..TAG_LEN] {
            tag if tag == MAP_TAG => Request::Map(frame.slice(TAG_LEN..)),
            tag if tag == REDUCE_TAG => Request::Reduce(frame.slice(TAG_LEN..)),
            tag if tag == RIP_TAG => Request::Rip,
            _ => Request::Unknown(frame),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Request::Map(_) => "map",
            Request::Reduce(_) => "red",
            Request::Rip => "rip",
            Request::Unknown(_) => "unknown",
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let (tag, payload): (&[u8], &[u8]) = match self {
            Request::Map(payload) => (MAP_TAG, payload),
            Request::Reduce(payload) => (REDUCE_TAG, payload),
            Request::Rip => (RIP_TAG, &[]),
            Request::Unknown(frame) => return frame.clone(),
        };
        let mut buf = BytesMut::with_capacity(tag.len() + payload.len());
        buf.put_slice(tag);
        buf.put_slice(payload);
        buf.freeze()
    }
}

pub fn is_rip_ack(reply: &[u8]) -> bool {
    reply == RIP_ACK
}
