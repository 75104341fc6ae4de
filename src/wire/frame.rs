use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use super::{MAX_FRAME_BYTES, Request};
use crate::{Error, Result};

/// One protocol message per length-delimited frame.
///
/// Decodes raw frames; the worker parses them into a [`Request`] and the
/// distributor interprets them as replies.
pub struct MessageCodec {
    inner: LengthDelimitedCodec,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .length_field_type::<u32>()
                .big_endian()
                .max_frame_length(MAX_FRAME_BYTES)
                .new_codec(),
        }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<Bytes> for MessageCodec {
    type Error = Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        self.inner
            .encode(item, dst)
            .map_err(|e| Error::InvalidProtocol(e.to_string()))
    }
}

impl Encoder<Request> for MessageCodec {
    type Error = Error;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<()> {
        self.encode(item.to_bytes(), dst)
    }
}

impl Decoder for MessageCodec {
    type Item = Bytes;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        Ok(self.inner.decode(src)?.map(BytesMut::freeze))
    }
}
