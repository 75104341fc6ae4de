//! The bounded request/reply wire format shared by distributor and worker.
//!
//! Every message is a single frame of at most [`MAX_MSG_BYTES`] bytes as far
//! as the protocol is concerned. Requests start with a three byte tag
//! (`map`, `red`, `rip`); the rest of the frame is the payload. Count
//! payloads come in two flavours, see [`counts`].

mod command;
pub mod counts;
mod frame;

pub use command::*;
pub use counts::{Encoded, PayloadWriter, decode_decimal, decode_unary, encode_decimal, encode_unary};
pub use frame::MessageCodec;

pub const MAX_MSG_BYTES: usize = 1500;
pub const TAG_LEN: usize = 3;
/// Reserved at the end of every message.
pub const TERMINATOR_LEN: usize = 1;
/// Payload room left in a tagged request.
pub const MAX_PAYLOAD_BYTES: usize = MAX_MSG_BYTES - TAG_LEN - TERMINATOR_LEN;
/// A chunk travels as the payload of a `map` request.
pub const MAX_CHUNK_BYTES: usize = MAX_PAYLOAD_BYTES;
/// Replies carry no tag.
pub const MAX_REPLY_BYTES: usize = MAX_MSG_BYTES - TERMINATOR_LEN;
/// Hard ceiling of the transport framing. Only a chunk made of one oversized
/// token ever exceeds [`MAX_MSG_BYTES`].
pub const MAX_FRAME_BYTES: usize = 64 * 1024;
