//! Builds one bounded `red` request per round by draining the intermediate
//! tally from the front.

use bytes::Bytes;
use serde::Serialize;

use crate::tally::Tally;
use crate::wire::{PayloadWriter, REDUCE_TAG, Request, TAG_LEN, TERMINATOR_LEN};

/// A word removed without being sent because it cannot fit any request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedWord {
    pub word: String,
    pub lost: u64,
}

#[derive(Debug, PartialEq)]
pub struct Packed {
    /// The whole message, tag included.
    pub message: Bytes,
    pub dropped: Vec<DroppedWord>,
    /// Count units written to the message.
    pub units: u64,
    /// Entries fully drained and removed from the tally.
    pub drained: usize,
}

impl Packed {
    pub fn has_payload(&self) -> bool {
        self.units > 0
    }

    pub fn request(&self) -> Request {
        Request::Reduce(self.message.slice(TAG_LEN..))
    }
}

/// Packs the front of `intermediate` into a unary `red` message of at most
/// `max_msg_bytes` bytes.
///
/// Entries are taken strictly in tally order and a word is only written when
/// it and at least one count unit fit. An entry whose whole count was
/// written is removed; a partially written one stays at the front and ends
/// the round. A word that cannot fit even an empty message is removed and
/// reported in [`Packed::dropped`]. Every call on a non-empty tally
/// therefore removes an entry or lowers the front entry's count.
pub fn pack_round(intermediate: &mut Tally, max_msg_bytes: usize) -> Packed {
    let capacity = max_msg_bytes.saturating_sub(TAG_LEN + TERMINATOR_LEN);
    let mut out = PayloadWriter::with_tag(REDUCE_TAG, capacity);
    let mut dropped = Vec::new();
    let mut units = 0;
    let mut drained = 0;

    while out.remaining() > 0 {
        let (word_len, count) = match intermediate.front() {
            Some((word, count)) => (word.len(), count),
            None => break,
        };

        if word_len >= capacity {
            if let Some((word, lost)) = intermediate.pop_front() {
                dropped.push(DroppedWord { word, lost });
            }
            continue;
        }
        if count == 0 {
            intermediate.pop_front();
            continue;
        }
        if word_len + 1 > out.remaining() {
            break;
        }

        let Some((word, count)) = intermediate.front_mut() else {
            break;
        };
        out.put_word(word);
        let written = out.put_units(*count);
        *count -= written;
        units += written;

        if *count > 0 {
            break;
        }
        intermediate.pop_front();
        drained += 1;
    }

    Packed {
        message: out.freeze(),
        dropped,
        units,
        drained,
    }
}
