use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::tally::Tally;
use crate::wire::{self, MAX_REPLY_BYTES, RIP_ACK, Request};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Listening,
    Done,
}

/// Counts requests as they are dispatched.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct WorkerStats {
    pub maps: u64,
    pub reduces: u64,
    pub unknown: u64,
}

/// Turns one request into its reply and the state to continue in.
pub fn dispatch(request: Request, stats: &mut WorkerStats) -> (Bytes, WorkerState) {
    match request {
        Request::Map(chunk) => {
            stats.maps += 1;
            (map_chunk(&chunk), WorkerState::Listening)
        }
        Request::Reduce(payload) => {
            stats.reduces += 1;
            (reduce_counts(&payload), WorkerState::Listening)
        }
        Request::Rip => {
            info!("received rip, shutting down");
            (Bytes::from_static(RIP_ACK), WorkerState::Done)
        }
        Request::Unknown(frame) => {
            stats.unknown += 1;
            let tag = &frame[..frame.len().min(wire::TAG_LEN)];
            warn!("unknown command {:?}", String::from_utf8_lossy(tag));
            (Bytes::new(), WorkerState::Listening)
        }
    }
}

/// Lowercased alphabetic tokens of `text`, counted in order of first
/// appearance. Every non-letter byte separates tokens.
pub fn count_words(text: &[u8]) -> Tally {
    let mut tally = Tally::new();
    for token in text
        .split(|b| !b.is_ascii_alphabetic())
        .filter(|token| !token.is_empty())
    {
        let word = token.to_ascii_lowercase();
        tally.add(&String::from_utf8_lossy(&word), 1);
    }
    tally
}

/// `map`: count the chunk and reply in unary.
pub fn map_chunk(chunk: &[u8]) -> Bytes {
    let tally = count_words(chunk);
    let encoded = wire::encode_unary(&tally, MAX_REPLY_BYTES);
    for (word, lost) in &encoded.skipped {
        warn!(
            word_len = word.len(),
            lost, "map reply is full, dropping counts"
        );
    }
    debug!(
        words = tally.len(),
        reply_len = encoded.payload.len(),
        "mapped chunk of {} bytes",
        chunk.len()
    );
    encoded.payload
}

/// `red`: sum a unary payload and reply in decimal.
pub fn reduce_counts(payload: &[u8]) -> Bytes {
    let tally = wire::decode_unary(payload);
    let encoded = wire::encode_decimal(&tally, MAX_REPLY_BYTES);
    for (word, lost) in &encoded.skipped {
        warn!(word_len = word.len(), lost, "reduce reply is full, dropping counts");
    }
    encoded.payload
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(text: &str) -> String {
        String::from_utf8(map_chunk(text.as_bytes()).to_vec()).unwrap()
    }

    fn reduce(payload: &str) -> String {
        String::from_utf8(reduce_counts(payload.as_bytes()).to_vec()).unwrap()
    }

    #[test]
    fn map_folds_case_and_punctuation() {
        assert_eq!(map("The the THE cat"), "the111cat1");
        assert_eq!(map("don't stop-me, now!"), "don1t1stop1me1now1");
        assert_eq!(map("r2d2 and c3po"), "r1d1and1c1po1");
        assert_eq!(map("  \n\t 42 !! "), "");
    }

    #[test]
    fn map_keeps_first_appearance_order() {
        assert_eq!(
            map("alpha beta alpha gamma beta alpha"),
            "alpha111beta11gamma1"
        );
    }

    #[test]
    fn map_ignores_non_ascii_bytes() {
        assert_eq!(map_chunk("café au lait".as_bytes()).as_ref(), b"caf1au1lait1");
    }

    #[test]
    fn reduce_turns_unary_into_decimal() {
        assert_eq!(reduce("the111cat1the11"), "the5cat1");
        assert_eq!(reduce(&format!("word{}", "1".repeat(120))), "word120");
        assert_eq!(reduce(""), "");
    }

    #[test]
    fn map_reply_never_exceeds_budget() {
        let chunk = "a ".repeat(wire::MAX_CHUNK_BYTES / 2);
        assert!(map_chunk(chunk.as_bytes()).len() <= MAX_REPLY_BYTES);

        let distinct: String = (0..300).map(|i| format!("w{} ", "x".repeat(i % 7))).collect();
        assert!(map_chunk(distinct.as_bytes()).len() <= MAX_REPLY_BYTES);
    }

    #[test]
    fn dispatch_routes_each_command() {
        let mut stats = WorkerStats::default();

        let (reply, state) = dispatch(Request::Map(Bytes::from_static(b"Hi hi")), &mut stats);
        assert_eq!(reply.as_ref(), b"hi11");
        assert_eq!(state, WorkerState::Listening);

        let (reply, state) = dispatch(Request::Reduce(Bytes::from_static(b"hi11")), &mut stats);
        assert_eq!(reply.as_ref(), b"hi2");
        assert_eq!(state, WorkerState::Listening);

        let (reply, state) = dispatch(Request::Unknown(Bytes::from_static(b"foo")), &mut stats);
        assert!(reply.is_empty());
        assert_eq!(state, WorkerState::Listening);

        let (reply, state) = dispatch(Request::Rip, &mut stats);
        assert_eq!(reply.as_ref(), b"rip");
        assert_eq!(state, WorkerState::Done);

        assert_eq!(
            stats,
            WorkerStats {
                maps: 1,
                reduces: 1,
                unknown: 1
            }
        );
    }
}
