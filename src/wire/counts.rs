//! Count payloads: runs of `(word)(count)` records with no delimiter.
//!
//! * unary: the count is that many `'1'` bytes (`the111cat1`). Used for map
//!   replies and reduce requests.
//! * decimal: the count is ASCII digits (`the3cat1`). Used for reduce replies.
//!
//! Both are decoded with the same two-class lexer: a maximal run of letters
//! is the word, the maximal run of count bytes after it is the count. Words
//! never contain digits, which is the only thing keeping the records apart.

use bytes::{BufMut, Bytes, BytesMut};

use crate::tally::Tally;
use crate::{Error, Result};

const UNIT: u8 = b'1';

/// A bounded output buffer that never writes a partial word.
#[derive(Debug)]
pub struct PayloadWriter {
    buf: BytesMut,
    limit: usize,
}

impl PayloadWriter {
    /// `capacity` payload bytes with nothing in front.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            limit: capacity,
        }
    }

    /// A request buffer starting with `tag`; `capacity` counts payload bytes only.
    pub fn with_tag(tag: &[u8], capacity: usize) -> Self {
        let mut buf = BytesMut::with_capacity(tag.len() + capacity);
        buf.put_slice(tag);
        Self {
            buf,
            limit: tag.len() + capacity,
        }
    }

    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.buf.len())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Writes `word` if it fits whole. Returns whether it was written.
    pub fn put_word(&mut self, word: &str) -> bool {
        debug_assert!(word.bytes().all(|b| b.is_ascii_alphabetic()));
        if word.is_empty() || word.len() > self.remaining() {
            return false;
        }
        self.buf.put_slice(word.as_bytes());
        true
    }

    /// Writes up to `count` unary units and returns how many fit.
    pub fn put_units(&mut self, count: u64) -> u64 {
        let room = u64::try_from(self.remaining()).unwrap_or(u64::MAX);
        let units = count.min(room);
        // units <= remaining(), which is a usize
        self.buf.put_bytes(UNIT, units as usize);
        units
    }

    /// Writes `count` in decimal if every digit fits.
    pub fn put_decimal(&mut self, count: u64) -> bool {
        let digits = count.to_string();
        if digits.len() > self.remaining() {
            return false;
        }
        self.buf.put_slice(digits.as_bytes());
        true
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// An encoded payload plus whatever did not make it into the buffer.
#[derive(Debug, Default, PartialEq)]
pub struct Encoded {
    pub payload: Bytes,
    /// `(word, count left unwritten)`, in tally order.
    pub skipped: Vec<(String, u64)>,
}

/// Unary-encodes `tally` into at most `capacity` bytes.
///
/// Entries with a zero count are omitted. A word too long for an empty
/// buffer is skipped and encoding carries on; a word that only fails to fit
/// the space left ends the payload.
pub fn encode_unary(tally: &Tally, capacity: usize) -> Encoded {
    let mut out = PayloadWriter::new(capacity);
    let mut skipped = Vec::new();
    let mut entries = tally.iter().filter(|(_, count)| *count > 0);

    while let Some((word, count)) = entries.next() {
        if word.len() >= capacity {
            skipped.push((word.to_string(), count));
            continue;
        }
        if !out.put_word(word) {
            skipped.push((word.to_string(), count));
            skipped.extend(entries.by_ref().map(|(w, c)| (w.to_string(), c)));
            break;
        }
        let written = out.put_units(count);
        if written < count {
            skipped.push((word.to_string(), count - written));
        }
    }

    Encoded {
        payload: out.freeze(),
        skipped,
    }
}

/// Decimal-encodes `tally` into at most `capacity` bytes, all-or-nothing per
/// record.
pub fn encode_decimal(tally: &Tally, capacity: usize) -> Encoded {
    let mut out = PayloadWriter::new(capacity);
    let mut skipped = Vec::new();

    for (word, count) in tally.iter() {
        let record = word.len() + count.to_string().len();
        if record > out.remaining() {
            skipped.push((word.to_string(), count));
            continue;
        }
        out.put_word(word);
        out.put_decimal(count);
    }

    Encoded {
        payload: out.freeze(),
        skipped,
    }
}

struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Consumes the longest run of bytes in `class`.
    fn run(&mut self, class: impl Fn(u8) -> bool) -> &'a [u8] {
        let start = self.pos;
        while self.pos < self.input.len() && class(self.input[self.pos]) {
            self.pos += 1;
        }
        &self.input[start..self.pos]
    }
}

fn word_of(letters: &[u8]) -> &str {
    // letters are ASCII alphabetic
    std::str::from_utf8(letters).unwrap_or_default()
}

/// Decodes a unary payload, summing repeated words. Records missing either
/// the word or the count are ignored; decoding stops at the first byte that
/// is neither a letter nor `'1'`.
pub fn decode_unary(payload: &[u8]) -> Tally {
    let mut tally = Tally::new();
    let mut lexer = Lexer::new(payload);

    loop {
        let word = lexer.run(|b| b.is_ascii_alphabetic());
        let units = lexer.run(|b| b == UNIT);
        if word.is_empty() && units.is_empty() {
            break;
        }
        if !word.is_empty() && !units.is_empty() {
            tally.add(word_of(word), units.len() as u64);
        }
    }

    tally
}

/// Decodes a decimal payload, summing repeated words. Records missing either
/// the word or the digits are ignored; decoding stops at the first byte that
/// is neither a letter nor a digit.
pub fn decode_decimal(payload: &[u8]) -> Result<Tally> {
    let mut tally = Tally::new();
    let mut lexer = Lexer::new(payload);

    loop {
        let word = lexer.run(|b| b.is_ascii_alphabetic());
        let digits = lexer.run(|b| b.is_ascii_digit());
        if word.is_empty() && digits.is_empty() {
            break;
        }
        if !word.is_empty() && !digits.is_empty() {
            let count = atoi::atoi::<u64>(digits).ok_or_else(|| {
                Error::InvalidProtocol(format!(
                    "count for {:?} does not fit in 64 bits",
                    word_of(word)
                ))
            })?;
            tally.add(word_of(word), count);
        }
    }

    Ok(tally)
}
