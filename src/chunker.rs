//! Splits a document into word-safe chunks small enough for one `map`
//! request.

use bytes::Bytes;

/// Cuts `document` into chunks of at most `max_len` bytes.
///
/// A chunk ends on whitespace when the window holds any. Otherwise it ends
/// after the last non-letter byte, so a long run like `a,b,c,...` is still
/// cut between words. Only a single word longer than `max_len` becomes an
/// oversized chunk of its own. Whitespace between chunks is dropped, so
/// every chunk starts with a non-whitespace byte. The chunks share
/// `document`'s buffer.
pub fn split(document: &Bytes, max_len: usize) -> Vec<Bytes> {
    let data = document.as_ref();
    let mut chunks = Vec::new();
    let mut pos = skip_whitespace(data, 0);

    while pos < data.len() {
        let rest = data.len() - pos;
        let mut end = pos + rest.min(max_len);

        if end < data.len() && !is_space(data[end]) && !is_space(data[end - 1]) {
            // the window ends inside a token: back off to the last space
            match data[pos..end].iter().rposition(|&b| is_space(b)) {
                Some(space) => end = pos + space + 1,
                None => end = word_boundary(data, pos, end),
            }
        }

        chunks.push(document.slice(pos..end));
        pos = skip_whitespace(data, end);
    }

    chunks
}

fn is_space(b: u8) -> bool {
    b.is_ascii_whitespace() || b == 0x0b
}

fn skip_whitespace(data: &[u8], mut pos: usize) -> usize {
    while pos < data.len() && is_space(data[pos]) {
        pos += 1;
    }
    pos
}

fn is_letter(b: u8) -> bool {
    b.is_ascii_alphabetic()
}

/// End of a whitespace-free window `pos..end` that does not cut a word.
fn word_boundary(data: &[u8], pos: usize, end: usize) -> usize {
    if !is_letter(data[end - 1]) || !is_letter(data[end]) {
        return end;
    }
    match data[pos..end].iter().rposition(|&b| !is_letter(b)) {
        Some(separator) => pos + separator + 1,
        None => word_end(data, pos),
    }
}

fn word_end(data: &[u8], mut pos: usize) -> usize {
    while pos < data.len() && is_letter(data[pos]) {
        pos += 1;
    }
    pos
}
