//! Splits a document into bounded, ordered chunks for synthesis.
//!
//! Text is first cut into sentences (terminator runs such as `.`, `?!` or
//! `...` followed by whitespace, or paragraph breaks), then sentences are
//! packed greedily into chunks of at most `max_chunk_chars` characters.
//!
//! Whitespace is normalised on the way: every whitespace run becomes a single
//! space, so [`rejoin`] of the chunks equals [`normalize`] of the input.
//! The one exception is a single word longer than the limit, which is
//! hard-split mid-word and cannot be rejoined exactly.

use crate::error::{ReadaloudError, Result};

/// Characters that end a sentence when they close a word.
const TERMINATORS: [char; 4] = ['.', '!', '?', '…'];

/// Closing punctuation allowed after a terminator (`"Stop!"`, `(see above.)`).
const CLOSERS: [char; 8] = ['"', '\'', '”', '’', ')', ']', '}', '»'];

/// One unit of text submitted as a single synthesis request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position in the document, dense from 0.
    pub index: usize,
    /// Normalised text, at most `max_chunk_chars` characters.
    pub text: String,
}

impl Chunk {
    /// Creates a new chunk.
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }

    /// Length in characters (not bytes).
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Splits `text` into chunks of at most `max_chunk_chars` characters.
///
/// Empty or whitespace-only input yields no chunks.
///
/// # Errors
/// Returns [`ReadaloudError::InvalidConfiguration`] if `max_chunk_chars` is 0.
pub fn split(text: &str, max_chunk_chars: usize) -> Result<Vec<Chunk>> {
    if max_chunk_chars == 0 {
        return Err(ReadaloudError::invalid_config(
            "max_chunk_chars",
            "must be greater than 0",
        ));
    }

    let mut packer = Packer::new(max_chunk_chars);
    for sentence in sentences(text) {
        packer.push_sentence(&sentence);
    }
    Ok(packer.finish())
}

/// Collapses every whitespace run to a single space and trims the ends.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Joins chunk texts in index order.
pub fn rejoin(chunks: &[Chunk]) -> String {
    let mut ordered: Vec<&Chunk> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.index);
    ordered
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cuts text into normalised sentences.
fn sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut rest = text.trim_start();

    while !rest.is_empty() {
        let word_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let word = &rest[..word_end];
        let after = &rest[word_end..];
        let gap_len = after.len() - after.trim_start().len();
        let gap = &after[..gap_len];

        current.push(word);
        let paragraph_break = gap.matches('\n').count() >= 2;
        if ends_sentence(word) || paragraph_break {
            out.push(current.join(" "));
            current.clear();
        }

        rest = &after[gap_len..];
    }

    if !current.is_empty() {
        out.push(current.join(" "));
    }
    out
}

fn ends_sentence(word: &str) -> bool {
    word.trim_end_matches(CLOSERS)
        .chars()
        .next_back()
        .is_some_and(|c| TERMINATORS.contains(&c))
}

/// Greedy chunk builder.
struct Packer {
    max: usize,
    chunks: Vec<Chunk>,
    current: String,
    current_len: usize,
}

impl Packer {
    fn new(max: usize) -> Self {
        Self {
            max,
            chunks: Vec::new(),
            current: String::new(),
            current_len: 0,
        }
    }

    fn push_sentence(&mut self, sentence: &str) {
        let len = sentence.chars().count();
        if len <= self.max {
            self.push_piece(sentence, len);
            return;
        }

        // Sentence too long: fall back to word boundaries, then to the hard limit.
        for word in sentence.split(' ') {
            let word_len = word.chars().count();
            if word_len <= self.max {
                self.push_piece(word, word_len);
            } else {
                let chars: Vec<char> = word.chars().collect();
                for piece in chars.chunks(self.max) {
                    let piece: String = piece.iter().collect();
                    let piece_len = piece.chars().count();
                    self.push_piece(&piece, piece_len);
                }
            }
        }
    }

    /// Appends a piece that is known to fit in an empty chunk.
    fn push_piece(&mut self, piece: &str, len: usize) {
        if self.current_len > 0 && self.current_len + 1 + len > self.max {
            self.flush();
        }
        if self.current_len > 0 {
            self.current.push(' ');
            self.current_len += 1;
        }
        self.current.push_str(piece);
        self.current_len += len;
    }

    fn flush(&mut self) {
        if self.current_len == 0 {
            return;
        }
        let index = self.chunks.len();
        self.chunks
            .push(Chunk::new(index, std::mem::take(&mut self.current)));
        self.current_len = 0;
    }

    fn finish(mut self) -> Vec<Chunk> {
        self.flush();
        self.chunks
    }
}
