//! Word-boundary text chunking under a hard character limit

/// Separator used when chunk translations are put back together
pub const CHUNK_SEPARATOR: &str = " ";

/// What separated a chunk from the one after it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// The split fell on whitespace
    Whitespace,
    /// A token longer than the limit was cut mid-word
    Forced,
    /// Last chunk of the text
    End,
}

impl Boundary {
    /// Text placed after a chunk when the pieces are joined again
    pub fn separator(&self) -> &'static str {
        match self {
            Boundary::Whitespace => CHUNK_SEPARATOR,
            Boundary::Forced | Boundary::End => "",
        }
    }
}

/// One bounded slice of the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Zero-based position in the chunk sequence
    pub index: usize,
    /// Slice of the original text, trimmed at both ends
    pub text: &'a str,
    pub boundary: Boundary,
}

impl Chunk<'_> {
    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Splits text into chunks of at most `max_length` characters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    max_length: usize,
}

impl Chunker {
    /// A zero limit is raised to one so splitting always makes progress
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length: max_length.max(1),
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Lazily split `text`
    pub fn split<'a>(&self, text: &'a str) -> Chunks<'a> {
        Chunks {
            rest: text,
            max_length: self.max_length,
            next_index: 0,
        }
    }
}

/// Split `text` into chunks of at most `max_length` characters.
///
/// Splits at the last whitespace at or before the limit, or mid-word when a
/// single word is longer than the limit.
pub fn split(text: &str, max_length: usize) -> Chunks<'_> {
    Chunker::new(max_length).split(text)
}

/// Join chunk texts the way translations are reassembled.
///
/// A space goes back only where the split fell on whitespace, so force-split
/// words come back whole.
pub fn rejoin<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = (&'a str, Boundary)>,
{
    let mut out = String::new();
    for (text, boundary) in parts {
        out.push_str(text);
        out.push_str(boundary.separator());
    }
    out
}

/// Iterator over the chunks of one text
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    rest: &'a str,
    max_length: usize,
    next_index: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Chunk<'a>> {
        let rest = self.rest.trim_start();
        if rest.is_empty() {
            self.rest = rest;
            return None;
        }

        // Byte offset of the first character past the limit, and the last
        // whitespace seen up to and including it.
        let mut limit = None;
        let mut last_space = None;
        for (count, (offset, ch)) in rest.char_indices().enumerate() {
            if ch.is_whitespace() {
                last_space = Some(offset);
            }
            if count == self.max_length {
                limit = Some(offset);
                break;
            }
        }

        let (piece, remainder, boundary) = match (limit, last_space) {
            (None, _) => (rest, "", Boundary::End),
            // rest starts with a non-space, so a found space is never at 0
            (Some(_), Some(at)) => {
                let (piece, remainder) = rest.split_at(at);
                (piece, remainder, Boundary::Whitespace)
            }
            (Some(at), None) => {
                tracing::debug!("Forced split at {} chars (no word boundary)", self.max_length);
                let (piece, remainder) = rest.split_at(at);
                (piece, remainder, Boundary::Forced)
            }
        };

        self.rest = remainder;
        let boundary = if remainder.trim_start().is_empty() {
            Boundary::End
        } else {
            boundary
        };
        let chunk = Chunk {
            index: self.next_index,
            text: piece.trim_end(),
            boundary,
        };
        self.next_index += 1;
        Some(chunk)
    }
}
