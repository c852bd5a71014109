//! Incremental sentence chunking over a token stream.
//!
//! The model streams text in arbitrary-sized deltas; synthesis wants whole
//! sentences. The chunker buffers deltas and releases the maximal prefix
//! ending at the last terminal punctuation (`.`, `!`, `?`) that is followed
//! by whitespace, keeping the remainder for the next delta.

/// Stateful sentence splitter for one model response.
#[derive(Debug, Default)]
pub struct SentenceChunker {
    buf: String,
}

impl SentenceChunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one delta. Returns the completed prefix, if any.
    pub fn push(&mut self, delta: &str) -> Option<String> {
        self.buf.push_str(delta);

        let mut split_at = None;
        let mut prev: Option<(usize, char)> = None;
        for (i, c) in self.buf.char_indices() {
            if let Some((pi, pc)) = prev {
                if matches!(pc, '.' | '!' | '?') && c.is_whitespace() {
                    split_at = Some(pi + pc.len_utf8());
                }
            }
            prev = Some((i, c));
        }

        let at = split_at?;
        let head = self.buf[..at].trim().to_string();
        self.buf = self.buf[at..].trim_start().to_string();
        if head.is_empty() {
            None
        } else {
            Some(head)
        }
    }

    /// Drain whatever is left once the stream ends.
    pub fn flush(&mut self) -> Option<String> {
        let tail = std::mem::take(&mut self.buf);
        let tail = tail.trim();
        if tail.is_empty() {
            None
        } else {
            Some(tail.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn releases_on_sentence_boundary() {
        let mut c = SentenceChunker::new();
        assert_eq!(c.push("We're open "), None);
        assert_eq!(
            c.push("nine to five. Come on"),
            Some("We're open nine to five.".to_string())
        );
        assert_eq!(c.flush(), Some("Come on".to_string()));
    }

    #[test]
    fn takes_maximal_prefix_across_multiple_sentences() {
        let mut c = SentenceChunker::new();
        let out = c.push("One. Two! Three? four");
        assert_eq!(out, Some("One. Two! Three?".to_string()));
        assert_eq!(c.flush(), Some("four".to_string()));
    }

    #[test]
    fn trailing_period_without_whitespace_waits() {
        let mut c = SentenceChunker::new();
        // "3.5" style decimals and a final "." with no following space stay
        // buffered until the stream confirms the boundary.
        assert_eq!(c.push("It costs 3.5"), None);
        assert_eq!(c.push(" dollars."), None);
        assert_eq!(c.flush(), Some("It costs 3.5 dollars.".to_string()));
    }

    #[test]
    fn flush_of_empty_buffer_is_none() {
        let mut c = SentenceChunker::new();
        assert_eq!(c.flush(), None);
        c.push("   ");
        assert_eq!(c.flush(), None);
    }
}
