//! Splits narration text into utterance-sized chunks.
//!
//! Platform engines stall or truncate on long input, so text is handed over a
//! chunk at a time.  A chunk holds at most `words_per_chunk` words and at
//! most `max_chars` characters, always broken at a word boundary.  A single
//! word longer than `max_chars` is cut into `max_chars`-sized pieces.
//!
//! Positions are word indices, which is what pause/resume works with.
//!
//! ```rust
//! use marker_narrator::speech::SpeechChunker;
//!
//! let mut chunker = SpeechChunker::new("one two three four five", 2, 4000);
//! assert_eq!(chunker.next_chunk().as_deref(), Some("one two"));
//! assert_eq!(chunker.next_chunk().as_deref(), Some("three four"));
//! assert_eq!(chunker.next_chunk().as_deref(), Some("five"));
//! assert_eq!(chunker.next_chunk(), None);
//! ```

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechChunker {
    words: Vec<String>,
    next: usize,
    last_chunk_start: usize,
    words_per_chunk: usize,
    max_chars: usize,
}

impl SpeechChunker {
    /// # Panics
    ///
    /// Panics if `words_per_chunk` or `max_chars` is zero.
    pub fn new(text: &str, words_per_chunk: usize, max_chars: usize) -> Self {
        assert!(words_per_chunk > 0, "words_per_chunk must be > 0");
        assert!(max_chars > 0, "max_chars must be > 0");

        let words = text
            .split_whitespace()
            .flat_map(|word| split_long_word(word, max_chars))
            .collect();

        Self {
            words,
            next: 0,
            last_chunk_start: 0,
            words_per_chunk,
            max_chars,
        }
    }

    /// The next chunk, or `None` once the text is exhausted.
    pub fn next_chunk(&mut self) -> Option<String> {
        if !self.has_remaining() {
            return None;
        }

        self.last_chunk_start = self.next;
        let mut chunk = String::new();
        let mut taken = 0;
        for word in &self.words[self.next..] {
            if taken == self.words_per_chunk {
                break;
            }
            let extra = if chunk.is_empty() {
                word.chars().count()
            } else {
                word.chars().count() + 1
            };
            if taken > 0 && chunk.chars().count() + extra > self.max_chars {
                break;
            }
            if !chunk.is_empty() {
                chunk.push(' ');
            }
            chunk.push_str(word);
            taken += 1;
        }

        self.next += taken;
        Some(chunk)
    }

    pub fn has_remaining(&self) -> bool {
        self.next < self.words.len()
    }

    /// Text not yet handed out.
    pub fn remaining_text(&self) -> String {
        self.words[self.next.min(self.words.len())..].join(" ")
    }

    /// Word index of the next chunk.
    pub fn position(&self) -> usize {
        self.next
    }

    /// Word index of the chunk most recently handed out.
    pub fn last_chunk_start(&self) -> usize {
        self.last_chunk_start
    }

    /// Where to pick up after a pause: one chunk before the chunk that was
    /// playing, so the listener hears a little context again.
    pub fn resume_index(&self) -> usize {
        self.last_chunk_start.saturating_sub(self.words_per_chunk)
    }

    /// Continue from word `index` (clamped to the end of the text).
    pub fn seek(&mut self, index: usize) {
        self.next = index.min(self.words.len());
        self.last_chunk_start = self.next;
    }

    pub fn total_words(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

fn split_long_word(word: &str, max_chars: usize) -> Vec<String> {
    if word.chars().count() <= max_chars {
        return vec![word.to_string()];
    }
    let chars: Vec<char> = word.chars().collect();
    chars
        .chunks(max_chars)
        .map(|piece| piece.iter().collect())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
