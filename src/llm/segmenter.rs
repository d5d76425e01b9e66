//! Sentence segmenter for streamed model output
//!
//! Accumulates text fragments as they arrive from the model and hands out
//! complete sentences as soon as a boundary is seen, so synthesis can start
//! before the reply has finished generating.

/// Default ceiling on buffered characters before a sentence is forced out
pub const DEFAULT_MAX_SENTENCE_CHARS: usize = 200;

/// Punctuation that ends a sentence when followed by whitespace
const TERMINALS: [char; 4] = ['.', '!', '?', '…'];

/// Full-width punctuation that ends a sentence on its own
const FULLWIDTH_TERMINALS: [char; 3] = ['。', '！', '？'];

/// Characters that may trail terminal punctuation and still belong to the sentence
const CLOSERS: [char; 7] = ['"', '\'', ')', ']', '”', '’', '」'];

/// Abbreviations whose period never ends a sentence
const ABBREVIATIONS: [&str; 11] = [
    "mr.", "mrs.", "ms.", "dr.", "prof.", "sr.", "jr.", "st.", "vs.", "e.g.", "i.e.",
];

/// A playback-ready sentence cut from the model stream
#[derive(Clone, Debug, PartialEq)]
pub struct Sentence {
    /// Sequential index of this sentence within the assistant turn
    pub index: usize,

    /// Text to hand to synthesis (surrounding whitespace removed)
    pub text: String,

    /// Exact slice of the stream this sentence consumed
    pub raw: String,
}

impl Sentence {
    fn from_raw(raw: String, index: usize) -> Self {
        Self {
            index,
            text: raw.trim().to_string(),
            raw,
        }
    }

    /// Whether there is nothing to speak in this sentence
    pub fn is_blank(&self) -> bool {
        self.text.is_empty()
    }
}

/// Streaming sentence segmenter
///
/// The concatenation of every emitted [`Sentence::raw`] followed by
/// [`SentenceSegmenter::buffered`] always equals the text fed so far.
#[derive(Clone, Debug)]
pub struct SentenceSegmenter {
    /// Text received but not yet emitted
    buffer: String,

    /// Index of the next sentence to emit
    next_index: usize,

    /// Hard ceiling for punctuation-free text
    max_chars: usize,
}

impl Default for SentenceSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl SentenceSegmenter {
    /// Create a segmenter with the default length ceiling
    pub fn new() -> Self {
        Self::with_max_chars(DEFAULT_MAX_SENTENCE_CHARS)
    }

    /// Create a segmenter with a custom length ceiling (at least one character)
    pub fn with_max_chars(max_chars: usize) -> Self {
        Self {
            buffer: String::new(),
            next_index: 0,
            max_chars: max_chars.max(1),
        }
    }

    /// Reset to an empty buffer and index zero
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.next_index = 0;
    }

    /// Feed a fragment and collect every sentence it completes
    pub fn feed(&mut self, fragment: &str) -> Vec<Sentence> {
        let mut sentences = Vec::new();
        self.feed_each(fragment, |sentence| sentences.push(sentence));
        sentences
    }

    /// Feed a fragment, calling `emit` for each completed sentence in stream order
    pub fn feed_each(&mut self, fragment: &str, mut emit: impl FnMut(Sentence)) {
        self.buffer.push_str(fragment);

        loop {
            let cut = match find_boundary(&self.buffer) {
                Some(end) => end,
                None => match self.ceiling_cut() {
                    Some(end) => end,
                    None => break,
                },
            };

            let rest = self.buffer.split_off(cut);
            let raw = std::mem::replace(&mut self.buffer, rest);
            emit(self.take_sentence(raw));
        }
    }

    /// Emit whatever is buffered as a final sentence
    ///
    /// Returns `None` when the buffer is already empty, so repeated calls are harmless.
    pub fn flush(&mut self) -> Option<Sentence> {
        if self.buffer.is_empty() {
            return None;
        }

        let raw = std::mem::take(&mut self.buffer);
        Some(self.take_sentence(raw))
    }

    /// Text received but not yet emitted
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Index the next emitted sentence will carry
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    fn take_sentence(&mut self, raw: String) -> Sentence {
        let sentence = Sentence::from_raw(raw, self.next_index);
        self.next_index += 1;
        sentence
    }

    /// Forced cut point once the buffer outgrows the ceiling
    ///
    /// Prefers the last whitespace inside the ceiling so words are not split.
    fn ceiling_cut(&self) -> Option<usize> {
        let (limit, _) = self.buffer.char_indices().nth(self.max_chars)?;

        let cut = match self.buffer[..limit].rfind(char::is_whitespace) {
            Some(ws) if !self.buffer[..ws].trim().is_empty() => ws,
            _ => limit,
        };

        Some(consume_whitespace(&self.buffer, cut))
    }
}

/// Byte offset just past the first sentence boundary, including trailing whitespace
fn find_boundary(text: &str) -> Option<usize> {
    for (i, c) in text.char_indices() {
        let after = i + c.len_utf8();

        if c == '\n' {
            if text[..i].trim().is_empty() {
                continue;
            }
            return Some(consume_whitespace(text, after));
        }

        if FULLWIDTH_TERMINALS.contains(&c) {
            return Some(consume_whitespace(text, skip_closers(text, after)));
        }

        if TERMINALS.contains(&c) {
            let end = skip_closers(text, after);
            // Punctuation at the very end is undecided until more text arrives
            let Some(next) = text[end..].chars().next() else {
                return None;
            };
            if !next.is_whitespace() {
                continue;
            }
            if c == '.' && ends_with_abbreviation(&text[..after]) {
                continue;
            }
            return Some(consume_whitespace(text, end));
        }
    }

    None
}

fn skip_closers(text: &str, from: usize) -> usize {
    let skipped: usize = text[from..]
        .chars()
        .take_while(|c| CLOSERS.contains(c))
        .map(char::len_utf8)
        .sum();
    from + skipped
}

fn consume_whitespace(text: &str, from: usize) -> usize {
    let skipped: usize = text[from..]
        .chars()
        .take_while(|c| c.is_whitespace())
        .map(char::len_utf8)
        .sum();
    from + skipped
}

fn ends_with_abbreviation(text: &str) -> bool {
    let word = text
        .rsplit(char::is_whitespace)
        .next()
        .unwrap_or_default()
        .to_lowercase();
    ABBREVIATIONS.contains(&word.as_str())
}

/// Segment a complete reply (non-streaming)
pub fn segment_text(text: &str) -> Vec<Sentence> {
    let mut segmenter = SentenceSegmenter::new();
    let mut sentences = segmenter.feed(text);

    if let Some(last) = segmenter.flush() {
        sentences.push(last);
    }

    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(sentences: &[Sentence]) -> Vec<&str> {
        sentences.iter().map(|s| s.text.as_str()).collect()
    }

    #[test]
    fn test_greeting_fragments() {
        let mut segmenter = SentenceSegmenter::new();

        let first = segmenter.feed("Hi! ");
        assert_eq!(texts(&first), vec!["Hi!"]);

        let second = segmenter.feed("Nice to meet you.");
        assert!(second.is_empty());

        let last = segmenter.flush().unwrap();
        assert_eq!(last.text, "Nice to meet you.");
        assert_eq!(last.index, 1);
        assert!(segmenter.buffered().is_empty());
    }

    #[test]
    fn test_boundary_split_across_fragments() {
        let mut segmenter = SentenceSegmenter::new();

        assert!(segmenter.feed("Tell me about").is_empty());
        assert!(segmenter.feed(" yourself.").is_empty());
        let sentences = segmenter.feed(" Take your time.");
        assert_eq!(texts(&sentences), vec!["Tell me about yourself."]);
        assert_eq!(segmenter.buffered(), "Take your time.");
    }

    #[test]
    fn test_no_split_inside_numbers_or_abbreviations() {
        let sentences = segment_text("Pi is 3.14 roughly. Dr. Smith agrees. Done");
        assert_eq!(
            texts(&sentences),
            vec!["Pi is 3.14 roughly.", "Dr. Smith agrees.", "Done"]
        );
    }

    #[test]
    fn test_repeated_punctuation_and_closers() {
        let sentences = segment_text("Really?! \"Yes.\" Great");
        assert_eq!(texts(&sentences), vec!["Really?!", "\"Yes.\"", "Great"]);
    }

    #[test]
    fn test_fullwidth_punctuation() {
        let sentences = segment_text("你好。很高兴认识你！");
        assert_eq!(texts(&sentences), vec!["你好。", "很高兴认识你！"]);
    }

    #[test]
    fn test_newline_is_boundary() {
        let sentences = segment_text("\n\nFirst point\nSecond point");
        assert_eq!(texts(&sentences), vec!["First point", "Second point"]);
    }

    #[test]
    fn test_length_ceiling_prefers_whitespace() {
        let mut segmenter = SentenceSegmenter::with_max_chars(10);
        let sentences = segmenter.feed("alpha beta gamma delta");

        assert_eq!(texts(&sentences), vec!["alpha", "beta", "gamma"]);
        assert_eq!(segmenter.buffered(), "delta");
    }

    #[test]
    fn test_length_ceiling_without_whitespace() {
        let mut segmenter = SentenceSegmenter::with_max_chars(4);
        let sentences = segmenter.feed("abcdefghij");

        assert_eq!(texts(&sentences), vec!["abcd", "efgh"]);
        assert_eq!(segmenter.buffered(), "ij");
    }

    #[test]
    fn test_concatenation_invariant_holds_at_every_step() {
        let fragments = [
            "Well", ", that's", " a good question! I", " think", " the answer is 4.",
            "5 percent", ". Isn't it?", "\nMaybe", " not…", " ok",
        ];
        let mut segmenter = SentenceSegmenter::with_max_chars(16);
        let mut emitted = String::new();
        let mut fed = String::new();

        for fragment in fragments {
            fed.push_str(fragment);
            for sentence in segmenter.feed(fragment) {
                emitted.push_str(&sentence.raw);
            }
            assert_eq!(format!("{}{}", emitted, segmenter.buffered()), fed);
        }

        if let Some(last) = segmenter.flush() {
            emitted.push_str(&last.raw);
        }
        assert_eq!(emitted, fed);
        assert!(segmenter.buffered().is_empty());
    }

    #[test]
    fn test_flush_is_idempotent() {
        let mut segmenter = SentenceSegmenter::new();
        segmenter.feed("trailing words");

        assert!(segmenter.flush().is_some());
        assert!(segmenter.flush().is_none());
        assert!(SentenceSegmenter::new().flush().is_none());
    }

    #[test]
    fn test_indices_are_sequential() {
        let sentences = segment_text("One. Two. Three. Four");
        for (i, sentence) in sentences.iter().enumerate() {
            assert_eq!(sentence.index, i);
        }
    }

    #[test]
    fn test_feed_each_matches_feed() {
        let mut a = SentenceSegmenter::new();
        let mut b = SentenceSegmenter::new();
        let mut collected = Vec::new();

        b.feed_each("One. Two. Thr", |s| collected.push(s));
        assert_eq!(a.feed("One. Two. Thr"), collected);
    }

    #[test]
    fn test_reset() {
        let mut segmenter = SentenceSegmenter::new();
        segmenter.feed("One. Two");

        segmenter.reset();

        assert_eq!(segmenter.next_index(), 0);
        assert!(segmenter.buffered().is_empty());
    }
}
