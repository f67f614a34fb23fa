//! Sentence sink (spec.md §4.9, C9). Consumes a lazy, possibly-infinite
//! sequence of token strings and produces a lazy sequence of
//! whitespace-trimmed sentences, splitting at the first occurrence of
//! `([.!?])(whitespace|newline|end-of-input)`, the punctuation staying with
//! the preceding sentence.

use regex::Regex;

pub struct SentenceSink {
    buffer: String,
    boundary: Regex,
}

impl SentenceSink {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            // `$` only matches true end-of-input against a buffer we treat as
            // the whole remaining text, not per-line, so `(?m)` is not used.
            boundary: Regex::new(r"([.!?])([\s\n]|$)").unwrap(),
        }
    }

    /// Appends `token` and returns every sentence that became complete as a
    /// result (zero, one, or more).
    pub fn push_token(&mut self, token: &str) -> Vec<String> {
        self.buffer.push_str(token);
        let mut sentences = Vec::new();

        loop {
            let Some(m) = self.boundary.find(&self.buffer) else {
                break;
            };
            let end = m.end();
            let sentence = self.buffer[..end].trim().to_string();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            self.buffer = self.buffer[end..].to_string();
        }

        sentences
    }

    /// Yields the trimmed tail on upstream termination, iff non-empty.
    /// Clears internal state so the sink is restartable for a new stream.
    pub fn flush(&mut self) -> Option<String> {
        let tail = self.buffer.trim().to_string();
        self.buffer.clear();
        if tail.is_empty() {
            None
        } else {
            Some(tail)
        }
    }
}

impl Default for SentenceSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_punctuation_plus_whitespace() {
        let mut sink = SentenceSink::new();
        let mut out = Vec::new();
        for token in ["Hi", "!", " How", " are you?"] {
            out.extend(sink.push_token(token));
        }
        out.extend(sink.flush());
        assert_eq!(out, vec!["Hi!".to_string(), "How are you?".to_string()]);
    }

    #[test]
    fn tail_only_yielded_if_nonempty() {
        let mut sink = SentenceSink::new();
        assert!(sink.push_token("no terminator here").is_empty());
        assert_eq!(sink.flush(), Some("no terminator here".to_string()));

        let mut empty_sink = SentenceSink::new();
        assert_eq!(empty_sink.flush(), None);
    }

    #[test]
    fn restartable_after_flush() {
        let mut sink = SentenceSink::new();
        sink.push_token("First.");
        sink.flush();
        let out = sink.push_token("Second.");
        assert_eq!(out, vec!["Second.".to_string()]);
    }

    #[test]
    fn empty_sentences_suppressed() {
        let mut sink = SentenceSink::new();
        let out = sink.push_token(". . !");
        assert!(!out.contains(&String::new()));
    }
}
