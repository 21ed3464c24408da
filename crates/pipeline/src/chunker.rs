//! Token-budget text chunking
//!
//! Splits long text into pieces that fit an LLM context window. Sentences
//! are packed greedily; a sentence that alone exceeds the budget is packed
//! word by word, and completed word-level pieces merge back into the open
//! chunk when they still fit. The budget is a soft target at the
//! granularity of a single word: one word larger than the whole budget is
//! emitted as its own oversized chunk.

use regex_lite::Regex;
use tracing::debug;

/// Token counting abstraction used by the chunker
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Heuristic counter: roughly 4 characters per token
pub struct HeuristicTokenizer;

impl TokenCounter for HeuristicTokenizer {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

/// Sentence-aware greedy chunker
pub struct Chunker {
    budget: usize,
    counter: Box<dyn TokenCounter>,
    boundary: Regex,
}

impl Chunker {
    /// Create a chunker with the default heuristic token counter
    pub fn new(budget: usize) -> Self {
        Self::with_counter(budget, Box::new(HeuristicTokenizer))
    }

    pub fn with_counter(budget: usize, counter: Box<dyn TokenCounter>) -> Self {
        Self {
            budget,
            counter,
            boundary: Regex::new(r"([.!?]+)\s+").expect("valid sentence boundary pattern"),
        }
    }

    /// Split text into an ordered sequence of chunks, each within the
    /// token budget except single oversized words. Concatenating the
    /// chunks with single spaces reproduces the input up to whitespace
    /// normalization. Output is deterministic.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut current = String::new();

        for sentence in self.split_sentences(text) {
            if self.fits(&current, &sentence) {
                append(&mut current, &sentence);
                continue;
            }

            if self.counter.count(&sentence) <= self.budget {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                current = sentence;
                continue;
            }

            // Sentence alone exceeds the budget: recurse to word granularity
            for word in sentence.split_whitespace() {
                if self.fits(&current, word) {
                    append(&mut current, word);
                } else if current.is_empty() {
                    chunks.push(word.to_string());
                } else {
                    chunks.push(std::mem::take(&mut current));
                    if self.counter.count(word) <= self.budget {
                        current.push_str(word);
                    } else {
                        chunks.push(word.to_string());
                    }
                }
            }
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        debug!(
            input_len = text.len(),
            chunk_count = chunks.len(),
            budget = self.budget,
            "Text chunked"
        );

        chunks
    }

    /// Whether the candidate (current chunk + one separating space +
    /// piece) stays within the budget
    fn fits(&self, current: &str, piece: &str) -> bool {
        if current.is_empty() {
            self.counter.count(piece) <= self.budget
        } else {
            self.counter.count(&format!("{} {}", current, piece)) <= self.budget
        }
    }

    /// Split on punctuation-followed-by-whitespace boundaries,
    /// keeping the punctuation with its sentence
    fn split_sentences(&self, text: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut last = 0;

        for caps in self.boundary.captures_iter(text) {
            let punct = caps.get(1).expect("boundary pattern has one group");
            let whole = caps.get(0).expect("match exists");

            let sentence = text[last..punct.end()].trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            last = whole.end();
        }

        let tail = text[last..].trim();
        if !tail.is_empty() {
            sentences.push(tail.to_string());
        }

        sentences
    }
}

fn append(current: &mut String, piece: &str) {
    if !current.is_empty() {
        current.push(' ');
    }
    current.push_str(piece);
}
