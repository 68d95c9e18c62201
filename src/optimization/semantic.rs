//! Extractive sentence-ranking compressor
//!
//! Sentences are scored on three signals: how much of the document's
//! vocabulary they carry, whether they open or close the text, and whether
//! their length is in a useful range. The best ones are kept under a
//! whitespace-token budget and re-emitted in document order.

use crate::analysis::Patterns;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const KEYWORD_WEIGHT: f64 = 0.5;
const POSITION_WEIGHT: f64 = 0.3;
const LENGTH_WEIGHT: f64 = 0.2;

/// Words this short carry no signal
const STOP_WORD_MAX_LEN: usize = 2;

/// A sentence with its document position and importance score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSentence {
    pub index: usize,
    pub text: String,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct SemanticCompressor {
    patterns: Arc<Patterns>,
}

impl SemanticCompressor {
    pub fn new(patterns: Arc<Patterns>) -> Self {
        Self { patterns }
    }

    /// Keep the most important sentences within `max_tokens` whitespace tokens.
    ///
    /// Text without any sentence is returned unchanged. The result is empty when
    /// even the top sentence exceeds the budget.
    pub fn compress(&self, content: &str, max_tokens: usize) -> String {
        let sentences = self.split_sentences(content);
        if sentences.is_empty() {
            return content.to_string();
        }

        let scored = self.score_sentences(&sentences);
        let selected = select_within_budget(scored, max_tokens);

        debug!(
            original = sentences.len(),
            selected = selected.len(),
            "Semantic compression finished"
        );

        selected
            .into_iter()
            .map(|s| s.text)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn split_sentences(&self, content: &str) -> Vec<String> {
        self.patterns
            .sentence_break
            .split(content)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn score_sentences(&self, sentences: &[String]) -> Vec<ScoredSentence> {
        let frequencies = self.keyword_frequencies(sentences);
        let total = sentences.len();

        sentences
            .iter()
            .enumerate()
            .map(|(index, sentence)| {
                let score = self.keyword_frequency(sentence, &frequencies) * KEYWORD_WEIGHT
                    + position_weight(index, total) * POSITION_WEIGHT
                    + length_weight(sentence) * LENGTH_WEIGHT;
                ScoredSentence {
                    index,
                    text: sentence.clone(),
                    score,
                }
            })
            .collect()
    }

    fn keyword_frequencies(&self, sentences: &[String]) -> HashMap<String, usize> {
        let mut frequencies = HashMap::new();
        for sentence in sentences {
            let lower = sentence.to_lowercase();
            for word in self.patterns.words(&lower) {
                if !is_stop_word(word) {
                    *frequencies.entry(word.to_string()).or_insert(0) += 1;
                }
            }
        }
        frequencies
    }

    /// Mean corpus frequency of the sentence's words; stop words add nothing
    /// but still count toward the denominator
    fn keyword_frequency(&self, sentence: &str, frequencies: &HashMap<String, usize>) -> f64 {
        let lower = sentence.to_lowercase();
        let words = self.patterns.words(&lower);
        if words.is_empty() {
            return 0.0;
        }

        let total: usize = words
            .iter()
            .filter(|w| !is_stop_word(w))
            .map(|w| frequencies.get(*w).copied().unwrap_or(0))
            .sum();

        total as f64 / words.len() as f64
    }
}

fn is_stop_word(word: &str) -> bool {
    word.chars().count() <= STOP_WORD_MAX_LEN
}

fn position_weight(index: usize, total: usize) -> f64 {
    if index == 0 || index + 1 == total {
        1.0
    } else {
        0.5
    }
}

fn length_weight(sentence: &str) -> f64 {
    match sentence.chars().count() {
        n if n < 10 => 0.3,
        n if n > 100 => 0.7,
        _ => 1.0,
    }
}

fn whitespace_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Greedy by descending score (ties keep document order), stopping at the first
/// sentence that does not fit, then restored to document order
fn select_within_budget(mut scored: Vec<ScoredSentence>, max_tokens: usize) -> Vec<ScoredSentence> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut selected = Vec::new();
    let mut used = 0;
    for sentence in scored {
        let tokens = whitespace_tokens(&sentence.text);
        if used + tokens > max_tokens {
            break;
        }
        used += tokens;
        selected.push(sentence);
    }

    selected.sort_by_key(|s| s.index);
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compressor() -> SemanticCompressor {
        SemanticCompressor::new(Arc::new(Patterns::compile().unwrap()))
    }

    const ARTICLE: &str = "Rust programs compile to fast native code. \
        The borrow checker prevents data races at compile time! \
        Many teams adopt Rust for services. \
        Is the learning curve steep? \
        Rust tooling like cargo makes builds and tests simple; \
        Overall Rust code is fast and safe.";

    #[test]
    fn test_split_sentences_handles_cjk() {
        let sentences = compressor().split_sentences("第一句。第二句！Third one?? Fourth; ");
        assert_eq!(sentences, vec!["第一句", "第二句", "Third one", "Fourth"]);
    }

    #[test]
    fn test_split_drops_empty_fragments() {
        assert!(compressor().split_sentences("...!!  ").is_empty());
    }

    #[test]
    fn test_scores_follow_weights() {
        let sentences = vec![
            "alpha beta".to_string(),
            "gamma delta epsilon zeta".to_string(),
            "alpha omega".to_string(),
        ];
        let scored = compressor().score_sentences(&sentences);

        // "alpha" appears twice in the corpus: (2 + 1) / 2 words
        let expected_first = 1.5 * KEYWORD_WEIGHT + 1.0 * POSITION_WEIGHT + 1.0 * LENGTH_WEIGHT;
        assert!((scored[0].score - expected_first).abs() < 1e-9);

        // middle sentence: every word once, position 0.5, length in range
        let expected_middle = 1.0 * KEYWORD_WEIGHT + 0.5 * POSITION_WEIGHT + 1.0 * LENGTH_WEIGHT;
        assert!((scored[1].score - expected_middle).abs() < 1e-9);
    }

    #[test]
    fn test_short_words_are_ignored() {
        let sentences = vec!["an ox is".to_string()];
        let scored = compressor().score_sentences(&sentences);
        // no keywords, single sentence is first and last, 8 chars is short
        let expected = 1.0 * POSITION_WEIGHT + 0.3 * LENGTH_WEIGHT;
        assert!((scored[0].score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_output_respects_budget_and_order() {
        let compressor = compressor();
        let sentences = compressor.split_sentences(ARTICLE);

        for budget in [8, 12, 20, 40] {
            let output = compressor.compress(ARTICLE, budget);
            assert!(whitespace_tokens(&output) <= budget, "budget {}", budget);

            // accepted sentences appear in document order
            let mut last = None;
            let mut rest = output.as_str();
            for (index, sentence) in sentences.iter().enumerate() {
                if let Some(pos) = rest.find(sentence.as_str()) {
                    assert!(last.map_or(true, |l| index > l));
                    last = Some(index);
                    rest = &rest[pos + sentence.len()..];
                }
            }
        }
    }

    #[test]
    fn test_large_budget_keeps_everything() {
        let compressor = compressor();
        let output = compressor.compress(ARTICLE, 1000);
        let expected = compressor.split_sentences(ARTICLE).join(" ");
        assert_eq!(output, expected);
    }

    #[test]
    fn test_tiny_budget_yields_empty() {
        assert_eq!(compressor().compress(ARTICLE, 1), "");
    }

    #[test]
    fn test_stops_at_first_sentence_over_budget() {
        let scored = vec![
            ScoredSentence { index: 0, text: "one two three".into(), score: 3.0 },
            ScoredSentence { index: 1, text: "four five six seven".into(), score: 2.0 },
            ScoredSentence { index: 2, text: "eight".into(), score: 1.0 },
        ];
        // second sentence would exceed the budget; the third is never considered
        let selected = select_within_budget(scored, 5);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].index, 0);
    }

    #[test]
    fn test_ties_keep_document_order() {
        let scored = vec![
            ScoredSentence { index: 0, text: "a b".into(), score: 1.0 },
            ScoredSentence { index: 1, text: "c d".into(), score: 1.0 },
            ScoredSentence { index: 2, text: "e f".into(), score: 1.0 },
        ];
        let selected = select_within_budget(scored, 4);
        let indices: Vec<_> = selected.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn test_text_without_sentences_is_unchanged() {
        assert_eq!(compressor().compress("", 10), "");
        assert_eq!(compressor().compress("?!", 10), "?!");
    }
}
