//! Compression strategy implementations

use super::semantic::SemanticCompressor;
use super::StrategyKind;
use crate::analysis::ContentAnalyzer;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Only words longer than this survive keyword compression
const MIN_KEYWORD_LEN: usize = 3;

/// Strategy trait: a pure text reducer gated by an applicability check
pub trait CompressionStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> StrategyKind;
    fn is_applicable(&self, text: &str) -> bool;
    fn compress(&self, text: &str, max_tokens: usize) -> String;
}

/// Sentence-ranking compression for prose
pub struct SemanticStrategy {
    analyzer: Arc<ContentAnalyzer>,
    compressor: SemanticCompressor,
}

impl SemanticStrategy {
    pub fn new(analyzer: Arc<ContentAnalyzer>) -> Self {
        let compressor = SemanticCompressor::new(analyzer.shared_patterns());
        Self {
            analyzer,
            compressor,
        }
    }
}

impl CompressionStrategy for SemanticStrategy {
    fn name(&self) -> &str {
        StrategyKind::Semantic.as_str()
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Semantic
    }

    fn is_applicable(&self, text: &str) -> bool {
        !self.analyzer.analyze_structure(text).has_code_blocks()
    }

    fn compress(&self, text: &str, max_tokens: usize) -> String {
        self.compressor.compress(text, max_tokens)
    }
}

/// Keeps code blocks verbatim and reduces the prose around them to a keyword set
pub struct KeywordStrategy {
    analyzer: Arc<ContentAnalyzer>,
}

impl KeywordStrategy {
    pub fn new(analyzer: Arc<ContentAnalyzer>) -> Self {
        Self { analyzer }
    }
}

impl CompressionStrategy for KeywordStrategy {
    fn name(&self) -> &str {
        StrategyKind::Keyword.as_str()
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Keyword
    }

    fn is_applicable(&self, text: &str) -> bool {
        self.analyzer.analyze_structure(text).has_code_blocks()
    }

    // The keyword set is already minimal; the budget is not applied to code.
    fn compress(&self, text: &str, _max_tokens: usize) -> String {
        let structure = self.analyzer.analyze_structure(text);
        if let Some(reason) = structure.error {
            warn!(%reason, "Keyword compression skipped");
            return text.to_string();
        }

        let mut compressed = String::new();
        let mut prose = text.to_string();
        for block in &structure.code_blocks {
            compressed.push_str(block);
            compressed.push_str("\n\n");
            prose = prose.replace(block.as_str(), "");
        }

        let mut seen = HashSet::new();
        let keywords: Vec<&str> = self
            .analyzer
            .patterns()
            .words(&prose)
            .into_iter()
            .filter(|w| w.chars().count() > MIN_KEYWORD_LEN)
            .filter(|w| seen.insert(*w))
            .collect();

        compressed.push_str(&keywords.join(" "));
        compressed
    }
}

/// Drops repeated sentences, keeping the first occurrence
pub struct RedundancyStrategy;

impl RedundancyStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RedundancyStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressionStrategy for RedundancyStrategy {
    fn name(&self) -> &str {
        StrategyKind::Redundancy.as_str()
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Redundancy
    }

    fn is_applicable(&self, text: &str) -> bool {
        let sentences = split_keeping_terminators(text);
        let unique: HashSet<&str> = sentences.iter().copied().collect();
        unique.len() < sentences.len()
    }

    fn compress(&self, text: &str, _max_tokens: usize) -> String {
        let mut seen = HashSet::new();
        split_keeping_terminators(text)
            .into_iter()
            .filter(|s| seen.insert(*s))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '。' | '！' | '？')
}

/// Sentences end at a terminator run followed by whitespace or end of text;
/// the terminators stay attached
fn split_keeping_terminators(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !is_terminator(c) {
            continue;
        }
        let next = chars.peek().map(|(_, n)| *n);
        let boundary = match next {
            None => true,
            Some(n) => n.is_whitespace() || (!is_terminator(n) && !c.is_ascii()),
        };
        if boundary {
            let end = i + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Ordered strategy list; the first applicable strategy wins and semantic
/// compression is the fallback when none applies
pub struct StrategySet {
    ordered: Vec<Arc<dyn CompressionStrategy>>,
    fallback: Arc<dyn CompressionStrategy>,
}

impl StrategySet {
    pub fn new(
        ordered: Vec<Arc<dyn CompressionStrategy>>,
        fallback: Arc<dyn CompressionStrategy>,
    ) -> Self {
        Self { ordered, fallback }
    }

    /// Keyword, then semantic, then redundancy
    pub fn standard(analyzer: Arc<ContentAnalyzer>) -> Self {
        let semantic: Arc<dyn CompressionStrategy> =
            Arc::new(SemanticStrategy::new(analyzer.clone()));
        Self::new(
            vec![
                Arc::new(KeywordStrategy::new(analyzer)),
                semantic.clone(),
                Arc::new(RedundancyStrategy::new()),
            ],
            semantic,
        )
    }

    pub fn select(&self, text: &str) -> &dyn CompressionStrategy {
        let strategy = self
            .ordered
            .iter()
            .find(|s| s.is_applicable(text))
            .unwrap_or(&self.fallback);
        debug!(strategy = strategy.name(), "Selected compression strategy");
        strategy.as_ref()
    }

    pub fn get(&self, kind: StrategyKind) -> Option<&dyn CompressionStrategy> {
        self.ordered
            .iter()
            .chain(std::iter::once(&self.fallback))
            .find(|s| s.kind() == kind)
            .map(|s| s.as_ref())
    }
}
