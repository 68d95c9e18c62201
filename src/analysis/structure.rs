//! Regex-driven content structure extraction

use super::Patterns;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Inputs larger than this are not scanned
const MAX_ANALYZED_BYTES: usize = 4 * 1024 * 1024;

/// Matches per language that count as certainty
const LANGUAGE_NORMALIZATION: f64 = 10.0;

/// Structure extracted from one piece of content
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContentStructure {
    pub code_blocks: Vec<String>,
    pub paragraphs: Vec<String>,
    pub language_probabilities: BTreeMap<String, f64>,
    pub headers: Vec<String>,
    pub lists: Vec<String>,
    pub links: Vec<String>,
    /// Set when analysis was abandoned; all other fields are then empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ContentStructure {
    fn failed(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn has_code_blocks(&self) -> bool {
        !self.code_blocks.is_empty()
    }

    /// Most likely language, if any pattern matched at all
    pub fn dominant_language(&self) -> Option<(&str, f64)> {
        self.language_probabilities
            .iter()
            .filter(|(_, p)| **p > 0.0)
            .fold(None, |best: Option<(&str, f64)>, (lang, p)| match best {
                Some((_, best_p)) if best_p >= *p => best,
                _ => Some((lang.as_str(), *p)),
            })
    }
}

/// Extracts code blocks, paragraphs, language likelihoods and Markdown structure
#[derive(Debug, Clone)]
pub struct ContentAnalyzer {
    patterns: Arc<Patterns>,
}

impl ContentAnalyzer {
    pub fn new(patterns: Arc<Patterns>) -> Self {
        Self { patterns }
    }

    pub fn patterns(&self) -> &Patterns {
        &self.patterns
    }

    pub fn shared_patterns(&self) -> Arc<Patterns> {
        Arc::clone(&self.patterns)
    }

    /// Analyze content. Never fails; oversized input yields a structure
    /// carrying only an error marker.
    pub fn analyze_structure(&self, content: &str) -> ContentStructure {
        if content.len() > MAX_ANALYZED_BYTES {
            warn!(
                bytes = content.len(),
                "Content too large for structure analysis"
            );
            return ContentStructure::failed(format!(
                "content of {} bytes exceeds the {} byte analysis limit",
                content.len(),
                MAX_ANALYZED_BYTES
            ));
        }

        let code_blocks = self.extract_code_blocks(content);
        let paragraphs = self.split_paragraphs(content, &code_blocks);
        let language_probabilities = self.detect_languages(content);

        let structure = ContentStructure {
            headers: collect_matches(&self.patterns.header, content),
            lists: collect_matches(&self.patterns.list_item, content),
            links: collect_matches(&self.patterns.link, content),
            code_blocks,
            paragraphs,
            language_probabilities,
            error: None,
        };

        debug!(
            code_blocks = structure.code_blocks.len(),
            paragraphs = structure.paragraphs.len(),
            "Content analysis completed"
        );

        structure
    }

    pub fn extract_code_blocks(&self, content: &str) -> Vec<String> {
        collect_matches(&self.patterns.code_block, content)
    }

    fn split_paragraphs(&self, content: &str, code_blocks: &[String]) -> Vec<String> {
        let mut prose = content.to_string();
        for block in code_blocks {
            prose = prose.replace(block.as_str(), "");
        }

        self.patterns
            .paragraph_break
            .split(&prose)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect()
    }

    fn detect_languages(&self, content: &str) -> BTreeMap<String, f64> {
        self.patterns
            .languages
            .iter()
            .map(|(name, pattern)| {
                let matches = pattern.find_iter(content).count() as f64;
                (name.clone(), (matches / LANGUAGE_NORMALIZATION).min(1.0))
            })
            .collect()
    }
}

fn collect_matches(pattern: &regex::Regex, content: &str) -> Vec<String> {
    pattern
        .find_iter(content)
        .map(|m| m.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> ContentAnalyzer {
        ContentAnalyzer::new(Arc::new(Patterns::compile().unwrap()))
    }

    #[test]
    fn test_extracts_code_blocks() {
        let text = "Intro\n\n```rust\nfn main() {}\n```\n\nOutro\n```py\ndef f(): pass\n```";
        let structure = analyzer().analyze_structure(text);

        assert_eq!(structure.code_blocks.len(), 2);
        assert!(structure.code_blocks[0].starts_with("```rust"));
        assert!(structure.code_blocks[1].ends_with("```"));
        assert!(structure.has_code_blocks());
    }

    #[test]
    fn test_paragraphs_exclude_code() {
        let text = "First paragraph.\n\n```\nlet x = 1;\n```\n\nSecond paragraph.\n  \nThird.";
        let structure = analyzer().analyze_structure(text);

        assert_eq!(
            structure.paragraphs,
            vec!["First paragraph.", "Second paragraph.", "Third."]
        );
    }

    #[test]
    fn test_language_probabilities_are_capped() {
        let text = "def a(): pass\n".repeat(15);
        let structure = analyzer().analyze_structure(&text);

        assert_eq!(structure.language_probabilities["python"], 1.0);
        assert_eq!(structure.language_probabilities["sql"], 0.0);
        assert_eq!(structure.dominant_language().map(|(l, _)| l), Some("python"));
    }

    #[test]
    fn test_language_probability_scales_with_matches() {
        let structure = analyzer().analyze_structure("SELECT a FROM t; DELETE FROM t;");
        assert!((structure.language_probabilities["sql"] - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_markdown_structure() {
        let text = "# Title\n\nSome text with a [link](https://example.com).\n\n- one\n  * two\n+ three\n## Sub";
        let structure = analyzer().analyze_structure(text);

        assert_eq!(structure.headers, vec!["# Title", "## Sub"]);
        assert_eq!(structure.lists.len(), 3);
        assert_eq!(structure.links, vec!["[link](https://example.com)"]);
        assert!(structure.error.is_none());
    }

    #[test]
    fn test_plain_text_has_no_structure() {
        let structure = analyzer().analyze_structure("just a sentence");
        assert!(!structure.has_code_blocks());
        assert!(structure.headers.is_empty());
        assert!(structure.dominant_language().is_none());
    }

    #[test]
    fn test_oversized_input_yields_error_marker() {
        let text = "a".repeat(MAX_ANALYZED_BYTES + 1);
        let structure = analyzer().analyze_structure(&text);

        assert!(structure.error.is_some());
        assert!(structure.code_blocks.is_empty());
        assert!(structure.paragraphs.is_empty());
    }
}
