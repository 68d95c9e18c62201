//! Structural analysis of message content
//!
//! Two leaf components feed everything above them:
//! - [`ContentAnalyzer`] pulls code blocks, paragraphs, Markdown structure and
//!   per-language likelihoods out of raw text
//! - [`TokenEstimator`] prices text in heuristic tokens, weighting code heavily
//!
//! The regular expressions both rely on live in [`Patterns`], compiled once at
//! startup and shared by reference.

mod structure;
mod tokens;

pub use structure::{ContentAnalyzer, ContentStructure};
pub use tokens::{estimate_tokens, TokenClass, TokenEstimator};

use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Fenced code span, non-greedy across lines
const CODE_BLOCK_PATTERN: &str = r"(?s)```.*?```";
const HEADER_PATTERN: &str = r"(?m)^#{1,6}\s.+$";
const LIST_PATTERN: &str = r"(?m)^[ \t]*[-*+]\s.+$";
const LINK_PATTERN: &str = r"\[([^\]]+)\]\(([^)]+)\)";
const WORD_PATTERN: &str = r"\b\w+\b";
const PARAGRAPH_BREAK_PATTERN: &str = r"\n[ \t]*\n";
/// Runs of Latin or CJK terminal punctuation plus trailing whitespace
const SENTENCE_BREAK_PATTERN: &str = r"[.。!！?？;；]+\s*";

/// Declarations that mark content as source code
const CODE_FEATURE_PATTERN: &str =
    r"\b(class|function|def|public|private|interface|impl|async|await|import|export)\s+\w+";

const SQL_FEATURE_PATTERN: &str = r"(?i)\b(SELECT|INSERT INTO|UPDATE|DELETE FROM|CREATE TABLE|ALTER TABLE|DROP TABLE|JOIN|WHERE|GROUP BY|ORDER BY|VALUES|SET|FROM|INTO|CRUD|MySQL|SQL)\b";

/// Language name and the declaration pattern counted toward its probability
const LANGUAGE_PATTERNS: &[(&str, &str)] = &[
    ("java", r"\b(class|interface|enum)\s+\w+"),
    ("python", r"\b(def|class)\s+\w+"),
    ("javascript", r"\b(function|class|const|let|var)\s+\w+"),
    ("sql", r"(?i)\b(SELECT|INSERT|UPDATE|DELETE)\b"),
];

/// Compiled pattern set shared by the analyzer, strategies and scorer
#[derive(Debug)]
pub struct Patterns {
    pub code_block: Regex,
    pub header: Regex,
    pub list_item: Regex,
    pub link: Regex,
    pub word: Regex,
    pub paragraph_break: Regex,
    pub sentence_break: Regex,
    pub code_feature: Regex,
    pub sql_feature: Regex,
    pub languages: Vec<(String, Regex)>,
}

impl Patterns {
    pub fn compile() -> Result<Self, AnalysisError> {
        let languages = LANGUAGE_PATTERNS
            .iter()
            .map(|(name, pattern)| Ok((name.to_string(), Regex::new(pattern)?)))
            .collect::<Result<Vec<_>, AnalysisError>>()?;

        Ok(Self {
            code_block: Regex::new(CODE_BLOCK_PATTERN)?,
            header: Regex::new(HEADER_PATTERN)?,
            list_item: Regex::new(LIST_PATTERN)?,
            link: Regex::new(LINK_PATTERN)?,
            word: Regex::new(WORD_PATTERN)?,
            paragraph_break: Regex::new(PARAGRAPH_BREAK_PATTERN)?,
            sentence_break: Regex::new(SENTENCE_BREAK_PATTERN)?,
            code_feature: Regex::new(CODE_FEATURE_PATTERN)?,
            sql_feature: Regex::new(SQL_FEATURE_PATTERN)?,
            languages,
        })
    }

    /// Whether the text declares code constructs (classes, functions, imports...)
    pub fn has_code_features(&self, text: &str) -> bool {
        self.code_feature.is_match(text)
    }

    /// Whether the text talks about or contains SQL
    pub fn has_sql_features(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        if lower.contains("sql") || lower.contains("crud") || lower.contains("数据库") {
            return true;
        }
        self.sql_feature.is_match(text)
    }

    /// Word-boundary tokens in document order
    pub fn words<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.word.find_iter(text).map(|m| m.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_compile() {
        let patterns = Patterns::compile().unwrap();
        assert_eq!(patterns.languages.len(), 4);
    }

    #[test]
    fn test_code_features() {
        let patterns = Patterns::compile().unwrap();
        assert!(patterns.has_code_features("public class Test { }"));
        assert!(patterns.has_code_features("async function load() {}"));
        assert!(!patterns.has_code_features("What a lovely day"));
    }

    #[test]
    fn test_sql_features() {
        let patterns = Patterns::compile().unwrap();
        assert!(patterns.has_sql_features("select id from users where id = 1"));
        assert!(patterns.has_sql_features("Help me with MySQL indexes"));
        assert!(patterns.has_sql_features("优化数据库"));
        assert!(!patterns.has_sql_features("Tell me a joke about cats"));
    }
}
