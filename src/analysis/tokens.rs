//! Heuristic token estimation
//!
//! Not a tokenizer: whitespace-delimited words are priced by class, with code
//! fragments counted double so that downstream selection prefers keeping code
//! verbatim.

/// Class a whitespace-delimited token falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    Code,
    Url,
    Numeric,
    Text,
}

impl TokenClass {
    pub fn of(token: &str) -> Self {
        if is_code(token) {
            TokenClass::Code
        } else if is_url(token) {
            TokenClass::Url
        } else if is_numeric(token) {
            TokenClass::Numeric
        } else {
            TokenClass::Text
        }
    }

    /// Weighted cost of a token of this class
    pub fn cost(self, token: &str) -> usize {
        let len = token.chars().count();
        match self {
            TokenClass::Code => len * 2,
            TokenClass::Url | TokenClass::Numeric => 1,
            TokenClass::Text => len,
        }
    }
}

/// Stateless estimator; a value type so it can be stored alongside other components
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenEstimator;

impl TokenEstimator {
    pub fn new() -> Self {
        Self
    }

    pub fn estimate(&self, text: &str) -> usize {
        estimate_tokens(text)
    }
}

/// Sum of per-token weighted costs
pub fn estimate_tokens(text: &str) -> usize {
    text.split_whitespace()
        .map(|token| TokenClass::of(token).cost(token))
        .sum()
}

fn is_code(token: &str) -> bool {
    token.contains(['{', '}', '(', ')', ';']) || token.starts_with("//")
}

fn is_url(token: &str) -> bool {
    token.starts_with("http://") || token.starts_with("https://")
}

fn is_numeric(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("   \n\t "), 0);
    }

    #[test]
    fn test_classification() {
        assert_eq!(TokenClass::of("foo();"), TokenClass::Code);
        assert_eq!(TokenClass::of("//note"), TokenClass::Code);
        assert_eq!(TokenClass::of("https://example.com"), TokenClass::Url);
        assert_eq!(TokenClass::of("2024"), TokenClass::Numeric);
        assert_eq!(TokenClass::of("hello"), TokenClass::Text);
    }

    #[test]
    fn test_weights() {
        // code 7*2 + url 1 + number 1 + text 5
        assert_eq!(estimate_tokens("print() https://a.io 42 hello"), 7 * 2 + 1 + 1 + 5);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        assert_eq!(estimate_tokens("数据库"), 3);
    }

    #[test]
    fn test_appending_never_decreases() {
        let seeds = ["a", "ab", "1", "12", "x(", "//", "abc1", "9a"];
        let suffixes = ["a", "1", "(", ";", "z9", "}"];

        for seed in seeds {
            for suffix in suffixes {
                let longer = format!("{}{}", seed, suffix);
                assert!(
                    estimate_tokens(&longer) >= estimate_tokens(seed),
                    "{} -> {}",
                    seed,
                    longer
                );
            }
        }
    }

    #[test]
    fn test_estimator_matches_free_function() {
        let text = "fn main() { println!(\"hi\"); }";
        assert_eq!(TokenEstimator::new().estimate(text), estimate_tokens(text));
    }
}
