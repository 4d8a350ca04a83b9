//! Tokenization of text fields.

use unicode_segmentation::UnicodeSegmentation;

/// Splits text field values into index terms.
pub trait Tokenizer: Send + Sync {
    /// Tokenizer name, for diagnostics.
    fn name(&self) -> &str;

    /// Split `text` into terms.
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// Default tokenizer for log lines: Unicode word boundaries, lowercased.
///
/// Punctuation-only runs produce no terms, so a line like
/// `GET /api/users?id=42` yields `get`, `api`, `users`, `id`, `42`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTokenizer;

impl Tokenizer for LogTokenizer {
    fn name(&self) -> &str {
        "log"
    }

    fn tokenize(&self, text: &str) -> Vec<String> {
        text.unicode_words().map(|w| w.to_lowercase()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_line_tokens() {
        let tokenizer = LogTokenizer;
        let tokens = tokenizer.tokenize("GET /api/users?id=42 HTTP/1.1 200");
        assert_eq!(tokens, ["get", "api", "users", "id", "42", "http", "1.1", "200"]);
    }

    #[test]
    fn test_lowercase_and_unicode() {
        let tokenizer = LogTokenizer;
        assert_eq!(tokenizer.tokenize("Grüße, WORLD"), ["grüße", "world"]);
    }

    #[test]
    fn test_empty_and_punctuation_only() {
        let tokenizer = LogTokenizer;
        assert!(tokenizer.tokenize("").is_empty());
        assert!(tokenizer.tokenize("--- !!! ...").is_empty());
    }
}
