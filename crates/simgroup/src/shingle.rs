//! Character n-gram shingling of flattened documents.

use crate::flatten::join_values;
use serde_json::Value;
use std::collections::HashSet;

/// Default shingle length in characters.
pub const DEFAULT_NGRAM_SIZE: usize = 2;

/// Separator placed between flattened values before shingling.
///
/// Shingles straddle value boundaries, so this is part of what gets compared.
pub const VALUE_SEPARATOR: &str = " ";

/// Slice `text` into every contiguous run of `n` characters.
///
/// Works on Unicode scalar values, not bytes. Returns an empty sequence when
/// `n` is zero or the text is shorter than `n`.
#[must_use]
pub fn shingles(text: &str, n: usize) -> Vec<String> {
    if n == 0 {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < n {
        return Vec::new();
    }
    chars.windows(n).map(|w| w.iter().collect()).collect()
}

/// Tokenize a document into ordered n-gram shingles.
#[must_use]
pub fn tokenize(document: &Value, n: usize) -> Vec<String> {
    shingles(&join_values(document, VALUE_SEPARATOR), n)
}

/// Tokenize a document into its set of distinct shingles.
#[must_use]
pub fn shingle_set(document: &Value, n: usize) -> HashSet<String> {
    tokenize(document, n).into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_shingles_basic() {
        assert_eq!(shingles("abcd", 2), vec!["ab", "bc", "cd"]);
        assert_eq!(shingles("abcd", 3), vec!["abc", "bcd"]);
    }

    #[test]
    fn test_shingles_count() {
        for len in 0..20 {
            let text = "x".repeat(len);
            assert_eq!(shingles(&text, 2).len(), len.saturating_sub(1));
        }
    }

    #[test]
    fn test_shingles_short_text() {
        assert!(shingles("a", 2).is_empty());
        assert!(shingles("", 2).is_empty());
        assert!(shingles("abc", 0).is_empty());
    }

    #[test]
    fn test_shingles_multibyte() {
        // Each kana is one character even though it is three UTF-8 bytes.
        assert_eq!(shingles("こんにち", 2), vec!["こん", "んに", "にち"]);
    }

    #[test]
    fn test_tokenize_spans_value_boundaries() {
        let doc = json!({"a": "ab", "b": "cd"});
        assert_eq!(tokenize(&doc, 2), vec!["ab", "b ", " c", "cd"]);
    }

    #[test]
    fn test_tokenize_hello_world() {
        let doc = json!({"a": "hello world"});
        let tokens = tokenize(&doc, 2);
        assert_eq!(tokens.len(), 10);
        assert_eq!(tokens.first().map(String::as_str), Some("he"));
        assert_eq!(tokens.last().map(String::as_str), Some("ld"));
    }

    #[test]
    fn test_shingle_set_dedups() {
        let doc = json!("aaaa");
        assert_eq!(tokenize(&doc, 2).len(), 3);
        assert_eq!(shingle_set(&doc, 2).len(), 1);
    }
}
