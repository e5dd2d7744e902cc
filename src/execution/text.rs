//! Post-processing of extracted text

use std::sync::LazyLock;

use regex::Regex;

use crate::models::ScrapeOptions;

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"));
static WHITESPACE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

#[derive(Debug, Clone, Copy, Default)]
pub struct TextProcessor;

impl TextProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Apply `removeHtml` then `maxLength`
    pub fn process(&self, text: &str, options: &ScrapeOptions) -> String {
        let mut processed = if options.remove_html {
            let stripped = TAG_PATTERN.replace_all(text, " ");
            WHITESPACE_PATTERN
                .replace_all(&stripped, " ")
                .trim()
                .to_string()
        } else {
            text.to_string()
        };

        if let Some(max) = options.max_length {
            processed = truncate_chars(&processed, max).to_string();
        }
        processed
    }

    pub fn word_count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }

    /// Keywords present in `text`, case-insensitively, in request order
    pub fn find_keywords(&self, text: &str, keywords: &[String]) -> Vec<String> {
        let haystack = text.to_lowercase();
        keywords
            .iter()
            .filter(|k| !k.is_empty() && haystack.contains(&k.to_lowercase()))
            .cloned()
            .collect()
    }
}

/// Prefix of at most `max` characters, never splitting a code point
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html_and_collapse_whitespace() {
        let options = ScrapeOptions {
            remove_html: true,
            ..ScrapeOptions::default()
        };
        let processed =
            TextProcessor::new().process("<p>Hello</p>\n\n  <b>world</b> !", &options);
        assert_eq!(processed, "Hello world !");
    }

    #[test]
    fn test_untouched_without_options() {
        let text = "<p>keep   me</p>";
        assert_eq!(TextProcessor::new().process(text, &ScrapeOptions::default()), text);
    }

    #[test]
    fn test_max_length_respects_char_boundaries() {
        let options = ScrapeOptions {
            max_length: Some(3),
            ..ScrapeOptions::default()
        };
        assert_eq!(TextProcessor::new().process("héllo", &options), "hél");
        assert_eq!(truncate_chars("ab", 10), "ab");
        assert_eq!(truncate_chars("日本語テキスト", 2), "日本");
    }

    #[test]
    fn test_word_count_and_keywords() {
        let processor = TextProcessor::new();
        assert_eq!(processor.word_count("  one two\tthree\n"), 3);
        assert_eq!(processor.word_count(""), 0);

        let keywords = vec!["Rust".to_string(), "python".to_string(), String::new()];
        assert_eq!(
            processor.find_keywords("We write rust daily", &keywords),
            vec!["Rust".to_string()]
        );
    }
}
