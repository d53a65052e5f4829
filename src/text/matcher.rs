use std::collections::HashSet;

use regex::{Regex, RegexBuilder};

/// Whole-word, case-insensitive matcher over a fixed keyword list.
///
/// A keyword matches when it is bounded on both sides by a non-word character
/// or the edge of the text. Multi-word keywords match as a phrase, with any
/// run of whitespace between their words.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    patterns: Vec<(String, Regex)>,
}

impl KeywordMatcher {
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Self {
        let mut seen = HashSet::new();
        let mut patterns = Vec::with_capacity(keywords.len());

        for keyword in keywords {
            let keyword = keyword.as_ref().trim();
            if keyword.is_empty() || !seen.insert(keyword.to_lowercase()) {
                continue;
            }
            match build_pattern(keyword) {
                Ok(re) => patterns.push((keyword.to_string(), re)),
                Err(e) => tracing::warn!(keyword, error = %e, "Skipping keyword with unusable pattern"),
            }
        }

        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Returns the keywords found in `text`, in keyword-list order.
    pub fn find(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        self.patterns
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .map(|(keyword, _)| keyword.clone())
            .collect()
    }
}

pub fn match_keywords<S: AsRef<str>>(text: &str, keywords: &[S]) -> Vec<String> {
    KeywordMatcher::new(keywords).find(text)
}

fn build_pattern(keyword: &str) -> Result<Regex, regex::Error> {
    let phrase = keyword
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");
    RegexBuilder::new(&format!(r"(?:^|\W){phrase}(?:\W|$)"))
        .case_insensitive(true)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_word_boundaries() {
        let keywords = ["AI"];
        assert!(match_keywords("SAILS", &keywords).is_empty());
        assert!(match_keywords("PAID", &keywords).is_empty());
        assert_eq!(match_keywords("AI-powered search", &keywords), vec!["AI"]);
        assert_eq!(match_keywords("the AI model", &keywords), vec!["AI"]);
        assert_eq!(match_keywords("ai", &keywords), vec!["AI"]);
        assert_eq!(match_keywords("(AI)", &keywords), vec!["AI"]);
    }

    #[test]
    fn matches_follow_keyword_order() {
        let keywords = ["python", "AI", "tech"];
        assert_eq!(
            match_keywords("New AI tools for Python developers", &keywords),
            vec!["python", "AI"]
        );
    }

    #[test]
    fn each_keyword_contributes_once() {
        let keywords = ["AI", "ai", "Ai"];
        let matches = match_keywords("AI AI and more ai", &keywords);
        assert_eq!(matches, vec!["AI"]);
    }

    #[test]
    fn multi_word_phrase() {
        let keywords = ["artificial intelligence"];
        assert_eq!(
            match_keywords("Advances in Artificial  Intelligence research", &keywords),
            vec!["artificial intelligence"]
        );
        assert!(match_keywords("artificial intelligences", &keywords).is_empty());
        assert!(match_keywords("artificial sweeteners", &keywords).is_empty());
    }

    #[test]
    fn keywords_with_symbols_are_literal() {
        let keywords = ["C++", "node.js"];
        assert_eq!(match_keywords("Why C++ still matters", &keywords), vec!["C++"]);
        assert!(match_keywords("nodexjs", &keywords).is_empty());
        assert_eq!(match_keywords("Intro to Node.js.", &keywords), vec!["node.js"]);
    }

    #[test]
    fn unicode_keywords() {
        let keywords = ["искусственный"];
        assert_eq!(
            match_keywords("Искусственный интеллект", &keywords),
            vec!["искусственный"]
        );
        assert!(match_keywords("искусственныйинтеллект", &keywords).is_empty());
    }

    #[test]
    fn empty_inputs_yield_nothing() {
        let none: [&str; 0] = [];
        assert!(match_keywords("anything", &none).is_empty());
        assert!(match_keywords("", &["AI"]).is_empty());
        assert!(match_keywords("some text", &["", "   "]).is_empty());
        assert!(KeywordMatcher::new(&none).is_empty());
    }
}
