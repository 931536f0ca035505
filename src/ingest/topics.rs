// Topic tagging for statements.
//
// Tagging is a pluggable classifier: the engine stores whatever tags the
// configured tagger emits and aggregates over them at query time, without
// assuming how tags are derived.

use std::collections::BTreeMap;

/// Assigns zero or more topic tags to a statement's text.
pub trait TopicTagger: Send + Sync {
    fn tags(&self, text: &str) -> Vec<String>;
}

/// Keyword-driven tagger: a tag applies when any of its keywords appears in
/// the normalized text. Ships with a small vocabulary of recurring
/// earnings-call themes; callers can supply their own map.
pub struct KeywordTagger {
    // BTreeMap keeps tag emission order stable across runs.
    keywords: BTreeMap<String, Vec<String>>,
}

impl KeywordTagger {
    pub fn new(keywords: BTreeMap<String, Vec<String>>) -> Self {
        Self { keywords }
    }
}

impl Default for KeywordTagger {
    fn default() -> Self {
        let mut keywords = BTreeMap::new();
        keywords.insert(
            "guidance".to_string(),
            vec!["guidance".into(), "outlook".into(), "forecast".into()],
        );
        keywords.insert(
            "margins".to_string(),
            vec!["margin".into(), "gross profit".into(), "operating profit".into()],
        );
        keywords.insert(
            "revenue".to_string(),
            vec!["revenue".into(), "top line".into(), "sales growth".into()],
        );
        keywords.insert(
            "capital".to_string(),
            vec!["buyback".into(), "dividend".into(), "capital allocation".into()],
        );
        keywords.insert(
            "headcount".to_string(),
            vec!["headcount".into(), "hiring".into(), "layoff".into()],
        );
        Self { keywords }
    }
}

impl TopicTagger for KeywordTagger {
    fn tags(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        self.keywords
            .iter()
            .filter(|(_, words)| words.iter().any(|w| lower.contains(w.as_str())))
            .map(|(tag, _)| tag.clone())
            .collect()
    }
}

/// Tagger that never emits tags, for corpora where topic views are unused.
pub struct NoopTagger;

impl TopicTagger for NoopTagger {
    fn tags(&self, _text: &str) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_tagger_matches() {
        let tagger = KeywordTagger::default();
        let tags = tagger.tags("We are raising full-year guidance on strong revenue.");
        assert!(tags.contains(&"guidance".to_string()));
        assert!(tags.contains(&"revenue".to_string()));
    }

    #[test]
    fn test_keyword_tagger_no_match() {
        let tagger = KeywordTagger::default();
        assert!(tagger.tags("Good morning everyone.").is_empty());
    }

    #[test]
    fn test_tag_order_is_stable() {
        let tagger = KeywordTagger::default();
        let a = tagger.tags("guidance and margin and revenue");
        let b = tagger.tags("guidance and margin and revenue");
        assert_eq!(a, b);
    }
}
