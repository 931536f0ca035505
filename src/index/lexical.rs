// Text normalization and tokenization shared by the lexical index, the
// query scorer and the near-duplicate detector.

use std::collections::BTreeSet;

/// Lowercased, punctuation-free, whitespace-collapsed form of a statement.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '\'' { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Distinct index tokens of a text, in sorted order. Single-character
/// tokens carry no signal for retrieval and are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = normalize(text);
    let set: BTreeSet<&str> = normalized
        .split_whitespace()
        .filter(|t| t.len() > 1)
        .collect();
    set.into_iter().map(String::from).collect()
}

/// Jaccard similarity of two token sets, used for near-duplicate folding.
pub fn token_set_similarity(a: &str, b: &str) -> f64 {
    let sa: BTreeSet<String> = tokenize(a).into_iter().collect();
    let sb: BTreeSet<String> = tokenize(b).into_iter().collect();

    if sa.is_empty() && sb.is_empty() {
        return 1.0;
    }
    if sa.is_empty() || sb.is_empty() {
        return 0.0;
    }

    let intersection = sa.intersection(&sb).count() as f64;
    let union = sa.union(&sb).count() as f64;
    intersection / union
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_punctuation() {
        assert_eq!(
            normalize("Revenue grew 12%, as expected."),
            "revenue grew 12 as expected"
        );
    }

    #[test]
    fn test_tokenize_dedupes_and_sorts() {
        assert_eq!(
            tokenize("Margins, margins, MARGINS held."),
            vec!["held", "margins"]
        );
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(token_set_similarity("guidance raised", "guidance raised"), 1.0);
        assert_eq!(token_set_similarity("guidance raised", "margins fell"), 0.0);
        let partial = token_set_similarity("guidance raised today", "guidance lowered today");
        assert!(partial > 0.0 && partial < 1.0);
    }
}
