use strsim::normalized_levenshtein;

/// Minimum similarity score a fuzzy candidate must strictly exceed to be accepted
/// as a correction for a reference name.
pub const MIN_SIMILARITY: f64 = 0.80;

/// Scoring function used for fuzzy lookups. Inputs are already normalized.
pub type Scorer = fn(&str, &str) -> f64;

/// Canonicalized name used for exact and fuzzy comparison against reference corpora.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameKey {
    normalized: String,
}

impl NameKey {
    /// Build a comparison key from a raw label.
    ///
    /// Normalization steps:
    /// - trim surrounding whitespace
    /// - lowercase (Unicode aware, so "Épices" and "épices" compare equal)
    pub fn new(raw: &str) -> Self {
        Self {
            normalized: raw.trim().to_lowercase(),
        }
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    /// Normalized Levenshtein similarity in [0, 1] between two keys.
    pub fn similarity(&self, other: &Self) -> f64 {
        levenshtein_score(self.normalized(), other.normalized())
    }
}

/// Default scorer: 1.0 for identical strings, 0.0 for entirely different ones.
pub fn levenshtein_score(a: &str, b: &str) -> f64 {
    normalized_levenshtein(a, b)
}

/// Pick the best-scoring entry of `corpus` for `candidate`.
///
/// Ties keep the earliest entry, so the result depends only on the corpus order.
/// Returns `None` unless the best score is strictly greater than `threshold`.
pub fn best_match<'a, I>(
    candidate: &NameKey,
    corpus: I,
    threshold: f64,
    scorer: Scorer,
) -> Option<(usize, f64)>
where
    I: IntoIterator<Item = &'a NameKey>,
{
    let mut best: Option<(usize, f64)> = None;
    for (idx, key) in corpus.into_iter().enumerate() {
        let score = scorer(candidate.normalized(), key.normalized());
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((idx, score)),
        }
    }
    best.filter(|(_, score)| *score > threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> Vec<NameKey> {
        names.iter().map(|n| NameKey::new(n)).collect()
    }

    #[test]
    fn trims_and_lowercases() {
        let a = NameKey::new("  Dried Fruits ");
        let b = NameKey::new("dried fruits");
        assert_eq!(a, b);
        assert_eq!(a.similarity(&b), 1.0);
    }

    #[test]
    fn plural_typo_scores_above_threshold() {
        let a = NameKey::new("Dried fruit");
        let b = NameKey::new("Dried Fruits");
        assert!(a.similarity(&b) > MIN_SIMILARITY);
    }

    #[test]
    fn unrelated_names_fall_below_threshold() {
        let a = NameKey::new("Lindt");
        let b = NameKey::new("Premium Nuts");
        assert!(a.similarity(&b) < MIN_SIMILARITY);
    }

    #[test]
    fn ties_resolve_to_first_corpus_entry() {
        let corpus = keys(&["abcx", "abcy", "abcz"]);
        let hit = best_match(&NameKey::new("abcd"), &corpus, 0.5, levenshtein_score);
        assert_eq!(hit.map(|(idx, _)| idx), Some(0));
    }

    #[test]
    fn score_equal_to_threshold_is_rejected() {
        // one substitution over five chars: exactly 0.8
        let corpus = keys(&["abcde"]);
        let score = levenshtein_score("abcdx", "abcde");
        assert!((score - 0.8).abs() < f64::EPSILON);
        assert!(best_match(&NameKey::new("abcdx"), &corpus, 0.80, levenshtein_score).is_none());
    }

    #[test]
    fn empty_corpus_has_no_match() {
        let corpus: Vec<NameKey> = Vec::new();
        assert!(best_match(&NameKey::new("x"), &corpus, 0.0, levenshtein_score).is_none());
    }
}
