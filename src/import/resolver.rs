//! Entity resolution: free-text category and badge references to canonical entries,
//! exact match first, fuzzy match second.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::RowError;
use super::row::headers;
use crate::database_ops::stores::CategoryRecord;
use crate::normalization::similarity::{best_match, levenshtein_score, NameKey, Scorer};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub name: String,
    pub color: String,
}

impl Badge {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
        }
    }
}

/// Ordered reference entries plus an exact-lookup index on their normalized keys.
#[derive(Debug, Clone)]
struct Corpus<T> {
    entries: Vec<T>,
    keys: Vec<NameKey>,
    exact: HashMap<String, usize>,
}

impl<T> Corpus<T> {
    fn new(entries: Vec<T>, name_of: impl Fn(&T) -> &str) -> Self {
        let keys: Vec<NameKey> = entries.iter().map(|e| NameKey::new(name_of(e))).collect();
        let mut exact = HashMap::with_capacity(keys.len());
        for (idx, key) in keys.iter().enumerate() {
            // first occurrence wins for names that normalize identically
            exact.entry(key.normalized().to_string()).or_insert(idx);
        }
        Self { entries, keys, exact }
    }

    fn lookup(&self, candidate: &NameKey, threshold: f64, scorer: Scorer) -> Option<Lookup<'_, T>> {
        if let Some(&idx) = self.exact.get(candidate.normalized()) {
            return Some(Lookup {
                entry: &self.entries[idx],
                fuzzy: false,
            });
        }
        let (idx, score) = best_match(candidate, &self.keys, threshold, scorer)?;
        debug!(
            candidate = candidate.normalized(),
            matched = self.keys[idx].normalized(),
            score,
            "fuzzy match accepted"
        );
        Some(Lookup {
            entry: &self.entries[idx],
            fuzzy: true,
        })
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

struct Lookup<'a, T> {
    entry: &'a T,
    fuzzy: bool,
}

/// Read-only category and badge corpora captured once per batch.
#[derive(Debug, Clone)]
pub struct CorpusSnapshot {
    categories: Corpus<CategoryRecord>,
    badges: Corpus<Badge>,
}

impl CorpusSnapshot {
    pub fn new(categories: Vec<CategoryRecord>, badges: Vec<Badge>) -> Self {
        Self {
            categories: Corpus::new(categories, |c| c.name.as_str()),
            badges: Corpus::new(badges, |b| b.name.as_str()),
        }
    }

    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    pub fn badge_count(&self) -> usize {
        self.badges.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryResolution {
    /// Distinct category ids in first-resolved order.
    pub ids: Vec<i64>,
    pub notes: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BadgeResolution {
    pub badge: Option<String>,
    pub color: Option<String>,
    pub note: Option<String>,
}

pub struct EntityResolver {
    snapshot: CorpusSnapshot,
    threshold: f64,
    scorer: Scorer,
}

impl EntityResolver {
    pub fn new(snapshot: CorpusSnapshot, threshold: f64) -> Self {
        Self::with_scorer(snapshot, threshold, levenshtein_score)
    }

    pub fn with_scorer(snapshot: CorpusSnapshot, threshold: f64, scorer: Scorer) -> Self {
        Self {
            snapshot,
            threshold,
            scorer,
        }
    }

    /// Resolve a comma-separated category list. Unmatched names are skipped with a
    /// warning; the row only fails when nothing resolves.
    pub fn resolve_categories(&self, text: &str) -> Result<CategoryResolution, RowError> {
        let candidates: Vec<&str> = text
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect();
        if candidates.is_empty() {
            return Err(RowError::validation(headers::CATEGORY, "no category names"));
        }

        let mut out = CategoryResolution::default();
        for candidate in candidates {
            let key = NameKey::new(candidate);
            match self
                .snapshot
                .categories
                .lookup(&key, self.threshold, self.scorer)
            {
                Some(hit) => {
                    if hit.fuzzy {
                        out.notes
                            .push(format!("auto-corrected {candidate} → {}", hit.entry.name));
                    }
                    if !out.ids.contains(&hit.entry.id) {
                        out.ids.push(hit.entry.id);
                    }
                }
                None => {
                    warn!(category = candidate, "category not found; skipping");
                    out.warnings
                        .push(format!("category \"{candidate}\" not found; skipped"));
                }
            }
        }

        if out.ids.is_empty() {
            return Err(RowError::Resolution {
                message: format!("no categories resolved from \"{text}\""),
            });
        }
        Ok(out)
    }

    /// Canonical badges carry their color; anything else is kept as custom text.
    pub fn resolve_badge(&self, text: Option<&str>) -> BadgeResolution {
        let Some(raw) = text.map(str::trim).filter(|t| !t.is_empty()) else {
            return BadgeResolution::default();
        };
        let key = NameKey::new(raw);
        match self.snapshot.badges.lookup(&key, self.threshold, self.scorer) {
            Some(hit) => BadgeResolution {
                badge: Some(hit.entry.name.clone()),
                color: Some(hit.entry.color.clone()),
                note: hit
                    .fuzzy
                    .then(|| format!("auto-corrected {raw} → {}", hit.entry.name)),
            },
            None => BadgeResolution {
                badge: Some(raw.to_string()),
                color: None,
                note: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::config::default_badges;

    fn cat(id: i64, name: &str) -> CategoryRecord {
        CategoryRecord {
            id,
            name: name.to_string(),
        }
    }

    fn resolver() -> EntityResolver {
        let categories = vec![
            cat(1, "Premium Nuts"),
            cat(2, "Dried Fruits"),
            cat(3, "Dark Chocolate"),
            cat(4, "Imported Chocolate"),
            cat(5, "Lindts"),
        ];
        EntityResolver::new(CorpusSnapshot::new(categories, default_badges()), 0.80)
    }

    #[test]
    fn exact_match_is_case_insensitive_and_silent() {
        let res = resolver().resolve_categories("  premium NUTS ").unwrap();
        assert_eq!(res.ids, vec![1]);
        assert!(res.notes.is_empty());
        assert!(res.warnings.is_empty());
    }

    #[test]
    fn fuzzy_match_emits_correction_note() {
        let res = resolver().resolve_categories("Dried fruit").unwrap();
        assert_eq!(res.ids, vec![2]);
        assert_eq!(res.notes, vec!["auto-corrected Dried fruit → Dried Fruits"]);
    }

    #[test]
    fn multi_value_list_collapses_duplicate_ids() {
        let res = resolver()
            .resolve_categories("Dark Chocolate, Imported Chocolates, Lindt, Dark Chocolates")
            .unwrap();
        assert_eq!(res.ids, vec![3, 4, 5]);
        assert_eq!(res.notes.len(), 3);
    }

    #[test]
    fn unmatched_candidate_is_skipped_with_warning() {
        let res = resolver().resolve_categories("Premium Nuts, Kitchenware").unwrap();
        assert_eq!(res.ids, vec![1]);
        assert_eq!(res.warnings.len(), 1);
        assert!(res.warnings[0].contains("Kitchenware"));
    }

    #[test]
    fn nothing_resolved_is_a_resolution_failure() {
        let err = resolver().resolve_categories("Kitchenware, Garden").unwrap_err();
        assert!(matches!(err, RowError::Resolution { .. }));
    }

    #[test]
    fn only_separators_is_a_validation_failure() {
        let err = resolver().resolve_categories(" , ,").unwrap_err();
        assert!(matches!(err, RowError::Validation { .. }));
    }

    #[test]
    fn fuzzy_resolution_is_deterministic() {
        let r = resolver();
        let first = r.resolve_categories("Imported Chocolates").unwrap();
        for _ in 0..20 {
            assert_eq!(r.resolve_categories("Imported Chocolates").unwrap(), first);
        }
    }

    #[test]
    fn threshold_is_strictly_greater_than() {
        fn fixed(a: &str, _b: &str) -> f64 {
            if a == "at" { 0.80 } else { 0.81 }
        }
        let snapshot = CorpusSnapshot::new(vec![cat(9, "Target")], Vec::new());
        let r = EntityResolver::with_scorer(snapshot, 0.80, fixed);
        assert!(r.resolve_categories("at").is_err());
        assert_eq!(r.resolve_categories("above").unwrap().ids, vec![9]);
    }

    #[test]
    fn equal_scores_pick_first_corpus_entry() {
        fn flat(_a: &str, _b: &str) -> f64 {
            0.9
        }
        let snapshot = CorpusSnapshot::new(vec![cat(7, "B"), cat(6, "A")], Vec::new());
        let r = EntityResolver::with_scorer(snapshot, 0.80, flat);
        assert_eq!(r.resolve_categories("zzz").unwrap().ids, vec![7]);
    }

    #[test]
    fn canonical_badge_carries_color() {
        let res = resolver().resolve_badge(Some("best seller"));
        assert_eq!(res.badge.as_deref(), Some("Best Seller"));
        assert_eq!(res.color.as_deref(), Some("#f59e0b"));
        assert_eq!(res.note, None);
    }

    #[test]
    fn fuzzy_badge_is_corrected() {
        let res = resolver().resolve_badge(Some("Best Sellers"));
        assert_eq!(res.badge.as_deref(), Some("Best Seller"));
        assert!(res.note.unwrap().contains("Best Sellers → Best Seller"));
    }

    #[test]
    fn unknown_badge_is_kept_as_custom_text() {
        let res = resolver().resolve_badge(Some(" Chef's Choice "));
        assert_eq!(res.badge.as_deref(), Some("Chef's Choice"));
        assert_eq!(res.color, None);
    }

    #[test]
    fn empty_badge_is_null() {
        assert_eq!(resolver().resolve_badge(Some("  ")), BadgeResolution::default());
        assert_eq!(resolver().resolve_badge(None), BadgeResolution::default());
    }
}
