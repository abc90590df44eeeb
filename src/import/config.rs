use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::resolver::Badge;
use crate::normalization::similarity::MIN_SIMILARITY;
use crate::util::env::{env_opt, env_parse};

/// Tunables for one import run. Plain data so callers (and tests) can build it
/// directly with fixture corpora.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Fuzzy matches must score strictly above this value.
    pub similarity_threshold: f64,
    /// Reference badge list, in tie-break order.
    pub badges: Vec<Badge>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: MIN_SIMILARITY,
            badges: default_badges(),
        }
    }
}

impl ImportConfig {
    /// Reads `IMPORT_FUZZY_THRESHOLD` and `IMPORT_BADGES_FILE`.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self {
            similarity_threshold: env_parse("IMPORT_FUZZY_THRESHOLD", MIN_SIMILARITY),
            ..Self::default()
        };
        if let Some(path) = env_opt("IMPORT_BADGES_FILE") {
            cfg.badges = load_badges(Path::new(&path))?;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.similarity_threshold) {
            anyhow::bail!(
                "similarity threshold {} must be within [0, 1)",
                self.similarity_threshold
            );
        }
        Ok(())
    }
}

/// Load a badge corpus from a JSON array of `{ "name": .., "color": .. }` objects.
pub fn load_badges(path: &Path) -> Result<Vec<Badge>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading badge file {}", path.display()))?;
    let badges: Vec<Badge> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing badge file {}", path.display()))?;
    info!(count = badges.len(), file = %path.display(), "loaded badge corpus");
    Ok(badges)
}

pub fn default_badges() -> Vec<Badge> {
    [
        ("Best Seller", "#f59e0b"),
        ("New Arrival", "#10b981"),
        ("Limited Stock", "#ef4444"),
        ("Organic", "#22c55e"),
        ("Premium", "#8b5cf6"),
        ("On Sale", "#ec4899"),
        ("Imported", "#3b82f6"),
    ]
    .into_iter()
    .map(|(name, color)| Badge::new(name, color))
    .collect()
}
