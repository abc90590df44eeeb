//! Batch driver: rows go through normalize → resolve → upsert → reconcile strictly in
//! input order, one at a time. A failing row is recorded and the batch moves on.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::config::ImportConfig;
use super::error::{ErrorKind, RowError};
use super::resolver::{CorpusSnapshot, EntityResolver};
use super::row::{normalize_row, RawRow};
use super::upsert::UpsertCoordinator;
use crate::database_ops::stores::{CategoryStore, ProductCategoryStore, ProductStore};

/// Per-row pipeline stage. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStage {
    Parsing,
    Validating,
    ResolvingEntities,
    UpsertingProduct,
    ReconcilingCategories,
    Done,
    /// Failed while in the given stage.
    Failed(FailedAt),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedAt {
    Validating,
    ResolvingEntities,
    UpsertingProduct,
    ReconcilingCategories,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowOutcome {
    pub row: usize,
    pub stage: RowStage,
    pub product_id: Option<i64>,
    pub notes: Vec<String>,
    pub warnings: Vec<String>,
    pub error: Option<RowError>,
}

impl RowOutcome {
    fn new(row: usize) -> Self {
        Self {
            row,
            stage: RowStage::Parsing,
            product_id: None,
            notes: Vec::new(),
            warnings: Vec::new(),
            error: None,
        }
    }

    fn fail(mut self, at: FailedAt, error: RowError) -> Self {
        self.stage = RowStage::Failed(at);
        self.error = Some(error);
        self
    }

    pub fn is_success(&self) -> bool {
        self.stage == RowStage::Done
    }

    /// Product written but its category links were not.
    pub fn is_partial(&self) -> bool {
        self.error.as_ref().is_some_and(RowError::is_partial)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowMessage {
    pub row: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowErrorEntry {
    pub row: usize,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    FullSuccess,
    PartialSuccess,
    TotalFailure,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub success_count: usize,
    pub error_count: usize,
    pub partial_count: usize,
    pub errors: Vec<RowErrorEntry>,
    pub notes: Vec<RowMessage>,
    pub warnings: Vec<RowMessage>,
}

impl ImportReport {
    pub fn status(&self) -> ReportStatus {
        if self.error_count == 0 {
            ReportStatus::FullSuccess
        } else if self.success_count > 0 {
            ReportStatus::PartialSuccess
        } else {
            ReportStatus::TotalFailure
        }
    }

    pub fn record(&mut self, outcome: RowOutcome) {
        let row = outcome.row;
        self.notes
            .extend(outcome.notes.into_iter().map(|message| RowMessage { row, message }));
        self.warnings
            .extend(outcome.warnings.into_iter().map(|message| RowMessage { row, message }));
        match outcome.error {
            None => self.success_count += 1,
            Some(err) => {
                self.error_count += 1;
                if err.is_partial() {
                    self.partial_count += 1;
                }
                self.errors.push(RowErrorEntry {
                    row,
                    kind: err.kind(),
                    message: err.to_string(),
                });
            }
        }
    }
}

/// Runs one import batch against a fixed corpus snapshot.
pub struct BatchImporter<'a> {
    resolver: EntityResolver,
    coordinator: UpsertCoordinator<'a>,
}

impl<'a> BatchImporter<'a> {
    pub fn new(
        snapshot: CorpusSnapshot,
        config: &ImportConfig,
        products: &'a dyn ProductStore,
        links: &'a dyn ProductCategoryStore,
    ) -> Self {
        Self {
            resolver: EntityResolver::new(snapshot, config.similarity_threshold),
            coordinator: UpsertCoordinator::new(products, links),
        }
    }

    /// Fetch the category corpus once and pair it with the configured badges.
    pub async fn prepare(
        categories: &dyn CategoryStore,
        config: &ImportConfig,
        products: &'a dyn ProductStore,
        links: &'a dyn ProductCategoryStore,
    ) -> Result<Self> {
        let corpus = categories
            .list()
            .await
            .context("fetching category corpus")?;
        let snapshot = CorpusSnapshot::new(corpus, config.badges.clone());
        info!(
            categories = snapshot.category_count(),
            badges = snapshot.badge_count(),
            "corpus snapshot ready"
        );
        Ok(Self::new(snapshot, config, products, links))
    }

    pub async fn run<I>(&self, rows: I) -> ImportReport
    where
        I: IntoIterator<Item = RawRow>,
    {
        let mut report = ImportReport::default();
        for (idx, raw) in rows.into_iter().enumerate() {
            let outcome = self.process_row(idx + 1, &raw).await;
            report.record(outcome);
        }
        info!(
            success = report.success_count,
            errors = report.error_count,
            partial = report.partial_count,
            notes = report.notes.len(),
            status = ?report.status(),
            "import batch finished"
        );
        report
    }

    /// Drive a single row to a terminal stage. `row` is the 1-based input position.
    pub async fn process_row(&self, row: usize, raw: &RawRow) -> RowOutcome {
        let mut out = RowOutcome::new(row);

        out.stage = RowStage::Validating;
        let normalized = match normalize_row(raw) {
            Ok(n) => n,
            Err(e) => return finish(out.fail(FailedAt::Validating, e)),
        };

        out.stage = RowStage::ResolvingEntities;
        debug!(row, product = %normalized.name, "resolving entities");
        let categories = match self.resolver.resolve_categories(&normalized.category_text) {
            Ok(c) => c,
            Err(e) => return finish(out.fail(FailedAt::ResolvingEntities, e)),
        };
        out.notes.extend(categories.notes);
        out.warnings.extend(categories.warnings);
        let badge = self.resolver.resolve_badge(normalized.badge_text.as_deref());
        out.notes.extend(badge.note.clone());

        out.stage = RowStage::UpsertingProduct;
        let product_id = match self.coordinator.upsert_product(&normalized, &badge).await {
            Ok(id) => id,
            Err(e) => return finish(out.fail(FailedAt::UpsertingProduct, e)),
        };
        out.product_id = Some(product_id);

        out.stage = RowStage::ReconcilingCategories;
        match self
            .coordinator
            .reconcile_categories(product_id, &categories.ids)
            .await
        {
            Ok(stale) => {
                out.warnings.extend(stale);
                out.stage = RowStage::Done;
                finish(out)
            }
            Err(e) => finish(out.fail(FailedAt::ReconcilingCategories, e)),
        }
    }
}

fn finish(out: RowOutcome) -> RowOutcome {
    match &out.error {
        None => info!(row = out.row, product_id = ?out.product_id, "row imported"),
        Some(e) if e.is_partial() => {
            warn!(row = out.row, error = %e, "row partially imported; category links not reconciled")
        }
        Some(e) => warn!(row = out.row, stage = ?out.stage, error = %e, "row failed"),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::memory::MemoryCatalog;
    use crate::database_ops::stores::CategoryRecord;
    use crate::import::row::headers;

    fn corpus() -> Vec<CategoryRecord> {
        [
            (1, "Premium Nuts"),
            (2, "Dried Fruits"),
            (3, "Dark Chocolate"),
            (4, "Imported Chocolate"),
        ]
        .into_iter()
        .map(|(id, name)| CategoryRecord {
            id,
            name: name.to_string(),
        })
        .collect()
    }

    fn product(name: &str, category: &str, price: f64, qty: i64) -> RawRow {
        RawRow::new()
            .with(headers::PRODUCT_NAME, name)
            .with(headers::CATEGORY, category)
            .with(headers::OUR_PRICE, price)
            .with(headers::MEASUREMENT_UNIT, 0i64)
            .with(headers::STOCK_UNIT, 0i64)
            .with(headers::STOCK_QUANTITY, qty)
    }

    async fn importer(store: &MemoryCatalog) -> BatchImporter<'_> {
        BatchImporter::prepare(store, &ImportConfig::default(), store, store)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn almonds_import_cleanly() {
        let store = MemoryCatalog::new(corpus());
        let importer = importer(&store).await;
        let out = importer
            .process_row(1, &product("Almonds", "Premium Nuts", 450.0, 100))
            .await;
        assert_eq!(out.stage, RowStage::Done);
        assert!(out.notes.is_empty());
        assert_eq!(store.categories_of(out.product_id.unwrap()), vec![1]);
    }

    #[tokio::test]
    async fn apricot_is_auto_corrected() {
        let store = MemoryCatalog::new(corpus());
        let importer = importer(&store).await;
        let report = importer
            .run(vec![product("Organic Apricot", "Dried fruit", 600.0, 30)])
            .await;
        assert_eq!(report.status(), ReportStatus::FullSuccess);
        assert_eq!(
            report.notes,
            vec![RowMessage {
                row: 1,
                message: "auto-corrected Dried fruit → Dried Fruits".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn empty_category_never_reaches_the_store() {
        let store = MemoryCatalog::new(corpus());
        let importer = importer(&store).await;
        for blank in ["", "   ", " , "] {
            let out = importer
                .process_row(1, &product("Almonds", blank, 450.0, 1))
                .await;
            assert!(matches!(out.error, Some(RowError::Validation { .. })));
        }
        assert_eq!(store.upsert_calls(), 0);
    }

    #[tokio::test]
    async fn unresolvable_categories_fail_without_side_effects() {
        let store = MemoryCatalog::new(corpus());
        let importer = importer(&store).await;
        let out = importer
            .process_row(4, &product("Whisk", "Kitchenware", 12.0, 1))
            .await;
        assert_eq!(out.stage, RowStage::Failed(FailedAt::ResolvingEntities));
        assert_eq!(store.upsert_calls(), 0);
    }

    #[tokio::test]
    async fn continues_after_a_bad_row() {
        let store = MemoryCatalog::new(corpus());
        let importer = importer(&store).await;
        let report = importer
            .run(vec![
                product("Almonds", "Premium Nuts", 450.0, 100),
                product("  ", "Premium Nuts", 10.0, 1),
                product("Cashews", "Premium Nuts, Dried Fruits", 700.0, 5),
            ])
            .await;
        assert_eq!(report.success_count, 2);
        assert_eq!(report.error_count, 1);
        assert_eq!(report.errors[0].row, 2);
        assert_eq!(report.errors[0].kind, ErrorKind::Validation);
        assert_eq!(report.status(), ReportStatus::PartialSuccess);

        let almonds = store.product("Almonds").unwrap();
        let cashews = store.product("Cashews").unwrap();
        assert_eq!(store.categories_of(almonds.id), vec![1]);
        assert_eq!(store.categories_of(cashews.id), vec![1, 2]);
    }

    #[tokio::test]
    async fn repeated_import_is_idempotent() {
        let store = MemoryCatalog::new(corpus());
        let importer = importer(&store).await;
        let row = product("Almonds", "Premium Nuts, Dark Chocolate", 450.0, 100);
        let report = importer.run(vec![row.clone(), row]).await;
        assert_eq!(report.success_count, 2);
        assert_eq!(store.product_count(), 1);
        assert_eq!(store.link_count(), 2);
    }

    #[tokio::test]
    async fn later_row_relinks_same_product() {
        let store = MemoryCatalog::new(corpus());
        let importer = importer(&store).await;
        importer
            .run(vec![
                product("Almonds", "Premium Nuts", 450.0, 100),
                product("Almonds", "Dried Fruits", 460.0, 90),
            ])
            .await;
        let almonds = store.product("Almonds").unwrap();
        assert_eq!(almonds.attributes.price, 460.0);
        assert_eq!(store.categories_of(almonds.id), vec![2]);
    }

    #[tokio::test]
    async fn reimport_with_failed_delete_still_completes() {
        let store = MemoryCatalog::new(corpus());
        let importer = importer(&store).await;
        let row = product("Almonds", "Premium Nuts, Dried Fruits", 450.0, 100);
        let first = importer.process_row(1, &row).await;
        assert_eq!(first.stage, RowStage::Done);

        store.fail_delete(true);
        let again = importer.process_row(2, &row).await;
        assert_eq!(again.stage, RowStage::Done);
        assert!(again.error.is_none());
        assert_eq!(again.warnings.len(), 1);
        assert!(again.warnings[0].contains("stale links may remain"));
        assert_eq!(store.categories_of(again.product_id.unwrap()), vec![1, 2]);
    }

    #[tokio::test]
    async fn link_failure_is_reported_as_partial() {
        let store = MemoryCatalog::new(corpus());
        let importer = importer(&store).await;
        store.fail_insert(true);
        let report = importer
            .run(vec![product("Almonds", "Premium Nuts", 450.0, 100)])
            .await;
        assert_eq!(report.success_count, 0);
        assert_eq!(report.error_count, 1);
        assert_eq!(report.partial_count, 1);
        assert_eq!(report.errors[0].kind, ErrorKind::Partial);
        assert_eq!(report.status(), ReportStatus::TotalFailure);
        // the product itself was written
        assert!(store.product("Almonds").is_some());
    }

    #[tokio::test]
    async fn partial_outcome_differs_from_clean_failure() {
        let store = MemoryCatalog::new(corpus());
        let importer = importer(&store).await;

        store.fail_upsert_for("Pecans");
        let clean = importer
            .process_row(1, &product("Pecans", "Premium Nuts", 900.0, 1))
            .await;
        store.fail_insert(true);
        let partial = importer
            .process_row(2, &product("Almonds", "Premium Nuts", 450.0, 1))
            .await;

        assert_eq!(clean.stage, RowStage::Failed(FailedAt::UpsertingProduct));
        assert!(!clean.is_partial());
        assert_eq!(clean.product_id, None);
        assert_eq!(partial.stage, RowStage::Failed(FailedAt::ReconcilingCategories));
        assert!(partial.is_partial());
        assert!(partial.product_id.is_some());
    }

    #[tokio::test]
    async fn skipped_candidates_surface_as_warnings() {
        let store = MemoryCatalog::new(corpus());
        let importer = importer(&store).await;
        let report = importer
            .run(vec![product("Almonds", "Premium Nuts, Kitchenware", 450.0, 1)])
            .await;
        assert_eq!(report.success_count, 1);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].row, 1);
    }

    #[tokio::test]
    async fn corpus_fetch_failure_aborts_before_any_row() {
        let store = MemoryCatalog::new(corpus());
        store.fail_list(true);
        let res = BatchImporter::prepare(&store, &ImportConfig::default(), &store, &store).await;
        assert!(res.is_err());
    }

    #[test]
    fn empty_batch_counts_as_full_success() {
        assert_eq!(ImportReport::default().status(), ReportStatus::FullSuccess);
    }

    #[test]
    fn report_serializes_camel_case() {
        let mut report = ImportReport::default();
        report.record(RowOutcome::new(3).fail(
            FailedAt::Validating,
            RowError::validation(headers::OUR_PRICE, "missing price"),
        ));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["errorCount"], 1);
        assert_eq!(json["errors"][0]["row"], 3);
        assert_eq!(json["errors"][0]["kind"], "validation");
        assert_eq!(json["errors"][0]["message"], "Our Price: missing price");
    }
}
