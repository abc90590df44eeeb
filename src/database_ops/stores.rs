//! Store seams consumed by the import pipeline. The Postgres implementation lives in
//! `catalog`, the in-process one in `memory`.

use anyhow::Result;
use serde::Serialize;

use crate::import::row::Unit;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryRecord {
    pub id: i64,
    pub name: String,
}

/// Mutable product columns; the name is the upsert key and travels separately.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductAttributes {
    pub price: f64,
    pub original_price: Option<f64>,
    pub measurement_unit: Unit,
    pub stock_unit: Unit,
    pub stock_quantity: i64,
    pub description: Option<String>,
    pub badge: Option<String>,
    pub badge_color: Option<String>,
    pub rating: Option<f64>,
    pub reviews: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ProductCategoryLink {
    pub product_id: i64,
    pub category_id: i64,
}

#[async_trait::async_trait]
pub trait CategoryStore: Send + Sync {
    /// Full category corpus in a stable order (fuzzy tie-breaks depend on it).
    async fn list(&self) -> Result<Vec<CategoryRecord>>;
}

#[async_trait::async_trait]
pub trait ProductStore: Send + Sync {
    /// Insert or update keyed on the exact product name; returns the product id.
    async fn upsert(&self, name: &str, attributes: &ProductAttributes) -> Result<i64>;
}

#[async_trait::async_trait]
pub trait ProductCategoryStore: Send + Sync {
    async fn delete_by_product(&self, product_id: i64) -> Result<()>;

    /// Pairs that already exist are left alone.
    async fn insert_many(&self, links: &[ProductCategoryLink]) -> Result<()>;

    /// Replace every link of `product_id` with `links`.
    ///
    /// A failed delete does not stop the insert: its reason comes back as
    /// `Ok(Some(..))` and the old links may remain. Only a failed insert is an `Err`.
    /// The default issues the two calls independently; stores with transactions
    /// override it.
    async fn replace_for_product(
        &self,
        product_id: i64,
        links: &[ProductCategoryLink],
    ) -> Result<Option<String>> {
        let stale = match self.delete_by_product(product_id).await {
            Ok(()) => None,
            Err(e) => Some(format!("{e:#}")),
        };
        self.insert_many(links).await?;
        Ok(stale)
    }
}
