//! Persists one resolved row: product upsert, then category-link reconciliation.

use tracing::{debug, warn};

use super::error::RowError;
use super::resolver::BadgeResolution;
use super::row::NormalizedRow;
use crate::database_ops::stores::{
    ProductAttributes, ProductCategoryLink, ProductCategoryStore, ProductStore,
};

pub struct UpsertCoordinator<'a> {
    products: &'a dyn ProductStore,
    links: &'a dyn ProductCategoryStore,
}

impl<'a> UpsertCoordinator<'a> {
    pub fn new(products: &'a dyn ProductStore, links: &'a dyn ProductCategoryStore) -> Self {
        Self { products, links }
    }

    /// All-or-nothing insert-or-update keyed on the product name.
    pub async fn upsert_product(
        &self,
        row: &NormalizedRow,
        badge: &BadgeResolution,
    ) -> Result<i64, RowError> {
        let attributes = product_attributes(row, badge);
        let id = self
            .products
            .upsert(&row.name, &attributes)
            .await
            .map_err(|e| RowError::ProductPersistence {
                message: format!("{e:#}"),
            })?;
        debug!(product = %row.name, product_id = id, "product upserted");
        Ok(id)
    }

    /// Replace the product's links with exactly `category_ids`.
    ///
    /// A failed delete is logged and returned as a warning; the insert still runs.
    /// A failed insert is reported as [`RowError::LinkPersistence`]: the product is
    /// saved but its links were not reconciled.
    pub async fn reconcile_categories(
        &self,
        product_id: i64,
        category_ids: &[i64],
    ) -> Result<Option<String>, RowError> {
        let mut links: Vec<ProductCategoryLink> = category_ids
            .iter()
            .map(|&category_id| ProductCategoryLink {
                product_id,
                category_id,
            })
            .collect();
        links.sort_unstable();
        links.dedup();

        let stale = self
            .links
            .replace_for_product(product_id, &links)
            .await
            .map_err(|e| RowError::LinkPersistence {
                product_id,
                message: format!("{e:#}"),
            })?;
        debug!(product_id, links = links.len(), "category links reconciled");
        Ok(stale.map(|reason| {
            warn!(product_id, error = %reason, "failed to clear old category links; continuing");
            format!("could not clear previous category links ({reason}); stale links may remain")
        }))
    }
}

fn product_attributes(row: &NormalizedRow, badge: &BadgeResolution) -> ProductAttributes {
    ProductAttributes {
        price: row.price,
        original_price: row.original_price,
        measurement_unit: row.measurement_unit,
        stock_unit: row.stock_unit,
        stock_quantity: row.stock_quantity,
        description: row.description.clone(),
        badge: badge.badge.clone(),
        badge_color: badge.color.clone(),
        rating: row.rating,
        reviews: row.reviews,
    }
}
