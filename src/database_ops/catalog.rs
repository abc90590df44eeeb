//! Postgres-backed catalog stores. Table layout: `migrations/0001_catalog_tables.sql`.

use anyhow::Result;
use sqlx::{Executor, Postgres, QueryBuilder, Row};
use tracing::{debug, instrument};

use super::db::Db;
use super::stores::{
    CategoryRecord, CategoryStore, ProductAttributes, ProductCategoryLink, ProductCategoryStore,
    ProductStore,
};

#[async_trait::async_trait]
impl CategoryStore for Db {
    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<CategoryRecord>> {
        let rows = sqlx::query("SELECT id, name FROM categories ORDER BY id")
            .persistent(false)
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            out.push(CategoryRecord {
                id: r.try_get("id")?,
                name: r.try_get("name")?,
            });
        }
        debug!(count = out.len(), "fetched category corpus");
        Ok(out)
    }
}

#[async_trait::async_trait]
impl ProductStore for Db {
    #[instrument(skip(self, attributes))]
    async fn upsert(&self, name: &str, attributes: &ProductAttributes) -> Result<i64> {
        let rec = sqlx::query(
            "INSERT INTO products (name, price, original_price, measurement_unit, stock_unit, \
                stock_quantity, description, badge, badge_color, rating, reviews) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11) \
             ON CONFLICT (name) DO UPDATE SET \
                price=EXCLUDED.price, \
                original_price=EXCLUDED.original_price, \
                measurement_unit=EXCLUDED.measurement_unit, \
                stock_unit=EXCLUDED.stock_unit, \
                stock_quantity=EXCLUDED.stock_quantity, \
                description=EXCLUDED.description, \
                badge=EXCLUDED.badge, \
                badge_color=EXCLUDED.badge_color, \
                rating=EXCLUDED.rating, \
                reviews=EXCLUDED.reviews, \
                updated_at=now() \
             RETURNING id",
        )
        .persistent(false)
        .bind(name)
        .bind(attributes.price)
        .bind(attributes.original_price)
        .bind(attributes.measurement_unit.as_str())
        .bind(attributes.stock_unit.as_str())
        .bind(attributes.stock_quantity)
        .bind(attributes.description.as_deref())
        .bind(attributes.badge.as_deref())
        .bind(attributes.badge_color.as_deref())
        .bind(attributes.rating)
        .bind(attributes.reviews)
        .fetch_one(&self.pool)
        .await?;
        Ok(rec.try_get("id")?)
    }
}

const DELETE_LINKS: &str = "DELETE FROM product_categories WHERE product_id=$1";

/// One multi-row statement, so a failure leaves no partial link set behind.
/// Pairs already present are skipped, which keeps a re-insert after a failed
/// delete from tripping the primary key.
fn link_insert(links: &[ProductCategoryLink]) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("INSERT INTO product_categories (product_id, category_id) ");
    qb.push_values(links, |mut b, l| {
        b.push_bind(l.product_id).push_bind(l.category_id);
    });
    qb.push(" ON CONFLICT (product_id, category_id) DO NOTHING");
    qb
}

#[async_trait::async_trait]
impl ProductCategoryStore for Db {
    #[instrument(skip(self))]
    async fn delete_by_product(&self, product_id: i64) -> Result<()> {
        sqlx::query(DELETE_LINKS)
            .persistent(false)
            .bind(product_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, links), fields(count = links.len()))]
    async fn insert_many(&self, links: &[ProductCategoryLink]) -> Result<()> {
        if links.is_empty() {
            return Ok(());
        }
        link_insert(links)
            .build()
            .persistent(false)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // Delete and insert share one transaction. The delete runs under a savepoint so
    // its failure can be rolled back alone and the insert still goes ahead. A failed
    // insert drops the transaction and the previous links stay intact.
    #[instrument(skip(self, links), fields(count = links.len()))]
    async fn replace_for_product(
        &self,
        product_id: i64,
        links: &[ProductCategoryLink],
    ) -> Result<Option<String>> {
        let mut tx = self.pool.begin().await?;

        (&mut *tx).execute(sqlx::raw_sql("SAVEPOINT clear_links")).await?;
        let deleted = sqlx::query(DELETE_LINKS)
            .persistent(false)
            .bind(product_id)
            .execute(&mut *tx)
            .await;
        let stale = match deleted {
            Ok(done) => {
                (&mut *tx).execute(sqlx::raw_sql("RELEASE SAVEPOINT clear_links"))
                    .await?;
                debug!(removed = done.rows_affected(), "cleared previous links");
                None
            }
            Err(e) => {
                (&mut *tx).execute(sqlx::raw_sql("ROLLBACK TO SAVEPOINT clear_links"))
                    .await?;
                Some(e.to_string())
            }
        };

        if !links.is_empty() {
            link_insert(links)
                .build()
                .persistent(false)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(stale)
    }
}
