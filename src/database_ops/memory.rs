//! In-process catalog store. Backs the CLI dry-run mode and the pipeline tests;
//! individual operations can be forced to fail to exercise error paths.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{bail, Result};

use super::stores::{
    CategoryRecord, CategoryStore, ProductAttributes, ProductCategoryLink, ProductCategoryStore,
    ProductStore,
};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredProduct {
    pub id: i64,
    pub name: String,
    pub attributes: ProductAttributes,
}

#[derive(Debug, Default)]
struct State {
    categories: Vec<CategoryRecord>,
    products: HashMap<String, StoredProduct>,
    links: BTreeSet<ProductCategoryLink>,
    next_product_id: i64,
    upsert_calls: usize,
    fail_list: bool,
    fail_upsert: HashSet<String>,
    fail_delete: bool,
    fail_insert: bool,
}

#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: Mutex<State>,
}

impl MemoryCatalog {
    pub fn new(categories: Vec<CategoryRecord>) -> Self {
        Self {
            state: Mutex::new(State {
                categories,
                next_product_id: 1,
                ..State::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fail_list(&self, on: bool) {
        self.state().fail_list = on;
    }

    /// Make upserts of this exact product name fail.
    pub fn fail_upsert_for(&self, name: &str) {
        self.state().fail_upsert.insert(name.to_string());
    }

    pub fn fail_delete(&self, on: bool) {
        self.state().fail_delete = on;
    }

    pub fn fail_insert(&self, on: bool) {
        self.state().fail_insert = on;
    }

    /// Seed an association directly, e.g. to simulate links left by an earlier import.
    pub fn seed_link(&self, product_id: i64, category_id: i64) {
        self.state().links.insert(ProductCategoryLink {
            product_id,
            category_id,
        });
    }

    pub fn product(&self, name: &str) -> Option<StoredProduct> {
        self.state().products.get(name).cloned()
    }

    pub fn product_count(&self) -> usize {
        self.state().products.len()
    }

    pub fn upsert_calls(&self) -> usize {
        self.state().upsert_calls
    }

    /// Category ids linked to a product, ascending.
    pub fn categories_of(&self, product_id: i64) -> Vec<i64> {
        self.state()
            .links
            .iter()
            .filter(|l| l.product_id == product_id)
            .map(|l| l.category_id)
            .collect()
    }

    pub fn link_count(&self) -> usize {
        self.state().links.len()
    }
}

#[async_trait::async_trait]
impl CategoryStore for MemoryCatalog {
    async fn list(&self) -> Result<Vec<CategoryRecord>> {
        let state = self.state();
        if state.fail_list {
            bail!("category listing unavailable");
        }
        Ok(state.categories.clone())
    }
}

#[async_trait::async_trait]
impl ProductStore for MemoryCatalog {
    async fn upsert(&self, name: &str, attributes: &ProductAttributes) -> Result<i64> {
        let mut state = self.state();
        state.upsert_calls += 1;
        if state.fail_upsert.contains(name) {
            bail!("upsert rejected for {name}");
        }
        if let Some(existing) = state.products.get_mut(name) {
            existing.attributes = attributes.clone();
            return Ok(existing.id);
        }
        let id = state.next_product_id;
        state.next_product_id += 1;
        state.products.insert(
            name.to_string(),
            StoredProduct {
                id,
                name: name.to_string(),
                attributes: attributes.clone(),
            },
        );
        Ok(id)
    }
}

#[async_trait::async_trait]
impl ProductCategoryStore for MemoryCatalog {
    async fn delete_by_product(&self, product_id: i64) -> Result<()> {
        let mut state = self.state();
        if state.fail_delete {
            bail!("delete rejected for product {product_id}");
        }
        state.links.retain(|l| l.product_id != product_id);
        Ok(())
    }

    async fn insert_many(&self, links: &[ProductCategoryLink]) -> Result<()> {
        let mut state = self.state();
        if state.fail_insert {
            bail!("insert rejected for {} links", links.len());
        }
        // set semantics: an existing pair is kept as is
        state.links.extend(links.iter().copied());
        Ok(())
    }
}
