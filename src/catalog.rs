//! Catalog store
//!
//! Owns the in-memory product list and mirrors it to a [`Storage`] backend
//! after every mutation. The persisted copy is the durable source of truth
//! across sessions; the in-memory copy always reflects the last mutation, even
//! when the write that followed it failed.

use chrono::Utc;
use log::{debug, info, warn};
use std::collections::HashSet;

use crate::error::{InventoryError, Result};
use crate::product::{ImportRow, NewProduct, Product, ProductFilter, ProductForm, ProductId};
use crate::storage::{PRODUCTS_KEY, Storage};

/// Largest id the allocator hands out or a loaded catalog may hold
///
/// Ids stay exact when read back as JSON numbers by a browser client.
pub const MAX_PRODUCT_ID: u64 = (1 << 53) - 1;

/// Source of creation timestamps, in milliseconds since the Unix epoch
pub type Clock = fn() -> u64;

fn system_clock() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

pub struct CatalogStore<S: Storage> {
    storage: S,
    products: Vec<Product>,
    last_id: u64,
    clock: Clock,
}

impl<S: Storage> CatalogStore<S> {
    /// Load the persisted catalog, falling back to an empty one
    ///
    /// A missing key, a failed read and an undecodable payload all yield an
    /// empty catalog. None of them are errors.
    pub fn load(storage: S) -> Self {
        Self::load_with_clock(storage, system_clock)
    }

    /// Same as [`CatalogStore::load`] with an explicit id clock
    pub fn load_with_clock(storage: S, clock: Clock) -> Self {
        let products = match storage.get(PRODUCTS_KEY) {
            Ok(Some(payload)) => match serde_json::from_str::<Vec<Product>>(&payload) {
                Ok(products) => dedup_ids(drop_out_of_range(products)),
                Err(e) => {
                    warn!("stored catalog failed to decode, starting empty: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("could not read stored catalog, starting empty: {}", e);
                Vec::new()
            }
        };
        debug!("loaded {} products", products.len());

        let last_id = products.iter().map(|p| p.id.0).max().unwrap_or(0);
        CatalogStore {
            storage,
            products,
            last_id,
            clock,
        }
    }

    /// Every product in insertion order
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn get(&self, id: ProductId) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    /// Validate and append a single product
    ///
    /// # Errors
    /// * `Validation` naming each missing or invalid field; nothing changes
    /// * `Storage` if the write failed; the product is still in memory
    pub fn add(&mut self, form: &ProductForm) -> Result<Product> {
        let new_product = form.validate()?;
        let product = self.append(new_product)?;
        info!("added product {} ({})", product.id, product.item_name);
        self.persist()?;
        Ok(product)
    }

    /// Append one product per row with a single write
    ///
    /// Rows are never rejected; see [`ImportRow::into_new_product`] for the
    /// defaults applied to missing columns. An empty batch writes nothing.
    ///
    /// # Errors
    /// * `IdsExhausted` if the batch does not fit below [`MAX_PRODUCT_ID`];
    ///   nothing changes
    pub fn add_batch(&mut self, rows: Vec<ImportRow>) -> Result<Vec<Product>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let first = self.peek_id();
        if first > MAX_PRODUCT_ID || MAX_PRODUCT_ID - first < rows.len() as u64 - 1 {
            return Err(InventoryError::IdsExhausted);
        }

        let added = rows
            .into_iter()
            .map(|row| self.append(row.into_new_product()))
            .collect::<Result<Vec<Product>>>()?;
        info!("imported {} products", added.len());

        self.persist()?;
        Ok(added)
    }

    /// Remove the product with `id`; an unknown id is a no-op
    ///
    /// The catalog is written back either way.
    pub fn remove(&mut self, id: ProductId) -> Result<Option<Product>> {
        let removed = self
            .products
            .iter()
            .position(|p| p.id == id)
            .map(|index| self.products.remove(index));

        match &removed {
            Some(product) => info!("removed product {} ({})", product.id, product.item_name),
            None => debug!("remove: no product with id {}", id),
        }

        self.persist()?;
        Ok(removed)
    }

    /// Products matching `filter`, in insertion order
    ///
    /// The returned iterator is lazy and can be cloned to restart it.
    pub fn list<'a>(
        &'a self,
        filter: &ProductFilter,
    ) -> impl Iterator<Item = &'a Product> + Clone + use<'a, S> {
        let category = filter.category_restriction().map(str::to_string);
        let needle = filter.search.as_deref().map(str::to_lowercase);

        self.products.iter().filter(move |product| {
            category
                .as_deref()
                .is_none_or(|c| product.category.label() == c)
                && needle
                    .as_deref()
                    .is_none_or(|n| product.item_name.to_lowercase().contains(n))
        })
    }

    /// Replace the whole catalog with a restored snapshot
    ///
    /// # Errors
    /// * `Decode` if the snapshot repeats an id or holds one above
    ///   [`MAX_PRODUCT_ID`]; nothing changes
    pub fn replace_all(&mut self, products: Vec<Product>) -> Result<()> {
        if let Some(big) = products.iter().find(|p| p.id.0 > MAX_PRODUCT_ID) {
            return Err(InventoryError::Decode(format!(
                "snapshot product id {} is out of range",
                big.id
            )));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = products.iter().find(|p| !seen.insert(p.id)) {
            return Err(InventoryError::Decode(format!(
                "snapshot contains duplicate product id {}",
                dup.id
            )));
        }

        self.last_id = self
            .last_id
            .max(products.iter().map(|p| p.id.0).max().unwrap_or(0));
        self.products = products;
        info!("catalog replaced with {} products", self.products.len());

        self.persist()
    }

    fn append(&mut self, new_product: NewProduct) -> Result<Product> {
        let product = new_product.with_id(self.next_id()?);
        self.products.push(product.clone());
        Ok(product)
    }

    // Ids never repeat: a clock that stalls or goes backwards is bumped past
    // the last id handed out.
    fn peek_id(&self) -> u64 {
        (self.clock)().max(self.last_id.saturating_add(1))
    }

    fn next_id(&mut self) -> Result<ProductId> {
        let id = self.peek_id();
        if id > MAX_PRODUCT_ID {
            return Err(InventoryError::IdsExhausted);
        }
        self.last_id = id;
        Ok(ProductId(id))
    }

    fn persist(&self) -> Result<()> {
        let payload = serde_json::to_string(&self.products)
            .map_err(crate::storage::StorageError::from)?;

        self.storage.set(PRODUCTS_KEY, &payload).map_err(|e| {
            warn!("catalog write failed, memory and storage diverge: {}", e);
            InventoryError::from(e)
        })
    }
}

fn drop_out_of_range(products: Vec<Product>) -> Vec<Product> {
    let total = products.len();
    let kept: Vec<Product> = products
        .into_iter()
        .filter(|p| p.id.0 <= MAX_PRODUCT_ID)
        .collect();
    if kept.len() != total {
        warn!("dropped {} products with out-of-range ids", total - kept.len());
    }
    kept
}

fn dedup_ids(products: Vec<Product>) -> Vec<Product> {
    let mut seen = HashSet::new();
    let total = products.len();
    let unique: Vec<Product> = products.into_iter().filter(|p| seen.insert(p.id)).collect();
    if unique.len() != total {
        warn!("dropped {} products with duplicate ids", total - unique.len());
    }
    unique
}
