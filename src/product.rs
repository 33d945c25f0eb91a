use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{InventoryError, Result};

/// Sentinel category filter value meaning "no category restriction"
pub const ALL_CATEGORIES: &str = "all";

/// Unique product identifier
///
/// Milliseconds since the Unix epoch at creation, bumped past the last issued
/// id when several products are created within the same millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub u64);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Product category
///
/// The four known categories plus whatever free text a spreadsheet import
/// carried in. Serialized as its display label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    FoodStuff,
    Snacks,
    Mobile,
    Clothes,
    Other(String),
}

impl Category {
    /// The fixed categories offered when adding a single product
    pub const KNOWN: [Category; 4] = [
        Category::FoodStuff,
        Category::Snacks,
        Category::Mobile,
        Category::Clothes,
    ];

    /// Parse one of the fixed category labels (exact, case-sensitive)
    pub fn known(label: &str) -> Option<Category> {
        Category::KNOWN
            .into_iter()
            .find(|category| category.label() == label)
    }

    pub fn label(&self) -> &str {
        match self {
            Category::FoodStuff => "Food Stuff",
            Category::Snacks => "Snacks",
            Category::Mobile => "Mobile",
            Category::Clothes => "Clothes",
            Category::Other(label) => label.as_str(),
        }
    }
}

impl From<String> for Category {
    fn from(label: String) -> Self {
        Category::known(&label).unwrap_or(Category::Other(label))
    }
}

impl From<&str> for Category {
    fn from(label: &str) -> Self {
        Category::from(label.to_string())
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        match category {
            Category::Other(label) => label,
            known => known.label().to_string(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A product held in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub item_name: String,
    pub price: f64,
    pub quantity: u32,
    pub category: Category,
}

/// What a scanned product code decodes to
#[derive(Debug, Serialize)]
struct QrPayload<'a> {
    name: &'a str,
    quantity: u32,
    category: &'a str,
}

impl Product {
    /// JSON string encoded into the product's QR code
    ///
    /// # Examples
    /// ```
    /// use inventory::product::{Category, Product, ProductId};
    ///
    /// let rice = Product {
    ///     id: ProductId(1),
    ///     item_name: "Rice".to_string(),
    ///     price: 2000.0,
    ///     quantity: 10,
    ///     category: Category::FoodStuff,
    /// };
    /// assert_eq!(
    ///     rice.qr_payload().unwrap(),
    ///     r#"{"name":"Rice","quantity":10,"category":"Food Stuff"}"#
    /// );
    /// ```
    pub fn qr_payload(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(&QrPayload {
            name: &self.item_name,
            quantity: self.quantity,
            category: self.category.label(),
        })
    }
}

/// Add-product form as submitted by the user
///
/// Fields arrive as raw text; [`ProductForm::validate`] turns them into typed
/// values. Absent fields deserialize to empty strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProductForm {
    pub item_name: String,
    pub price: String,
    pub quantity: String,
    pub category: String,
}

/// A fully validated product that has not been assigned an id yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub item_name: String,
    pub price: f64,
    pub quantity: u32,
    pub category: Category,
}

impl NewProduct {
    pub(crate) fn with_id(self, id: ProductId) -> Product {
        Product {
            id,
            item_name: self.item_name,
            price: self.price,
            quantity: self.quantity,
            category: self.category,
        }
    }
}

impl ProductForm {
    pub fn new(item_name: &str, price: &str, quantity: &str, category: &str) -> Self {
        ProductForm {
            item_name: item_name.to_string(),
            price: price.to_string(),
            quantity: quantity.to_string(),
            category: category.to_string(),
        }
    }

    /// Check every field and report all offending ones at once
    pub fn validate(&self) -> Result<NewProduct> {
        let mut invalid = Vec::new();

        let item_name = self.item_name.trim();
        if item_name.is_empty() {
            invalid.push("itemName");
        }

        let price = parse_number(&self.price).filter(|p| *p >= 0.0);
        if price.is_none() {
            invalid.push("price");
        }

        let quantity = parse_number(&self.quantity)
            .filter(|q| *q >= 0.0 && q.fract() == 0.0 && *q <= u32::MAX as f64)
            .map(|q| q as u32);
        if quantity.is_none() {
            invalid.push("quantity");
        }

        let category = Category::known(self.category.trim());
        if category.is_none() {
            invalid.push("category");
        }

        match (price, quantity, category) {
            (Some(price), Some(quantity), Some(category)) if invalid.is_empty() => Ok(NewProduct {
                item_name: item_name.to_string(),
                price,
                quantity,
                category,
            }),
            _ => Err(InventoryError::Validation(invalid)),
        }
    }
}

/// A spreadsheet row as decoded, before defaults are applied
///
/// Every field is optional: a row lacking a column is still admitted by a
/// batch import, see [`ImportRow::into_new_product`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRow {
    pub item_name: Option<String>,
    pub quantity: Option<String>,
    pub category: Option<String>,
}

impl ImportRow {
    pub fn new(item_name: &str, quantity: &str, category: &str) -> Self {
        ImportRow {
            item_name: Some(item_name.to_string()),
            quantity: Some(quantity.to_string()),
            category: Some(category.to_string()),
        }
    }

    /// Apply the import defaults
    ///
    /// Missing name and category become empty strings, a missing or
    /// non-numeric quantity becomes 0, fractional quantities truncate toward
    /// zero and negatives clamp to 0. Imported rows never carry a price.
    pub fn into_new_product(self) -> NewProduct {
        let quantity = self
            .quantity
            .as_deref()
            .and_then(parse_number)
            .map(|q| q.trunc().clamp(0.0, u32::MAX as f64) as u32)
            .unwrap_or(0);

        NewProduct {
            item_name: self.item_name.unwrap_or_default(),
            price: 0.0,
            quantity,
            category: Category::from(self.category.unwrap_or_default()),
        }
    }
}

/// Parse a numeric form or cell value; empty, NaN and infinite values are `None`
fn parse_number(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Category and search restrictions applied by a listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductFilter {
    /// Exact category label; `None` or [`ALL_CATEGORIES`] disables the check
    pub category: Option<String>,
    /// Case-insensitive substring of the item name
    pub search: Option<String>,
}

impl ProductFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn search(mut self, text: &str) -> Self {
        self.search = Some(text.to_string());
        self
    }

    /// The active category restriction, if any
    pub fn category_restriction(&self) -> Option<&str> {
        self.category
            .as_deref()
            .filter(|c| *c != ALL_CATEGORIES)
    }
}
