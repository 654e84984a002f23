use serde::{Deserialize, Serialize};

/// The house brand; reward products are drawn from it first.
pub const HOUSE_BRAND: &str = "Mokkalab";

/// Catalog product (e.g. a coffee or tea).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub brand: String,
    pub active: bool,
    pub created_at: i64,
}

/// Sellable variant of a product (grind/size), carrying price and stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: String,
    pub product_id: String,
    pub name: String,
    pub price_cents: i64,
    pub stock: i64,
    pub created_at: i64,
}

/// Data required to create a product (seeding and tests).
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProduct {
    pub name: String,
    pub brand: String,
    pub active: bool,
}

/// Data required to create a variant (seeding and tests).
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProductVariant {
    pub name: String,
    pub price_cents: i64,
    pub stock: i64,
}
