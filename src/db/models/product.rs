//! Catalog product models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Money;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub stock: i64,
    pub category: String,
    /// Ordered list of selectable sizes (stored as JSON text)
    #[sqlx(json)]
    pub size_options: Vec<String>,
    pub image_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<String>,
}

impl Product {
    pub fn offers_size(&self, size: &str) -> bool {
        self.size_options.iter().any(|s| s == size)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Money,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub size_options: Vec<String>,
    pub image_url: Option<String>,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub stock: Option<i64>,
    pub category: Option<String>,
    pub size_options: Option<Vec<String>>,
    pub image_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductListQuery {
    pub category: Option<String>,
}
