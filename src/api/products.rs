use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::auth::AdminContext;
use super::error::{ApiError, ValidationErrorBuilder};
use super::extract::{ApiJson, ApiPath, ApiQuery};
use super::validation::{
    validate_description, validate_image_url, validate_product_name, validate_size_options,
    validate_stock,
};
use crate::db::{
    now_timestamp, CreateProductRequest, DbPool, Product, ProductListQuery, UpdateProductRequest,
};
use crate::AppState;

fn validate_create_request(req: &CreateProductRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Err(e) = validate_product_name(&req.name) {
        errors.add("name", e);
    }
    if let Err(e) = validate_description(&req.description) {
        errors.add("description", e);
    }
    if let Err(e) = validate_stock(req.stock) {
        errors.add("stock", e);
    }
    if let Err(e) = validate_size_options(&req.size_options) {
        errors.add("size_options", e);
    }
    if let Err(e) = validate_image_url(&req.image_url) {
        errors.add("image_url", e);
    }

    errors.finish()
}

/// Empty strings clear an optional image
fn normalize_image_url(url: Option<String>) -> Option<String> {
    url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty())
}

async fn find_product(db: &DbPool, id: &str) -> Result<Product, ApiError> {
    sqlx::query_as("SELECT * FROM products WHERE id = ? AND deleted_at IS NULL")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))
}

async fn query_products(db: &DbPool, category: Option<&str>) -> Result<Vec<Product>, ApiError> {
    let products = match category.map(str::trim).filter(|c| !c.is_empty()) {
        Some(category) => {
            sqlx::query_as(
                "SELECT * FROM products WHERE deleted_at IS NULL AND category = ? ORDER BY created_at DESC, rowid DESC",
            )
            .bind(category)
            .fetch_all(db)
            .await?
        }
        None => {
            sqlx::query_as(
                "SELECT * FROM products WHERE deleted_at IS NULL ORDER BY created_at DESC, rowid DESC",
            )
            .fetch_all(db)
            .await?
        }
    };
    Ok(products)
}

/// Public catalog listing, newest first, optionally filtered by exact category
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ProductListQuery>,
) -> Result<Json<Value>, ApiError> {
    let products = query_products(&state.db, query.category.as_deref()).await?;
    Ok(Json(json!({ "products": products, "total": products.len() })))
}

pub async fn get_product(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<Product>, ApiError> {
    Ok(Json(find_product(&state.db, &id).await?))
}

pub async fn list_admin_products(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ProductListQuery>,
) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(query_products(&state.db, query.category.as_deref()).await?))
}

pub async fn create_product(
    State(state): State<Arc<AppState>>,
    admin: AdminContext,
    ApiJson(req): ApiJson<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    validate_create_request(&req)?;

    let id = Uuid::new_v4().to_string();
    let now = now_timestamp();
    let name = req.name.trim().to_string();
    let category = req.category.trim().to_string();
    let image_url = normalize_image_url(req.image_url);

    sqlx::query(
        r#"
        INSERT INTO products (id, name, description, price, stock, category, size_options, image_url, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&name)
    .bind(&req.description)
    .bind(req.price)
    .bind(req.stock)
    .bind(&category)
    .bind(sqlx::types::Json(&req.size_options))
    .bind(&image_url)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    info!(product_id = %id, admin_id = %admin.admin_id, name = %name, "Product created");

    let product = find_product(&state.db, &id).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// Partial update; only fields present in the body change.
pub async fn update_product(
    State(state): State<Arc<AppState>>,
    admin: AdminContext,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateProductRequest>,
) -> Result<Json<Product>, ApiError> {
    let existing = find_product(&state.db, &id).await?;

    let name = req.name.map(|n| n.trim().to_string()).unwrap_or(existing.name);
    let description = req.description.unwrap_or(existing.description);
    let price = req.price.unwrap_or(existing.price);
    let stock = req.stock.unwrap_or(existing.stock);
    let category = req
        .category
        .map(|c| c.trim().to_string())
        .unwrap_or(existing.category);
    let size_options = req.size_options.unwrap_or(existing.size_options);
    let image_url = match req.image_url {
        Some(url) => normalize_image_url(Some(url)),
        None => existing.image_url,
    };

    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("name", validate_product_name(&name))
        .check("description", validate_description(&description))
        .check("stock", validate_stock(stock))
        .check("size_options", validate_size_options(&size_options))
        .check("image_url", validate_image_url(&image_url));
    errors.finish()?;

    let result = sqlx::query(
        r#"
        UPDATE products SET
            name = ?, description = ?, price = ?, stock = ?, category = ?,
            size_options = ?, image_url = ?, updated_at = ?
        WHERE id = ? AND deleted_at IS NULL
        "#,
    )
    .bind(&name)
    .bind(&description)
    .bind(price)
    .bind(stock)
    .bind(&category)
    .bind(sqlx::types::Json(&size_options))
    .bind(&image_url)
    .bind(now_timestamp())
    .bind(&id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Product not found"));
    }

    info!(product_id = %id, admin_id = %admin.admin_id, "Product updated");
    Ok(Json(find_product(&state.db, &id).await?))
}

/// Soft delete: the row stays so existing order lines keep their reference.
pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    admin: AdminContext,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<Value>, ApiError> {
    let now = now_timestamp();
    let result = sqlx::query(
        "UPDATE products SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(&now)
    .bind(&now)
    .bind(&id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Product not found"));
    }

    info!(product_id = %id, admin_id = %admin.admin_id, "Product deleted");
    Ok(Json(json!({ "message": "Product deleted successfully" })))
}
