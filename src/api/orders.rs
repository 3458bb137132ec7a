use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::info;

use super::auth::AdminContext;
use super::error::ApiError;
use super::extract::{ApiJson, ApiPath, ApiQuery};
use super::metrics::record_order_created;
use super::validation::validate_email;
use crate::db::{
    CreateOrderRequest, CreateOrderResponse, Order, OrderListQuery, OrdersByEmailResponse,
    PaginatedOrders, UpdateOrderStatusRequest,
};
use crate::engine;
use crate::AppState;

/// Guest checkout: turn a cart into a pending order
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), ApiError> {
    let order = engine::place_order(&state.db, &req).await?;
    record_order_created();

    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse {
            order,
            message: "Order created successfully".to_string(),
        }),
    ))
}

pub async fn track_order(
    State(state): State<Arc<AppState>>,
    ApiPath(order_number): ApiPath<String>,
) -> Result<Json<Order>, ApiError> {
    engine::fetch_order_by_number(&state.db, &order_number)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Order not found").with_detail("order_number", order_number))
}

pub async fn orders_by_email(
    State(state): State<Arc<AppState>>,
    ApiPath(email): ApiPath<String>,
) -> Result<Json<OrdersByEmailResponse>, ApiError> {
    if let Err(e) = validate_email(&email) {
        return Err(ApiError::validation_field("email", e));
    }

    let orders = engine::orders_by_email(&state.db, &email).await?;
    Ok(Json(OrdersByEmailResponse {
        email: email.trim().to_lowercase(),
        total: orders.len(),
        orders,
    }))
}

pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<OrderListQuery>,
) -> Result<Json<PaginatedOrders>, ApiError> {
    let page = engine::list_orders(&state.db, query.page, query.limit, query.status).await?;
    Ok(Json(page))
}

pub async fn update_order_status(
    State(state): State<Arc<AppState>>,
    admin: AdminContext,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateOrderStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let order = engine::update_status(&state.db, &id, req.status).await?;
    info!(
        order_id = %order.id,
        admin_id = %admin.admin_id,
        status = %order.status,
        "Order status changed by admin"
    );
    Ok(Json(order))
}
