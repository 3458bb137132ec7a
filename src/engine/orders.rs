use rand::{distr::Alphanumeric, Rng};
use sqlx::{Sqlite, Transaction};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::{add_field_error, CheckoutError, FieldErrors};
use super::validation::validate_email;
use crate::db::{
    now_timestamp, CreateOrderRequest, DashboardStats, DbPool, Money, Order, OrderItem,
    OrderStatus, PaginatedOrders, Product,
};

pub const MAX_ITEM_QUANTITY: i64 = 1000;
const ORDER_NUMBER_ATTEMPTS: usize = 5;
pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// `ORD-YYYYMMDD-XXXXXXXX` with eight random upper-case alphanumerics
pub fn generate_order_number() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|b| (b as char).to_ascii_uppercase())
        .collect();
    format!("ORD-{}-{}", chrono::Utc::now().format("%Y%m%d"), suffix)
}

fn validate_order_request(request: &CreateOrderRequest) -> Result<(), CheckoutError> {
    let mut errors = FieldErrors::new();

    if let Err(e) = validate_email(&request.guest_email) {
        add_field_error(&mut errors, "guest_email", e);
    }

    for field in request.shipping_address.missing_fields() {
        add_field_error(
            &mut errors,
            format!("shipping_address.{}", field),
            format!("{} is required", field),
        );
    }

    if request.items.is_empty() {
        add_field_error(&mut errors, "items", "Order must contain at least one item");
    }
    for (i, item) in request.items.iter().enumerate() {
        if item.product_id.trim().is_empty() {
            add_field_error(&mut errors, format!("items[{}].product_id", i), "Product id is required");
        }
        if !(1..=MAX_ITEM_QUANTITY).contains(&item.quantity) {
            add_field_error(
                &mut errors,
                format!("items[{}].quantity", i),
                format!("Quantity must be between 1 and {}", MAX_ITEM_QUANTITY),
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(CheckoutError::Validation(errors))
    }
}

/// Insert the order row, regenerating the order number on collision.
async fn insert_order_row(
    tx: &mut Transaction<'_, Sqlite>,
    order_id: &str,
    request: &CreateOrderRequest,
    guest_email: &str,
    now: &str,
) -> Result<String, CheckoutError> {
    for attempt in 1..=ORDER_NUMBER_ATTEMPTS {
        let order_number = generate_order_number();
        let result = sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, guest_email, shipping_address, total_amount, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, 0, ?, ?, ?)
            "#,
        )
        .bind(order_id)
        .bind(&order_number)
        .bind(guest_email)
        .bind(sqlx::types::Json(&request.shipping_address))
        .bind(OrderStatus::Pending)
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await;

        match result {
            Ok(_) => return Ok(order_number),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                warn!(attempt, order_number = %order_number, "Order number collision, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(CheckoutError::OrderNumberExhausted)
}

/// Create a pending order from a cart.
///
/// Stock is checked against the total requested per product but not
/// deducted. Prices and names are frozen from the catalog. Nothing is
/// written unless every check passes.
pub async fn place_order(db: &DbPool, request: &CreateOrderRequest) -> Result<Order, CheckoutError> {
    validate_order_request(request)?;

    let guest_email = request.guest_email.trim().to_lowercase();
    let order_id = uuid::Uuid::new_v4().to_string();
    let now = now_timestamp();

    let mut tx = db.begin().await?;

    // Writing first takes the database write lock for the whole transaction
    let order_number = insert_order_row(&mut tx, &order_id, request, &guest_email, &now).await?;

    let mut requested: HashMap<&str, i64> = HashMap::new();
    for item in &request.items {
        *requested.entry(item.product_id.as_str()).or_default() += item.quantity;
    }

    let mut products: HashMap<&str, Product> = HashMap::new();
    let mut errors = FieldErrors::new();
    for (i, item) in request.items.iter().enumerate() {
        let product_id = item.product_id.as_str();
        if !products.contains_key(product_id) {
            let product: Product =
                sqlx::query_as("SELECT * FROM products WHERE id = ? AND deleted_at IS NULL")
                    .bind(product_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| CheckoutError::ProductNotFound(product_id.to_string()))?;

            let wanted = requested.get(product_id).copied().unwrap_or(item.quantity);
            if product.stock < wanted {
                return Err(CheckoutError::InsufficientStock {
                    product_id: product.id,
                    product_name: product.name,
                    available: product.stock,
                    requested: wanted,
                });
            }
            products.insert(product_id, product);
        }

        if let (Some(size), Some(product)) = (&item.size, products.get(product_id)) {
            if !product.size_options.is_empty() && !product.offers_size(size) {
                add_field_error(
                    &mut errors,
                    format!("items[{}].size", i),
                    format!("Size {} is not available for {}", size, product.name),
                );
            }
        }
    }
    if !errors.is_empty() {
        return Err(CheckoutError::Validation(errors));
    }

    let mut items = Vec::with_capacity(request.items.len());
    let mut total = Money::ZERO;
    for item in &request.items {
        let product = products
            .get(item.product_id.as_str())
            .ok_or_else(|| CheckoutError::ProductNotFound(item.product_id.clone()))?;
        let line = OrderItem {
            id: uuid::Uuid::new_v4().to_string(),
            order_id: order_id.clone(),
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            quantity: item.quantity,
            price: product.price,
            size: item.size.clone(),
            created_at: now.clone(),
        };
        total = line
            .line_total()
            .and_then(|amount| total.checked_add(amount))
            .ok_or(CheckoutError::TotalOverflow)?;
        items.push(line);
    }

    for item in &items {
        sqlx::query(
            r#"
            INSERT INTO order_items (id, order_id, product_id, product_name, quantity, price, size, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(&item.order_id)
        .bind(&item.product_id)
        .bind(&item.product_name)
        .bind(item.quantity)
        .bind(item.price)
        .bind(&item.size)
        .bind(&item.created_at)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("UPDATE orders SET total_amount = ? WHERE id = ?")
        .bind(total)
        .bind(&order_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(
        order_id = %order_id,
        order_number = %order_number,
        items = items.len(),
        total = %total,
        "Order placed"
    );

    Ok(Order {
        id: order_id,
        order_number,
        guest_email,
        shipping_address: request.shipping_address.clone(),
        total_amount: total,
        status: OrderStatus::Pending,
        payment_reference: None,
        created_at: now.clone(),
        updated_at: now,
        items,
    })
}

pub(crate) async fn load_items<'e, E>(executor: E, order_id: &str) -> Result<Vec<OrderItem>, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_as("SELECT * FROM order_items WHERE order_id = ? ORDER BY rowid")
        .bind(order_id)
        .fetch_all(executor)
        .await
}

async fn with_items(db: &DbPool, orders: Vec<Order>) -> Result<Vec<Order>, sqlx::Error> {
    let mut result = Vec::with_capacity(orders.len());
    for mut order in orders {
        order.items = load_items(db, &order.id).await?;
        result.push(order);
    }
    Ok(result)
}

pub async fn fetch_order(db: &DbPool, order_id: &str) -> Result<Option<Order>, sqlx::Error> {
    let order: Option<Order> = sqlx::query_as("SELECT * FROM orders WHERE id = ?")
        .bind(order_id)
        .fetch_optional(db)
        .await?;
    match order {
        Some(mut order) => {
            order.items = load_items(db, &order.id).await?;
            Ok(Some(order))
        }
        None => Ok(None),
    }
}

pub async fn fetch_order_by_number(db: &DbPool, order_number: &str) -> Result<Option<Order>, sqlx::Error> {
    let order: Option<Order> = sqlx::query_as("SELECT * FROM orders WHERE order_number = ?")
        .bind(order_number.trim())
        .fetch_optional(db)
        .await?;
    match order {
        Some(mut order) => {
            order.items = load_items(db, &order.id).await?;
            Ok(Some(order))
        }
        None => Ok(None),
    }
}

/// All orders placed with this email, newest first
pub async fn orders_by_email(db: &DbPool, email: &str) -> Result<Vec<Order>, sqlx::Error> {
    let orders: Vec<Order> = sqlx::query_as(
        "SELECT * FROM orders WHERE guest_email = ? ORDER BY created_at DESC, rowid DESC",
    )
    .bind(email.trim().to_lowercase())
    .fetch_all(db)
    .await?;
    with_items(db, orders).await
}

pub async fn list_orders(
    db: &DbPool,
    page: Option<i64>,
    limit: Option<i64>,
    status: Option<OrderStatus>,
) -> Result<PaginatedOrders, sqlx::Error> {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = (page - 1).saturating_mul(limit);

    let (total, orders): (i64, Vec<Order>) = match status {
        Some(status) => {
            let total = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE status = ?")
                .bind(status)
                .fetch_one(db)
                .await?;
            let orders = sqlx::query_as(
                "SELECT * FROM orders WHERE status = ? ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            )
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(db)
            .await?;
            (total, orders)
        }
        None => {
            let total = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
                .fetch_one(db)
                .await?;
            let orders = sqlx::query_as(
                "SELECT * FROM orders ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(db)
            .await?;
            (total, orders)
        }
    };

    Ok(PaginatedOrders {
        orders: with_items(db, orders).await?,
        total,
        page,
        limit,
        total_pages: (total + limit - 1) / limit,
    })
}

/// Administrative status change. Payment is the only way into `paid`.
pub async fn update_status(db: &DbPool, order_id: &str, next: OrderStatus) -> Result<Order, CheckoutError> {
    let current: OrderStatus = sqlx::query_scalar("SELECT status FROM orders WHERE id = ?")
        .bind(order_id)
        .fetch_optional(db)
        .await?
        .ok_or(CheckoutError::OrderNotFound)?;

    if next == OrderStatus::Paid || !current.can_transition_to(next) {
        return Err(CheckoutError::InvalidTransition { from: current, to: next });
    }

    let result = sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
        .bind(next)
        .bind(now_timestamp())
        .bind(order_id)
        .bind(current)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        // Changed underneath us; report against the status that won
        let latest: OrderStatus = sqlx::query_scalar("SELECT status FROM orders WHERE id = ?")
            .bind(order_id)
            .fetch_optional(db)
            .await?
            .ok_or(CheckoutError::OrderNotFound)?;
        debug!(order_id, from = %latest, to = %next, "Concurrent status change detected");
        return Err(CheckoutError::InvalidTransition { from: latest, to: next });
    }

    info!(order_id, from = %current, to = %next, "Order status updated");
    fetch_order(db, order_id).await?.ok_or(CheckoutError::OrderNotFound)
}

pub async fn dashboard_stats(db: &DbPool) -> Result<DashboardStats, sqlx::Error> {
    let total_products: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE deleted_at IS NULL")
            .fetch_one(db)
            .await?;
    let total_orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(db)
        .await?;
    let revenue: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(total_amount), 0) FROM orders WHERE status IN ('paid', 'shipped', 'delivered')",
    )
    .fetch_one(db)
    .await?;
    let pending_orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE status = 'pending'")
        .fetch_one(db)
        .await?;
    let recent: Vec<Order> =
        sqlx::query_as("SELECT * FROM orders ORDER BY created_at DESC, rowid DESC LIMIT 5")
            .fetch_all(db)
            .await?;

    Ok(DashboardStats {
        total_products,
        total_orders,
        total_revenue: Money::from_cents(revenue),
        pending_orders,
        recent_orders: with_items(db, recent).await?,
    })
}
