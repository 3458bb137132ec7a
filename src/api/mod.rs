pub mod auth;
pub mod error;
pub mod extract;
pub mod metrics;
mod orders;
mod payments;
mod products;
mod stats;
mod uploads;
pub mod validation;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put, MethodRouter},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::Permission;
use crate::config::CorsConfig;
use crate::AppState;

/// Restrict a route to admins whose role grants `permission`
fn guarded(route: MethodRouter<Arc<AppState>>, permission: Permission) -> MethodRouter<Arc<AppState>> {
    route.route_layer(middleware::from_fn_with_state(
        permission,
        auth::require_permission,
    ))
}

/// CORS for the storefront and admin frontends. "*" or an empty list allows any origin.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .map(|o| o.trim())
        .filter(|o| !o.is_empty() && *o != "*")
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    let allow_origin = if origins.is_empty() || config.allowed_origins.iter().any(|o| o.trim() == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors);

    // Storefront (public)
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/products", get(products::list_products))
        .route("/products/:id", get(products::get_product))
        .route("/orders", post(orders::create_order))
        .route("/orders/track/:order_number", get(orders::track_order))
        .route("/orders/email/:email", get(orders::orders_by_email))
        .route("/payment/process", post(payments::process_payment));

    let admin_auth_routes = Router::new().route("/login", post(auth::login));

    // Admin console, token required; most routes also need a permission
    let admin_routes = Router::new()
        .route("/logout", post(auth::logout))
        .route("/profile", get(auth::profile))
        .route("/stats", get(stats::get_stats))
        .route(
            "/products",
            guarded(get(products::list_admin_products), Permission::ViewProducts)
                .merge(guarded(post(products::create_product), Permission::CreateProducts)),
        )
        .route(
            "/products/:id",
            guarded(put(products::update_product), Permission::UpdateProducts)
                .merge(guarded(delete(products::delete_product), Permission::DeleteProducts)),
        )
        .route(
            "/orders",
            guarded(get(orders::list_orders), Permission::ViewOrders),
        )
        .route(
            "/orders/:id/status",
            guarded(put(orders::update_order_status), Permission::UpdateOrders),
        )
        .route(
            "/upload/image",
            guarded(
                post(uploads::upload_image).layer(DefaultBodyLimit::max(uploads::UPLOAD_BODY_LIMIT)),
                Permission::CreateProducts,
            )
            .merge(guarded(delete(uploads::delete_image), Permission::DeleteProducts)),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/api/admin/auth", admin_auth_routes)
        .nest("/api/admin", admin_routes)
        .nest("/api", public_routes)
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "storefront" }))
}
