use axum::{extract::State, Json};
use std::sync::Arc;

use super::auth::AdminContext;
use super::error::ApiError;
use crate::db::DashboardStats;
use crate::engine;
use crate::AppState;

/// Dashboard counters. Revenue counts paid, shipped and delivered orders.
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    _admin: AdminContext,
) -> Result<Json<DashboardStats>, ApiError> {
    Ok(Json(engine::dashboard_stats(&state.db).await?))
}
