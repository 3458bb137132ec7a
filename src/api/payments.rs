use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use super::error::ApiError;
use super::extract::ApiJson;
use super::metrics::record_payment;
use crate::db::Order;
use crate::engine::{self, CheckoutError, PaymentRequest};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub success: bool,
    pub transaction_id: String,
    pub message: String,
    pub order: Order,
}

fn outcome(result: &Result<engine::PaymentConfirmation, CheckoutError>) -> &'static str {
    match result {
        Ok(_) => "approved",
        Err(CheckoutError::PaymentDeclined(_)) => "declined",
        Err(CheckoutError::PaymentProcessing(_)) => "error",
        Err(_) => "rejected",
    }
}

/// Charge the card for a pending order and complete it
pub async fn process_payment(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<PaymentRequest>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let result = engine::confirm_payment(&state.db, state.gateway.as_ref(), &req).await;
    record_payment(outcome(&result));

    let confirmation = result?;
    Ok(Json(PaymentResponse {
        success: true,
        transaction_id: confirmation.transaction_id,
        message: "Payment processed successfully".to_string(),
        order: confirmation.order,
    }))
}
