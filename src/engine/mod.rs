//! Order placement and payment confirmation.
//!
//! Placing an order only checks stock; stock is deducted when payment is
//! confirmed, in the same transaction that marks the order paid.

pub mod gateway;
mod orders;
mod payments;
pub mod validation;

pub use gateway::{ChargeRequest, GatewayError, GatewayReceipt, MockGateway, PaymentGateway};
pub use orders::*;
pub use payments::*;

use std::collections::HashMap;

use crate::db::Money;

pub type FieldErrors = HashMap<String, Vec<String>>;

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("Validation failed")]
    Validation(FieldErrors),
    #[error("Product not found: {0}")]
    ProductNotFound(String),
    #[error("Insufficient stock for {product_name}. Available: {available}, Requested: {requested}")]
    InsufficientStock {
        product_id: String,
        product_name: String,
        available: i64,
        requested: i64,
    },
    #[error("Order not found")]
    OrderNotFound,
    #[error("Amount mismatch. Expected: {expected}, Received: {received}")]
    AmountMismatch { expected: Money, received: Money },
    #[error("Order is already paid")]
    AlreadyPaid,
    #[error("Order has been cancelled")]
    OrderCancelled,
    #[error("Cannot change order status from {from} to {to}")]
    InvalidTransition {
        from: crate::db::OrderStatus,
        to: crate::db::OrderStatus,
    },
    #[error("Payment declined: {0}")]
    PaymentDeclined(String),
    #[error("Payment processing error: {0}")]
    PaymentProcessing(String),
    #[error("Order total is out of range")]
    TotalOverflow,
    #[error("Could not allocate a unique order number")]
    OrderNumberExhausted,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub(crate) fn add_field_error(errors: &mut FieldErrors, field: impl Into<String>, message: impl Into<String>) {
    errors.entry(field.into()).or_default().push(message.into());
}
