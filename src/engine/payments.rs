use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::gateway::{ChargeRequest, GatewayError, GatewayReceipt, PaymentGateway};
use super::orders::fetch_order;
use super::{add_field_error, CheckoutError, FieldErrors};
use super::validation::{validate_card_number, validate_cvv, validate_expiry_date};
use crate::db::{now_timestamp, DbPool, Money, Order, OrderStatus};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PaymentRequest {
    pub order_id: String,
    pub amount: Option<Money>,
    pub card_number: String,
    pub expiry_date: String,
    pub cvv: String,
    pub name_on_card: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentConfirmation {
    pub transaction_id: String,
    pub order: Order,
}

fn validate_payment_request(request: &PaymentRequest) -> Result<Money, CheckoutError> {
    let mut errors = FieldErrors::new();

    if request.order_id.trim().is_empty() {
        add_field_error(&mut errors, "order_id", "Order id is required");
    }
    if request.amount.is_none() {
        add_field_error(&mut errors, "amount", "Amount is required");
    }
    if let Err(e) = validate_card_number(&request.card_number) {
        add_field_error(&mut errors, "card_number", e);
    }
    if let Err(e) = validate_expiry_date(&request.expiry_date) {
        add_field_error(&mut errors, "expiry_date", e);
    }
    if let Err(e) = validate_cvv(&request.cvv) {
        add_field_error(&mut errors, "cvv", e);
    }
    if request.name_on_card.trim().is_empty() {
        add_field_error(&mut errors, "name_on_card", "Name on card is required");
    }

    match request.amount {
        Some(amount) if errors.is_empty() => Ok(amount),
        _ => Err(CheckoutError::Validation(errors)),
    }
}

/// Charge the card for a pending order, then mark it paid and deduct stock
/// in one transaction.
///
/// If the transaction fails after the charge was approved, nothing is
/// written and the charge is voided.
pub async fn confirm_payment(
    db: &DbPool,
    gateway: &dyn PaymentGateway,
    request: &PaymentRequest,
) -> Result<PaymentConfirmation, CheckoutError> {
    let amount = validate_payment_request(request)?;

    let order = fetch_order(db, request.order_id.trim())
        .await?
        .ok_or(CheckoutError::OrderNotFound)?;

    if order.total_amount != amount {
        return Err(CheckoutError::AmountMismatch {
            expected: order.total_amount,
            received: amount,
        });
    }
    if order.status.is_paid_like() {
        return Err(CheckoutError::AlreadyPaid);
    }
    if order.status == OrderStatus::Cancelled {
        return Err(CheckoutError::OrderCancelled);
    }

    let charge = ChargeRequest {
        order_id: order.id.clone(),
        order_number: order.order_number.clone(),
        amount,
        card_number: request.card_number.clone(),
        expiry_date: request.expiry_date.clone(),
        cvv: request.cvv.clone(),
        name_on_card: request.name_on_card.clone(),
    };
    let receipt = gateway.charge(&charge).await.map_err(|e| match e {
        GatewayError::Declined => CheckoutError::PaymentDeclined(e.to_string()),
        GatewayError::Processing => CheckoutError::PaymentProcessing(e.to_string()),
    })?;

    if let Err(e) = finalize_payment(db, &order, &receipt).await {
        warn!(
            order_id = %order.id,
            reference = %receipt.reference,
            error = %e,
            "Payment approved but order could not be completed, voiding charge"
        );
        if let Err(void_err) = gateway.void(&receipt).await {
            error!(reference = %receipt.reference, error = %void_err, "Failed to void charge");
        }
        return Err(e);
    }

    info!(
        order_id = %order.id,
        order_number = %order.order_number,
        amount = %amount,
        transaction_id = %receipt.reference,
        "Payment processed"
    );

    let order = fetch_order(db, &order.id)
        .await?
        .ok_or(CheckoutError::OrderNotFound)?;
    Ok(PaymentConfirmation {
        transaction_id: receipt.reference,
        order,
    })
}

async fn finalize_payment(db: &DbPool, order: &Order, receipt: &GatewayReceipt) -> Result<(), CheckoutError> {
    let now = now_timestamp();
    let mut tx = db.begin().await?;

    let updated = sqlx::query(
        r#"
        UPDATE orders SET status = ?, payment_reference = ?, updated_at = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(OrderStatus::Paid)
    .bind(&receipt.reference)
    .bind(&now)
    .bind(&order.id)
    .bind(OrderStatus::Pending)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        let status: Option<OrderStatus> = sqlx::query_scalar("SELECT status FROM orders WHERE id = ?")
            .bind(&order.id)
            .fetch_optional(&mut *tx)
            .await?;
        return Err(match status {
            None => CheckoutError::OrderNotFound,
            Some(status) if status.is_paid_like() => CheckoutError::AlreadyPaid,
            Some(_) => CheckoutError::OrderCancelled,
        });
    }

    for item in &order.items {
        let decremented = sqlx::query(
            r#"
            UPDATE products SET stock = stock - ?, updated_at = ?
            WHERE id = ? AND deleted_at IS NULL AND stock >= ?
            "#,
        )
        .bind(item.quantity)
        .bind(&now)
        .bind(&item.product_id)
        .bind(item.quantity)
        .execute(&mut *tx)
        .await?;

        if decremented.rows_affected() == 0 {
            let product: Option<(String, i64)> =
                sqlx::query_as("SELECT name, stock FROM products WHERE id = ? AND deleted_at IS NULL")
                    .bind(&item.product_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match product {
                None => CheckoutError::ProductNotFound(item.product_id.clone()),
                Some((product_name, available)) => CheckoutError::InsufficientStock {
                    product_id: item.product_id.clone(),
                    product_name,
                    available,
                    requested: item.quantity,
                },
            });
        }
    }

    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{insert_product, product_stock, test_pool};
    use crate::engine::gateway::{MockGateway, DECLINED_CARD, PROCESSING_ERROR_CARD};
    use crate::engine::orders::place_order;
    use crate::engine::orders::tests::cart;
    use crate::config::DatabaseConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::task::JoinSet;

    /// Zero-latency mock that counts voids
    #[derive(Default)]
    struct RecordingGateway {
        voids: AtomicUsize,
    }

    #[async_trait]
    impl PaymentGateway for RecordingGateway {
        async fn charge(&self, request: &ChargeRequest) -> Result<GatewayReceipt, GatewayError> {
            MockGateway::new(Duration::ZERO).charge(request).await
        }

        async fn void(&self, _receipt: &GatewayReceipt) -> Result<(), GatewayError> {
            self.voids.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn payment(order: &Order, card: &str) -> PaymentRequest {
        PaymentRequest {
            order_id: order.id.clone(),
            amount: Some(order.total_amount),
            card_number: card.to_string(),
            expiry_date: "12/30".to_string(),
            cvv: "123".to_string(),
            name_on_card: "Rickson Gracie".to_string(),
        }
    }

    const CARD: &str = "4242 4242 4242 4242";

    #[tokio::test]
    async fn test_confirm_marks_paid_and_deducts_stock() {
        let pool = test_pool().await;
        let gateway = RecordingGateway::default();
        let gi = insert_product(&pool, "Gi", 12000, 10).await;
        let belt = insert_product(&pool, "Belt", 2500, 5).await;
        let order = place_order(&pool, &cart(&[(&gi, 2), (&belt, 1), (&gi, 1)])).await.unwrap();

        let confirmation = confirm_payment(&pool, &gateway, &payment(&order, CARD)).await.unwrap();

        assert!(confirmation.transaction_id.starts_with("TXN-"));
        assert_eq!(confirmation.order.status, OrderStatus::Paid);
        assert_eq!(
            confirmation.order.payment_reference.as_deref(),
            Some(confirmation.transaction_id.as_str())
        );
        assert_eq!(product_stock(&pool, &gi).await, 7);
        assert_eq!(product_stock(&pool, &belt).await, 4);
        assert_eq!(gateway.voids.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_second_confirmation_is_already_paid() {
        let pool = test_pool().await;
        let gateway = RecordingGateway::default();
        let gi = insert_product(&pool, "Gi", 12000, 10).await;
        let order = place_order(&pool, &cart(&[(&gi, 2)])).await.unwrap();

        confirm_payment(&pool, &gateway, &payment(&order, CARD)).await.unwrap();
        let err = confirm_payment(&pool, &gateway, &payment(&order, CARD)).await.unwrap_err();

        assert!(matches!(err, CheckoutError::AlreadyPaid));
        assert_eq!(product_stock(&pool, &gi).await, 8);

        crate::engine::update_status(&pool, &order.id, OrderStatus::Shipped)
            .await
            .unwrap();
        assert!(matches!(
            confirm_payment(&pool, &gateway, &payment(&order, CARD)).await,
            Err(CheckoutError::AlreadyPaid)
        ));
        assert_eq!(product_stock(&pool, &gi).await, 8);
    }

    #[tokio::test]
    async fn test_amount_mismatch_changes_nothing() {
        let pool = test_pool().await;
        let gateway = RecordingGateway::default();
        let gi = insert_product(&pool, "Gi", 12000, 10).await;
        let order = place_order(&pool, &cart(&[(&gi, 1)])).await.unwrap();

        let mut request = payment(&order, CARD);
        request.amount = Some(Money::from_cents(11999));
        match confirm_payment(&pool, &gateway, &request).await.unwrap_err() {
            CheckoutError::AmountMismatch { expected, received } => {
                assert_eq!(expected, Money::from_cents(12000));
                assert_eq!(received, Money::from_cents(11999));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let stored = fetch_order(&pool, &order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
        assert_eq!(product_stock(&pool, &gi).await, 10);
    }

    #[tokio::test]
    async fn test_sentinel_cards_leave_order_pending() {
        let pool = test_pool().await;
        let gateway = RecordingGateway::default();
        let gi = insert_product(&pool, "Gi", 12000, 10).await;
        let order = place_order(&pool, &cart(&[(&gi, 1)])).await.unwrap();

        assert!(matches!(
            confirm_payment(&pool, &gateway, &payment(&order, DECLINED_CARD)).await,
            Err(CheckoutError::PaymentDeclined(_))
        ));
        assert!(matches!(
            confirm_payment(&pool, &gateway, &payment(&order, PROCESSING_ERROR_CARD)).await,
            Err(CheckoutError::PaymentProcessing(_))
        ));

        let stored = fetch_order(&pool, &order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
        assert_eq!(product_stock(&pool, &gi).await, 10);
    }

    #[tokio::test]
    async fn test_oversold_order_stays_pending() {
        let pool = test_pool().await;
        let gateway = RecordingGateway::default();
        let gi = insert_product(&pool, "Gi", 12000, 5).await;

        let first = place_order(&pool, &cart(&[(&gi, 3)])).await.unwrap();
        let second = place_order(&pool, &cart(&[(&gi, 3)])).await.unwrap();
        assert_eq!(product_stock(&pool, &gi).await, 5);

        confirm_payment(&pool, &gateway, &payment(&first, CARD)).await.unwrap();
        assert_eq!(product_stock(&pool, &gi).await, 2);

        match confirm_payment(&pool, &gateway, &payment(&second, CARD)).await.unwrap_err() {
            CheckoutError::InsufficientStock { available, requested, .. } => {
                assert_eq!(available, 2);
                assert_eq!(requested, 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let stored = fetch_order(&pool, &second.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
        assert_eq!(stored.payment_reference, None);
        assert_eq!(product_stock(&pool, &gi).await, 2);
        assert_eq!(gateway.voids.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_rolls_back_every_line() {
        let pool = test_pool().await;
        let gateway = RecordingGateway::default();
        let gi = insert_product(&pool, "Gi", 12000, 10).await;
        let rashguard = insert_product(&pool, "Rashguard", 4500, 3).await;
        let order = place_order(&pool, &cart(&[(&gi, 2), (&rashguard, 3)])).await.unwrap();

        sqlx::query("UPDATE products SET stock = 1 WHERE id = ?")
            .bind(&rashguard)
            .execute(&pool)
            .await
            .unwrap();

        let err = confirm_payment(&pool, &gateway, &payment(&order, CARD)).await.unwrap_err();
        assert!(matches!(err, CheckoutError::InsufficientStock { .. }));

        // The Gi decrement ran before the failure and must be undone
        assert_eq!(product_stock(&pool, &gi).await, 10);
        assert_eq!(product_stock(&pool, &rashguard).await, 1);
        let stored = fetch_order(&pool, &order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
        assert_eq!(gateway.voids.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deleted_product_fails_confirmation() {
        let pool = test_pool().await;
        let gateway = RecordingGateway::default();
        let gi = insert_product(&pool, "Gi", 12000, 10).await;
        let order = place_order(&pool, &cart(&[(&gi, 1)])).await.unwrap();

        sqlx::query("UPDATE products SET deleted_at = '2024-01-01T00:00:00Z' WHERE id = ?")
            .bind(&gi)
            .execute(&pool)
            .await
            .unwrap();

        assert!(matches!(
            confirm_payment(&pool, &gateway, &payment(&order, CARD)).await,
            Err(CheckoutError::ProductNotFound(_))
        ));
        assert_eq!(product_stock(&pool, &gi).await, 10);
    }

    #[tokio::test]
    async fn test_cancelled_and_missing_orders() {
        let pool = test_pool().await;
        let gateway = RecordingGateway::default();
        let gi = insert_product(&pool, "Gi", 12000, 10).await;
        let order = place_order(&pool, &cart(&[(&gi, 1)])).await.unwrap();
        crate::engine::update_status(&pool, &order.id, OrderStatus::Cancelled)
            .await
            .unwrap();

        assert!(matches!(
            confirm_payment(&pool, &gateway, &payment(&order, CARD)).await,
            Err(CheckoutError::OrderCancelled)
        ));

        let mut missing = payment(&order, CARD);
        missing.order_id = uuid::Uuid::new_v4().to_string();
        assert!(matches!(
            confirm_payment(&pool, &gateway, &missing).await,
            Err(CheckoutError::OrderNotFound)
        ));
    }

    #[tokio::test]
    async fn test_incomplete_payment_details() {
        let pool = test_pool().await;
        let gateway = RecordingGateway::default();
        let request = PaymentRequest {
            order_id: "o1".to_string(),
            card_number: "4242".to_string(),
            ..Default::default()
        };

        match confirm_payment(&pool, &gateway, &request).await.unwrap_err() {
            CheckoutError::Validation(errors) => {
                for field in ["amount", "card_number", "expiry_date", "cvv", "name_on_card"] {
                    assert!(errors.contains_key(field), "missing error for {}", field);
                }
                assert!(!errors.contains_key("order_id"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_concurrent_confirmations_never_oversell() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            url: format!("sqlite:{}", dir.path().join("race.db").display()),
            max_connections: 8,
        };
        let pool = crate::db::init(&config).await.unwrap();
        let gateway = Arc::new(RecordingGateway::default());
        let gi = insert_product(&pool, "Gi", 12000, 5).await;

        let mut requests = Vec::new();
        for _ in 0..6 {
            let order = place_order(&pool, &cart(&[(&gi, 1)])).await.unwrap();
            requests.push(payment(&order, CARD));
        }

        let mut racers = JoinSet::new();
        for request in requests {
            let pool = pool.clone();
            let gateway = gateway.clone();
            racers.spawn(async move { confirm_payment(&pool, gateway.as_ref(), &request).await });
        }

        let mut approved = 0;
        let mut out_of_stock = 0;
        while let Some(joined) = racers.join_next().await {
            match joined.unwrap() {
                Ok(_) => approved += 1,
                Err(CheckoutError::InsufficientStock { .. }) => out_of_stock += 1,
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }

        assert_eq!(approved, 5);
        assert_eq!(out_of_stock, 1);
        assert_eq!(product_stock(&pool, &gi).await, 0);
        assert_eq!(gateway.voids.load(Ordering::SeqCst), 1);

        let paid: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE status = 'paid'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(paid, 5);
        pool.close().await;
    }
}
