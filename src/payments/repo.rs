use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// One successful subscription payment, correlated to a user by subscription id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub razorpay_payment_id: String,
    pub razorpay_subscription_id: String,
    pub razorpay_signature: String,
    pub created_at: OffsetDateTime,
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Most recent payment for the subscription.
    async fn find_by_subscription(&self, subscription_id: &str) -> anyhow::Result<Option<Payment>>;
    /// Removes every payment row for the subscription; returns how many went.
    async fn delete_for_subscription(&self, subscription_id: &str) -> anyhow::Result<u64>;
}

#[async_trait]
impl PaymentStore for PgPool {
    async fn find_by_subscription(&self, subscription_id: &str) -> anyhow::Result<Option<Payment>> {
        let row = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, razorpay_payment_id, razorpay_subscription_id, razorpay_signature, created_at
              FROM payments
             WHERE razorpay_subscription_id = $1
             ORDER BY created_at DESC
             LIMIT 1
            "#,
        )
        .bind(subscription_id)
        .fetch_optional(self)
        .await
        .context("find payment by subscription")?;
        Ok(row)
    }

    async fn delete_for_subscription(&self, subscription_id: &str) -> anyhow::Result<u64> {
        let res = sqlx::query("DELETE FROM payments WHERE razorpay_subscription_id = $1")
            .bind(subscription_id)
            .execute(self)
            .await
            .context("delete payments for subscription")?;
        Ok(res.rows_affected())
    }
}

/// Records a verified payment. `None` means the provider payment id was already stored.
pub async fn insert_payment(
    db: &PgPool,
    payment_id: &str,
    subscription_id: &str,
    signature: &str,
) -> anyhow::Result<Option<Payment>> {
    let row = sqlx::query_as::<_, Payment>(
        r#"
        INSERT INTO payments (id, razorpay_payment_id, razorpay_subscription_id, razorpay_signature)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (razorpay_payment_id) DO NOTHING
        RETURNING id, razorpay_payment_id, razorpay_subscription_id, razorpay_signature, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(payment_id)
    .bind(subscription_id)
    .bind(signature)
    .fetch_optional(db)
    .await
    .context("insert payment")?;
    Ok(row)
}
