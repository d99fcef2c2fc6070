//! Unwinds a paid subscription before the owning account goes away.
//!
//! Cancellation failures at the provider never block deletion; they surface as
//! [`CancellationOutcome::ProviderError`]. A refund is attempted at most once per
//! call and only inside the refund window. The payment record is deleted once the
//! refund decision has been carried out, and every payment row for the subscription
//! goes with it.

use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{info, instrument, warn};

use super::gateway::{GatewayError, PaymentGateway};
use super::repo::PaymentStore;
use crate::users::repo_types::Subscription;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancellationOutcome {
    Cancelled,
    AlreadyCancelled,
    /// Logged and ignored; deletion proceeds.
    ProviderError(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundOutcome {
    Refunded { payment_id: String },
    OutsideWindow,
    NoPaymentRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// No active subscription; nothing was touched.
    Skipped,
    Completed {
        cancellation: CancellationOutcome,
        refund: RefundOutcome,
    },
}

impl TeardownOutcome {
    pub fn refunded(&self) -> bool {
        matches!(
            self,
            TeardownOutcome::Completed {
                refund: RefundOutcome::Refunded { .. },
                ..
            }
        )
    }
}

#[derive(Debug, Error)]
pub enum TeardownError {
    #[error("refund for payment {payment_id} failed: {source}")]
    Refund {
        payment_id: String,
        #[source]
        source: GatewayError,
    },
    #[error("payment store: {0:#}")]
    Store(#[from] anyhow::Error),
}

pub fn within_refund_window(paid_at: OffsetDateTime, now: OffsetDateTime, window: Duration) -> bool {
    now - paid_at < window
}

#[instrument(
    skip(gateway, payments, subscription),
    fields(subscription_id = tracing::field::Empty)
)]
pub async fn teardown_subscription(
    gateway: &dyn PaymentGateway,
    payments: &dyn PaymentStore,
    subscription: Option<&Subscription>,
    refund_window: Duration,
    now: OffsetDateTime,
) -> Result<TeardownOutcome, TeardownError> {
    let Some(sub) = subscription.filter(|s| s.is_active()) else {
        return Ok(TeardownOutcome::Skipped);
    };
    tracing::Span::current().record("subscription_id", sub.id.as_str());

    let cancellation = match gateway.cancel_subscription(&sub.id).await {
        Ok(()) => CancellationOutcome::Cancelled,
        Err(GatewayError::AlreadyCancelled(_) | GatewayError::NotFound(_)) => {
            CancellationOutcome::AlreadyCancelled
        }
        Err(e) => {
            warn!(error = %e, "subscription cancellation failed, continuing with deletion");
            CancellationOutcome::ProviderError(e.to_string())
        }
    };

    let Some(payment) = payments.find_by_subscription(&sub.id).await? else {
        warn!("no payment record for active subscription, skipping refund");
        return Ok(TeardownOutcome::Completed {
            cancellation,
            refund: RefundOutcome::NoPaymentRecord,
        });
    };

    let refund = if within_refund_window(payment.created_at, now, refund_window) {
        gateway
            .refund_payment(&payment.razorpay_payment_id)
            .await
            .map_err(|source| TeardownError::Refund {
                payment_id: payment.razorpay_payment_id.clone(),
                source,
            })?;
        RefundOutcome::Refunded {
            payment_id: payment.razorpay_payment_id.clone(),
        }
    } else {
        RefundOutcome::OutsideWindow
    };

    let removed = payments.delete_for_subscription(&sub.id).await?;
    info!(
        payment_id = %payment.razorpay_payment_id,
        removed,
        ?refund,
        ?cancellation,
        "subscription torn down"
    );

    Ok(TeardownOutcome::Completed {
        cancellation,
        refund,
    })
}
