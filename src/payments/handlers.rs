use axum::{
    extract::State,
    response::Redirect,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::{
    gateway::verify_payment_signature,
    repo::insert_payment,
    teardown::{teardown_subscription, TeardownOutcome},
};
use crate::{
    auth::extractors::CurrentUser,
    error::{ApiError, ApiResult},
    extract::{Form, Json},
    response::{Empty, Envelope},
    state::AppState,
    users::repo_types::{Subscription, User},
};

pub const STATUS_CREATED: &str = "created";
pub const STATUS_ACTIVE: &str = "active";

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/subscribe", get(subscribe))
        .route("/subscribe/cancel", delete(cancel_subscription))
        .route("/paymentverification", post(verify_payment))
        .route("/razorpaykey", get(razorpay_key))
}

#[derive(Debug, Serialize)]
pub struct SubscribeResponse {
    #[serde(rename = "subscriptionId")]
    pub subscription_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentVerification {
    #[serde(default)]
    pub razorpay_payment_id: String,
    #[serde(default)]
    pub razorpay_subscription_id: String,
    #[serde(default)]
    pub razorpay_signature: String,
}

#[derive(Debug, Serialize)]
pub struct KeyResponse {
    pub key: String,
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn subscribe(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Envelope<SubscribeResponse>>> {
    if user.is_admin() {
        return Err(ApiError::bad_request("Admin can't buy subscription"));
    }

    let created = state
        .payments
        .create_subscription(&state.config.payment.plan_id)
        .await?;
    let sub = Subscription {
        id: created.id,
        status: STATUS_CREATED.into(),
    };
    User::set_subscription(&state.db, user.id, Some(&sub)).await?;
    info!(subscription_id = %sub.id, "subscription created");

    Ok(Json(Envelope::data(SubscribeResponse {
        subscription_id: sub.id,
    })))
}

/// Where the checkout callback lands after signature verification.
pub fn verification_redirect(frontend_url: &str, reference: Option<&str>) -> String {
    let base = frontend_url.trim_end_matches('/');
    match reference {
        Some(r) => format!("{base}/paymentsuccess?reference={r}"),
        None => format!("{base}/paymentfail"),
    }
}

/// A callback may only activate a subscription that is still pending, and only
/// when it is signed for that subscription.
pub fn accepts_callback(key_secret: &str, sub: &Subscription, form: &PaymentVerification) -> bool {
    sub.status == STATUS_CREATED
        && form.razorpay_subscription_id == sub.id
        && verify_payment_signature(
            key_secret,
            &form.razorpay_payment_id,
            &sub.id,
            &form.razorpay_signature,
        )
}

#[instrument(skip(state, user, form), fields(user_id = %user.id))]
pub async fn verify_payment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<PaymentVerification>,
) -> ApiResult<Redirect> {
    let frontend = state.config.frontend_url.as_str();
    let Some(sub) = user.subscription() else {
        warn!("verification without pending subscription");
        return Ok(Redirect::to(&verification_redirect(frontend, None)));
    };

    if !accepts_callback(&state.config.payment.key_secret, &sub, &form) {
        warn!(subscription_id = %sub.id, status = %sub.status, "payment callback rejected");
        return Ok(Redirect::to(&verification_redirect(frontend, None)));
    }

    let recorded = insert_payment(
        &state.db,
        &form.razorpay_payment_id,
        &sub.id,
        &form.razorpay_signature,
    )
    .await?;
    if recorded.is_none() {
        warn!(payment_id = %form.razorpay_payment_id, "payment already recorded");
        return Ok(Redirect::to(&verification_redirect(frontend, None)));
    }

    let active = Subscription {
        id: sub.id,
        status: STATUS_ACTIVE.into(),
    };
    User::set_subscription(&state.db, user.id, Some(&active)).await?;
    state.user_changed();
    info!(subscription_id = %active.id, payment_id = %form.razorpay_payment_id, "subscription activated");

    Ok(Redirect::to(&verification_redirect(
        frontend,
        Some(&form.razorpay_payment_id),
    )))
}

pub async fn razorpay_key(State(state): State<AppState>) -> Json<Envelope<KeyResponse>> {
    Json(Envelope::data(KeyResponse {
        key: state.payments.key_id().to_string(),
    }))
}

pub fn cancellation_message(outcome: &TeardownOutcome, refund_days: i64) -> String {
    if outcome.refunded() {
        format!("Subscription cancelled, You will receive full refund within {refund_days} days.")
    } else {
        format!(
            "Subscription cancelled, Now refund initiated as subscription was cancelled after {refund_days} days."
        )
    }
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn cancel_subscription(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Envelope<Empty>>> {
    let sub = user.subscription();
    if !sub.as_ref().is_some_and(|s| s.is_active()) {
        return Err(ApiError::bad_request("No active subscription"));
    }

    let outcome = teardown_subscription(
        state.payments.as_ref(),
        &state.db,
        sub.as_ref(),
        state.config.refund_window(),
        time::OffsetDateTime::now_utc(),
    )
    .await?;

    User::set_subscription(&state.db, user.id, None).await?;
    state.user_changed();
    info!(?outcome, "subscription cancelled by user");

    Ok(Json(Envelope::message(cancellation_message(
        &outcome,
        state.config.payment.refund_days,
    ))))
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::payments::teardown::{CancellationOutcome, RefundOutcome};

    #[test]
    fn redirects_point_at_frontend() {
        assert_eq!(
            verification_redirect("http://app.local/", Some("pay_1")),
            "http://app.local/paymentsuccess?reference=pay_1"
        );
        assert_eq!(
            verification_redirect("http://app.local", None),
            "http://app.local/paymentfail"
        );
    }

    #[test]
    fn cancel_message_reports_refund() {
        let refunded = TeardownOutcome::Completed {
            cancellation: CancellationOutcome::Cancelled,
            refund: RefundOutcome::Refunded {
                payment_id: "pay_1".into(),
            },
        };
        assert!(cancellation_message(&refunded, 7).contains("full refund within 7 days"));

        let late = TeardownOutcome::Completed {
            cancellation: CancellationOutcome::Cancelled,
            refund: RefundOutcome::OutsideWindow,
        };
        assert!(cancellation_message(&late, 7).contains("after 7 days"));
    }

    #[test]
    fn cancel_message_follows_configured_window() {
        let late = TeardownOutcome::Completed {
            cancellation: CancellationOutcome::Cancelled,
            refund: RefundOutcome::OutsideWindow,
        };
        let msg = cancellation_message(&late, 14);
        assert!(msg.contains("after 14 days"));
        assert!(!msg.contains("7 days"));
    }

    fn signed_callback(secret: &str, payment_id: &str, subscription_id: &str) -> PaymentVerification {
        use hmac::{Hmac, Mac};
        let mut mac = Hmac::<sha2::Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{payment_id}|{subscription_id}").as_bytes());
        PaymentVerification {
            razorpay_payment_id: payment_id.into(),
            razorpay_subscription_id: subscription_id.into(),
            razorpay_signature: hex::encode(mac.finalize().into_bytes()),
        }
    }

    #[test]
    fn pending_subscription_accepts_signed_callback() {
        let sub = Subscription {
            id: "sub_1".into(),
            status: STATUS_CREATED.into(),
        };
        assert!(accepts_callback("shh", &sub, &signed_callback("shh", "pay_1", "sub_1")));
        assert!(!accepts_callback("shh", &sub, &signed_callback("other", "pay_1", "sub_1")));
        assert!(!accepts_callback("shh", &sub, &signed_callback("shh", "pay_1", "sub_2")));
    }

    #[test]
    fn replayed_callback_on_active_subscription_is_refused() {
        let sub = Subscription {
            id: "sub_1".into(),
            status: STATUS_ACTIVE.into(),
        };
        assert!(!accepts_callback("shh", &sub, &signed_callback("shh", "pay_1", "sub_1")));
        assert!(!accepts_callback("shh", &sub, &signed_callback("shh", "pay_2", "sub_1")));
    }

    #[tokio::test]
    async fn key_is_public() {
        let app = payment_routes().with_state(AppState::fake());
        let res = app
            .oneshot(Request::get("/razorpaykey").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["key"], "rzp_test_key");
    }

    #[tokio::test]
    async fn subscribe_requires_login() {
        let app = payment_routes().with_state(AppState::fake());
        let res = app
            .oneshot(Request::get("/subscribe").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
