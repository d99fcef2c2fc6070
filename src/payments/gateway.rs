use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use crate::config::PaymentConfig;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0} not found at provider")]
    NotFound(String),
    #[error("subscription {0} is already cancelled")]
    AlreadyCancelled(String),
    #[error("provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderSubscription {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderRefund {
    pub id: String,
    pub payment_id: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn key_id(&self) -> &str;
    async fn create_subscription(&self, plan_id: &str) -> Result<ProviderSubscription, GatewayError>;
    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), GatewayError>;
    async fn refund_payment(&self, payment_id: &str) -> Result<ProviderRefund, GatewayError>;
}

/// Checks `razorpay_signature = HMAC_SHA256(secret, "{payment_id}|{subscription_id}")`.
pub fn verify_payment_signature(
    secret: &str,
    payment_id: &str,
    subscription_id: &str,
    signature_hex: &str,
) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("{payment_id}|{subscription_id}").as_bytes());
    mac.verify_slice(&signature).is_ok()
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    description: String,
}

/// Razorpay REST client authenticated with basic auth.
pub struct RazorpayGateway {
    http: reqwest::Client,
    api_base: String,
    key_id: String,
    key_secret: String,
}

impl RazorpayGateway {
    pub fn new(cfg: &PaymentConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            key_id: cfg.key_id.clone(),
            key_secret: cfg.key_secret.clone(),
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}{}", self.api_base, path))
            .basic_auth(&self.key_id, Some(&self.key_secret))
    }

    async fn rejection(resource: &str, res: reqwest::Response) -> GatewayError {
        let status = res.status();
        let message = res
            .json::<ErrorEnvelope>()
            .await
            .map(|e| e.error.description)
            .unwrap_or_default();
        classify(resource, status, message)
    }
}

fn classify(resource: &str, status: StatusCode, message: String) -> GatewayError {
    if status == StatusCode::NOT_FOUND {
        return GatewayError::NotFound(resource.to_string());
    }
    if status == StatusCode::BAD_REQUEST && message.to_lowercase().contains("cancelled") {
        return GatewayError::AlreadyCancelled(resource.to_string());
    }
    GatewayError::Rejected {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn create_subscription(&self, plan_id: &str) -> Result<ProviderSubscription, GatewayError> {
        let res = self
            .post("/subscriptions")
            .json(&serde_json::json!({
                "plan_id": plan_id,
                "customer_notify": 1,
                "total_count": 12,
            }))
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(Self::rejection(plan_id, res).await);
        }
        let sub = res.json::<ProviderSubscription>().await?;
        debug!(subscription_id = %sub.id, "provider subscription created");
        Ok(sub)
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), GatewayError> {
        let res = self
            .post(&format!("/subscriptions/{subscription_id}/cancel"))
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(Self::rejection(subscription_id, res).await);
        }
        debug!(%subscription_id, "provider subscription cancelled");
        Ok(())
    }

    async fn refund_payment(&self, payment_id: &str) -> Result<ProviderRefund, GatewayError> {
        let res = self
            .post(&format!("/payments/{payment_id}/refund"))
            .json(&serde_json::json!({}))
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(Self::rejection(payment_id, res).await);
        }
        let refund = res.json::<ProviderRefund>().await?;
        debug!(%payment_id, refund_id = %refund.id, "payment refunded");
        Ok(refund)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, msg: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(msg.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_matching_signature() {
        let sig = sign("shh", "pay_1|sub_1");
        assert!(verify_payment_signature("shh", "pay_1", "sub_1", &sig));
    }

    #[test]
    fn rejects_tampered_or_malformed_signature() {
        let sig = sign("shh", "pay_1|sub_1");
        assert!(!verify_payment_signature("shh", "pay_2", "sub_1", &sig));
        assert!(!verify_payment_signature("other", "pay_1", "sub_1", &sig));
        assert!(!verify_payment_signature("shh", "pay_1", "sub_1", "zz-not-hex"));
    }

    #[test]
    fn classifies_provider_errors() {
        assert!(matches!(
            classify("sub_1", StatusCode::NOT_FOUND, String::new()),
            GatewayError::NotFound(_)
        ));
        assert!(matches!(
            classify(
                "sub_1",
                StatusCode::BAD_REQUEST,
                "Subscription is not cancellable in cancelled status.".into()
            ),
            GatewayError::AlreadyCancelled(_)
        ));
        assert!(matches!(
            classify("sub_1", StatusCode::BAD_GATEWAY, "upstream".into()),
            GatewayError::Rejected { status: 502, .. }
        ));
    }
}
