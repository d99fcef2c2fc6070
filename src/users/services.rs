use lazy_static::lazy_static;
use rand::RngCore;
use regex::Regex;
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::{repo::AccountStore, repo_types::User};
use crate::{
    error::ApiError,
    payments::{
        gateway::PaymentGateway,
        repo::PaymentStore,
        teardown::{teardown_subscription, TeardownOutcome},
    },
    state::AppState,
    storage::MediaStore,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct ResetToken {
    /// Sent to the user; never stored.
    pub plain: String,
    /// Stored on the user row.
    pub hash: String,
    pub expires_at: OffsetDateTime,
}

pub fn hash_reset_token(plain: &str) -> String {
    hex::encode(Sha256::digest(plain.as_bytes()))
}

pub fn issue_reset_token(now: OffsetDateTime, ttl: Duration) -> ResetToken {
    let mut bytes = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut bytes);
    let plain = hex::encode(bytes);
    ResetToken {
        hash: hash_reset_token(&plain),
        plain,
        expires_at: now + ttl,
    }
}

pub fn reset_url(frontend_url: &str, token: &str) -> String {
    format!("{}/resetpassword/{}", frontend_url.trim_end_matches('/'), token)
}

/// Everything an account removal touches.
pub struct AccountRemoval<'a> {
    pub gateway: &'a dyn PaymentGateway,
    pub payments: &'a dyn PaymentStore,
    pub accounts: &'a dyn AccountStore,
    pub storage: &'a dyn MediaStore,
    pub refund_window: Duration,
}

impl AccountRemoval<'_> {
    /// Subscription teardown first, then the row, then the avatar. A failed refund
    /// leaves the account in place.
    pub async fn run(&self, user: &User, now: OffsetDateTime) -> Result<TeardownOutcome, ApiError> {
        let outcome = teardown_subscription(
            self.gateway,
            self.payments,
            user.subscription().as_ref(),
            self.refund_window,
            now,
        )
        .await?;

        self.accounts.delete_user(user.id).await?;

        if let Err(e) = self.storage.destroy(&user.avatar_public_id).await {
            tracing::warn!(error = %e, user_id = %user.id, "avatar cleanup failed");
        }
        Ok(outcome)
    }
}

pub async fn delete_account(state: &AppState, user: &User) -> Result<TeardownOutcome, ApiError> {
    AccountRemoval {
        gateway: state.payments.as_ref(),
        payments: &state.db,
        accounts: &state.db,
        storage: state.storage.as_ref(),
        refund_window: state.config.refund_window(),
    }
    .run(user, OffsetDateTime::now_utc())
    .await
}

pub fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::not_found(format!("Invalid {what} ID!")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.de"));
        assert_eq!(normalize_email("  Ann@Example.COM "), "ann@example.com");
    }

    #[test]
    fn reset_token_hash_matches_and_expires() {
        let now = datetime!(2026-10-19 10:00:00 UTC);
        let token = issue_reset_token(now, Duration::minutes(15));
        assert_eq!(token.plain.len(), 40);
        assert_ne!(token.plain, token.hash);
        assert_eq!(hash_reset_token(&token.plain), token.hash);
        assert_eq!(token.expires_at, datetime!(2026-10-19 10:15:00 UTC));
    }

    #[test]
    fn tokens_are_unique() {
        let now = OffsetDateTime::now_utc();
        let a = issue_reset_token(now, Duration::minutes(1));
        let b = issue_reset_token(now, Duration::minutes(1));
        assert_ne!(a.plain, b.plain);
    }

    #[test]
    fn reset_url_trims_trailing_slash() {
        assert_eq!(
            reset_url("https://app.local/", "abc"),
            "https://app.local/resetpassword/abc"
        );
    }

    #[test]
    fn bad_ids_are_not_found() {
        assert!(matches!(parse_id("nope", "Course"), Err(ApiError::NotFound(_))));
        assert!(parse_id(&Uuid::nil().to_string(), "Course").is_ok());
    }

    mod removal {
        use std::sync::Mutex;

        use async_trait::async_trait;

        use super::*;
        use crate::payments::teardown::tests::{FakeGateway, MemoryPayments};
        use crate::state::tests::FakeStorage;
        use crate::users::repo_types::tests::sample_user;

        const NOW: OffsetDateTime = datetime!(2026-10-19 12:00:00 UTC);

        /// What the other collaborators had seen when the row was deleted.
        #[derive(Debug)]
        struct Snapshot {
            user_id: Uuid,
            gateway_calls: Vec<String>,
            payments_left: usize,
            destroyed: Vec<String>,
        }

        struct RecordingAccounts<'a> {
            gateway: &'a FakeGateway,
            payments: &'a MemoryPayments,
            storage: &'a FakeStorage,
            deleted: Mutex<Vec<Snapshot>>,
        }

        impl<'a> RecordingAccounts<'a> {
            fn new(gateway: &'a FakeGateway, payments: &'a MemoryPayments, storage: &'a FakeStorage) -> Self {
                Self {
                    gateway,
                    payments,
                    storage,
                    deleted: Mutex::new(Vec::new()),
                }
            }
        }

        #[async_trait]
        impl AccountStore for RecordingAccounts<'_> {
            async fn delete_user(&self, id: Uuid) -> anyhow::Result<()> {
                self.deleted.lock().unwrap().push(Snapshot {
                    user_id: id,
                    gateway_calls: self.gateway.calls(),
                    payments_left: self.payments.len(),
                    destroyed: self.storage.destroyed(),
                });
                Ok(())
            }
        }

        fn subscriber() -> User {
            let mut user = sample_user();
            user.subscription_id = Some("sub_1".into());
            user.subscription_status = Some("active".into());
            user
        }

        #[tokio::test]
        async fn teardown_then_row_then_avatar() {
            let gateway = FakeGateway::default();
            let payments = MemoryPayments::with_payment("sub_1", "pay_1", NOW - Duration::days(1));
            let storage = FakeStorage::default();
            let accounts = RecordingAccounts::new(&gateway, &payments, &storage);
            let user = subscriber();

            let outcome = AccountRemoval {
                gateway: &gateway,
                payments: &payments,
                accounts: &accounts,
                storage: &storage,
                refund_window: Duration::days(7),
            }
            .run(&user, NOW)
            .await
            .unwrap();

            assert!(outcome.refunded());
            let deleted = accounts.deleted.lock().unwrap();
            assert_eq!(deleted.len(), 1);
            let snap = &deleted[0];
            assert_eq!(snap.user_id, user.id);
            assert_eq!(snap.gateway_calls, vec!["cancel:sub_1".to_string(), "refund:pay_1".to_string()]);
            assert_eq!(snap.payments_left, 0);
            assert!(snap.destroyed.is_empty());
            assert_eq!(storage.destroyed(), vec!["avatars/a.png"]);
        }

        #[tokio::test]
        async fn failed_refund_keeps_the_account() {
            let gateway = FakeGateway {
                refund_fails: true,
                ..Default::default()
            };
            let payments = MemoryPayments::with_payment("sub_1", "pay_1", NOW - Duration::days(1));
            let storage = FakeStorage::default();
            let accounts = RecordingAccounts::new(&gateway, &payments, &storage);

            let err = AccountRemoval {
                gateway: &gateway,
                payments: &payments,
                accounts: &accounts,
                storage: &storage,
                refund_window: Duration::days(7),
            }
            .run(&subscriber(), NOW)
            .await
            .unwrap_err();

            assert!(err.status_code().is_server_error());
            assert!(accounts.deleted.lock().unwrap().is_empty());
            assert!(storage.destroyed().is_empty());
            assert_eq!(payments.len(), 1);
        }

        #[tokio::test]
        async fn free_account_skips_teardown() {
            let gateway = FakeGateway::default();
            let payments = MemoryPayments::default();
            let storage = FakeStorage::default();
            let accounts = RecordingAccounts::new(&gateway, &payments, &storage);

            AccountRemoval {
                gateway: &gateway,
                payments: &payments,
                accounts: &accounts,
                storage: &storage,
                refund_window: Duration::days(7),
            }
            .run(&sample_user(), NOW)
            .await
            .unwrap();

            assert!(gateway.calls().is_empty());
            assert_eq!(accounts.deleted.lock().unwrap().len(), 1);
            assert_eq!(storage.destroyed(), vec!["avatars/a.png"]);
        }
    }
}
