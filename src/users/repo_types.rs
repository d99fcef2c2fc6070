use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::storage::MediaRef;

pub const ROLE_USER: &str = "user";
pub const ROLE_ADMIN: &str = "admin";
pub const SUBSCRIPTION_ACTIVE: &str = "active";

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String, // argon2, never serialized
    pub avatar_public_id: String,
    pub avatar_url: String,
    pub role: String,
    pub subscription_id: Option<String>,
    pub subscription_status: Option<String>,
    pub reset_password_token: Option<String>, // sha256 hex of the emailed token
    pub reset_password_expire: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub status: String,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.status == SUBSCRIPTION_ACTIVE
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PlaylistItem {
    pub course: Uuid,
    pub poster: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    pub fn subscription(&self) -> Option<Subscription> {
        match (&self.subscription_id, &self.subscription_status) {
            (Some(id), Some(status)) => Some(Subscription {
                id: id.clone(),
                status: status.clone(),
            }),
            _ => None,
        }
    }

    pub fn has_active_subscription(&self) -> bool {
        self.subscription().is_some_and(|s| s.is_active())
    }

    pub fn avatar(&self) -> MediaRef {
        MediaRef {
            public_id: self.avatar_public_id.clone(),
            url: self.avatar_url.clone(),
        }
    }
}

/// What clients get to see of a user.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub avatar: MediaRef,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<Subscription>,
    pub playlist: Vec<PlaylistItem>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl PublicUser {
    pub fn new(user: &User, playlist: Vec<PlaylistItem>) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            avatar: user.avatar(),
            role: user.role.clone(),
            subscription: user.subscription(),
            playlist,
            created_at: user.created_at,
        }
    }
}
