use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{PlaylistItem, Subscription, User};
use crate::storage::MediaRef;

const USER_COLUMNS: &str = "id, name, email, password_hash, avatar_public_id, avatar_url, role, \
     subscription_id, subscription_status, reset_password_token, reset_password_expire, created_at";

pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub avatar: &'a MediaRef,
}

impl User {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await
            .context("find user by id")?;
        Ok(user)
    }

    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(db)
            .await
            .context("find user by email")?;
        Ok(user)
    }

    pub async fn list_all(db: &PgPool) -> anyhow::Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"
        ))
        .fetch_all(db)
        .await
        .context("list users")?;
        Ok(users)
    }

    pub async fn create(db: &PgPool, new: NewUser<'_>) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, name, email, password_hash, avatar_public_id, avatar_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new.name)
        .bind(new.email)
        .bind(new.password_hash)
        .bind(&new.avatar.public_id)
        .bind(&new.avatar.url)
        .fetch_one(db)
        .await
        .context("insert user")?;
        Ok(user)
    }

    pub async fn update_profile(db: &PgPool, id: Uuid, name: &str, email: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET name = $2, email = $3 WHERE id = $1")
            .bind(id)
            .bind(name)
            .bind(email)
            .execute(db)
            .await
            .context("update profile")?;
        Ok(())
    }

    pub async fn update_password(db: &PgPool, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
               SET password_hash = $2, reset_password_token = NULL, reset_password_expire = NULL
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(db)
        .await
        .context("update password")?;
        Ok(())
    }

    pub async fn update_avatar(db: &PgPool, id: Uuid, avatar: &MediaRef) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET avatar_public_id = $2, avatar_url = $3 WHERE id = $1")
            .bind(id)
            .bind(&avatar.public_id)
            .bind(&avatar.url)
            .execute(db)
            .await
            .context("update avatar")?;
        Ok(())
    }

    pub async fn set_role(db: &PgPool, id: Uuid, role: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET role = $2 WHERE id = $1")
            .bind(id)
            .bind(role)
            .execute(db)
            .await
            .context("update role")?;
        Ok(())
    }

    pub async fn set_subscription(db: &PgPool, id: Uuid, sub: Option<&Subscription>) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET subscription_id = $2, subscription_status = $3 WHERE id = $1")
            .bind(id)
            .bind(sub.map(|s| s.id.as_str()))
            .bind(sub.map(|s| s.status.as_str()))
            .execute(db)
            .await
            .context("update subscription")?;
        Ok(())
    }

    pub async fn set_reset_token(
        db: &PgPool,
        id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET reset_password_token = $2, reset_password_expire = $3 WHERE id = $1")
            .bind(id)
            .bind(token_hash)
            .bind(expires_at)
            .execute(db)
            .await
            .context("store reset token")?;
        Ok(())
    }

    pub async fn find_by_reset_token(
        db: &PgPool,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS} FROM users
             WHERE reset_password_token = $1 AND reset_password_expire > $2
            "#
        ))
        .bind(token_hash)
        .bind(now)
        .fetch_optional(db)
        .await
        .context("find user by reset token")?;
        Ok(user)
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(db)
            .await
            .context("delete user")?;
        Ok(())
    }
}

/// Row removal for accounts, kept behind a seam so deletion order can be exercised.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn delete_user(&self, id: Uuid) -> anyhow::Result<()>;
}

#[async_trait]
impl AccountStore for PgPool {
    async fn delete_user(&self, id: Uuid) -> anyhow::Result<()> {
        User::delete(self, id).await
    }
}

pub async fn playlist_for(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<PlaylistItem>> {
    let rows = sqlx::query_as::<_, PlaylistItem>(
        r#"
        SELECT course_id AS course, poster_url AS poster
          FROM playlist_items
         WHERE user_id = $1
         ORDER BY added_at ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await
    .context("list playlist")?;
    Ok(rows)
}

/// Returns false when the course was already in the playlist.
pub async fn add_to_playlist(db: &PgPool, user_id: Uuid, item: &PlaylistItem) -> anyhow::Result<bool> {
    let res = sqlx::query(
        r#"
        INSERT INTO playlist_items (user_id, course_id, poster_url)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, course_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(item.course)
    .bind(&item.poster)
    .execute(db)
    .await
    .context("add playlist item")?;
    Ok(res.rows_affected() == 1)
}

pub async fn remove_from_playlist(db: &PgPool, user_id: Uuid, course_id: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM playlist_items WHERE user_id = $1 AND course_id = $2")
        .bind(user_id)
        .bind(course_id)
        .execute(db)
        .await
        .context("remove playlist item")?;
    Ok(())
}
