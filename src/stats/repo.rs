use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{Stats, StatsStore, UserCounts};

#[async_trait]
impl StatsStore for PgPool {
    async fn latest(&self) -> anyhow::Result<Option<Stats>> {
        let row = sqlx::query_as::<_, Stats>(
            r#"
            SELECT id, users, subscriptions, views, created_at, updated_at
              FROM stats
             ORDER BY created_at DESC, id DESC
             LIMIT 1
            "#,
        )
        .fetch_optional(self)
        .await
        .context("select latest stats")?;
        Ok(row)
    }

    async fn recent(&self, limit: i64) -> anyhow::Result<Vec<Stats>> {
        let rows = sqlx::query_as::<_, Stats>(
            r#"
            SELECT id, users, subscriptions, views, created_at, updated_at
              FROM stats
             ORDER BY created_at DESC, id DESC
             LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self)
        .await
        .context("select recent stats")?;
        Ok(rows)
    }

    async fn append_empty(&self) -> anyhow::Result<Stats> {
        let row = sqlx::query_as::<_, Stats>(
            r#"
            INSERT INTO stats (id)
            VALUES ($1)
            RETURNING id, users, subscriptions, views, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .fetch_one(self)
        .await
        .context("insert stats")?;
        Ok(row)
    }

    async fn save_views(&self, id: Uuid, views: i64) -> anyhow::Result<()> {
        sqlx::query("UPDATE stats SET views = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(views)
            .execute(self)
            .await
            .context("update stats views")?;
        Ok(())
    }

    async fn save_user_counts(&self, id: Uuid, counts: UserCounts) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE stats SET users = $2, subscriptions = $3, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(counts.users)
        .bind(counts.active_subscriptions)
        .execute(self)
        .await
        .context("update stats user counts")?;
        Ok(())
    }

    async fn course_views(&self) -> anyhow::Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT views FROM courses")
            .fetch_all(self)
            .await
            .context("select course views")?;
        Ok(rows.into_iter().map(|(v,)| v).collect())
    }

    async fn user_counts(&self) -> anyhow::Result<UserCounts> {
        let (users, active_subscriptions): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE subscription_status = 'active')
              FROM users
            "#,
        )
        .fetch_one(self)
        .await
        .context("count users")?;
        Ok(UserCounts {
            users,
            active_subscriptions,
        })
    }
}
