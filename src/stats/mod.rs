pub mod aggregator;
pub mod handlers;
pub mod repo;
pub mod schedule;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// One period of the rollup series. Only the latest row is ever updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Stats {
    pub id: Uuid,
    pub users: i64,
    pub subscriptions: i64,
    pub views: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("no stats record present")]
    NoStatsRecord,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserCounts {
    pub users: i64,
    pub active_subscriptions: i64,
}

/// Reads the primary collections and the rollup series.
#[async_trait]
pub trait StatsStore: Send + Sync {
    async fn latest(&self) -> anyhow::Result<Option<Stats>>;
    async fn recent(&self, limit: i64) -> anyhow::Result<Vec<Stats>>;
    async fn append_empty(&self) -> anyhow::Result<Stats>;
    async fn save_views(&self, id: Uuid, views: i64) -> anyhow::Result<()>;
    async fn save_user_counts(&self, id: Uuid, counts: UserCounts) -> anyhow::Result<()>;
    async fn course_views(&self) -> anyhow::Result<Vec<i64>>;
    async fn user_counts(&self) -> anyhow::Result<UserCounts>;
}

pub use aggregator::{ensure_current_record, recompute_user_counts, recompute_views, StatsAggregator};

pub fn router() -> axum::Router<crate::state::AppState> {
    handlers::routes()
}
