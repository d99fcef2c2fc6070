//! Keeps the latest [`Stats`] row consistent with users and courses.
//!
//! A single task consumes [`ChangeEvent`]s and the monthly snapshot timer, so every
//! write to the stats table comes from one place and read-modify-write cycles
//! never interleave.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

use super::{schedule, Stats, StatsError, StatsStore};
use crate::events::ChangeEvent;

pub async fn recompute_views(store: &dyn StatsStore) -> Result<Stats, StatsError> {
    let mut current = store.latest().await?.ok_or(StatsError::NoStatsRecord)?;
    let total: i64 = store.course_views().await?.into_iter().sum();
    store.save_views(current.id, total).await?;
    current.views = total;
    Ok(current)
}

pub async fn recompute_user_counts(store: &dyn StatsStore) -> Result<Stats, StatsError> {
    let mut current = store.latest().await?.ok_or(StatsError::NoStatsRecord)?;
    let counts = store.user_counts().await?;
    store.save_user_counts(current.id, counts).await?;
    current.users = counts.users;
    current.subscriptions = counts.active_subscriptions;
    Ok(current)
}

/// Startup bootstrap: guarantees a record exists before any event is handled.
pub async fn ensure_current_record(store: &dyn StatsStore) -> anyhow::Result<Stats> {
    match store.latest().await? {
        Some(s) => Ok(s),
        None => {
            let s = store.append_empty().await?;
            info!(stats_id = %s.id, "created initial stats record");
            Ok(s)
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Pending {
    courses: bool,
    users: bool,
}

impl Pending {
    fn mark(&mut self, event: ChangeEvent) {
        match event {
            ChangeEvent::CourseChanged => self.courses = true,
            ChangeEvent::UserChanged => self.users = true,
        }
    }
}

pub struct StatsAggregator {
    store: Arc<dyn StatsStore>,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn StatsStore>) -> Self {
        Self { store }
    }

    /// Runs until every [`crate::events::EventBus`] handle is dropped.
    pub async fn run(self, mut rx: UnboundedReceiver<ChangeEvent>) {
        info!("stats aggregator started");
        loop {
            let wait = schedule::until_next_snapshot(OffsetDateTime::now_utc());
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else {
                        info!("event bus closed, stats aggregator stopping");
                        break;
                    };
                    let mut pending = Pending::default();
                    pending.mark(event);
                    // Coalesce a burst into one recomputation per kind.
                    while let Ok(more) = rx.try_recv() {
                        pending.mark(more);
                    }
                    self.apply(pending).await;
                }
                _ = tokio::time::sleep(wait) => {
                    self.snapshot().await;
                }
            }
        }
    }

    async fn apply(&self, pending: Pending) {
        if pending.courses {
            match recompute_views(self.store.as_ref()).await {
                Ok(s) => debug!(stats_id = %s.id, views = s.views, "views recomputed"),
                Err(e) => self.report(e, "views"),
            }
        }
        if pending.users {
            match recompute_user_counts(self.store.as_ref()).await {
                Ok(s) => debug!(
                    stats_id = %s.id,
                    users = s.users,
                    subscriptions = s.subscriptions,
                    "user counts recomputed"
                ),
                Err(e) => self.report(e, "user counts"),
            }
        }
    }

    async fn snapshot(&self) {
        match self.store.append_empty().await {
            Ok(s) => info!(stats_id = %s.id, "monthly stats snapshot appended"),
            Err(e) => error!(error = %e, "monthly stats snapshot failed"),
        }
    }

    fn report(&self, err: StatsError, what: &str) {
        match err {
            StatsError::NoStatsRecord => warn!(what, "no stats record to update, skipping"),
            StatsError::Store(e) => error!(error = %e, what, "stats recomputation failed"),
        }
    }
}
