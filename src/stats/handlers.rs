use axum::{extract::State, routing::get, Router};
use serde::Serialize;
use tracing::instrument;

use super::{Stats, StatsStore};
use crate::{
    auth::extractors::AdminUser, error::ApiResult, extract::Json, response::Envelope, state::AppState,
};

const DASHBOARD_MONTHS: usize = 12;

pub fn routes() -> Router<AppState> {
    Router::new().route("/admin/stats", get(dashboard))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsPoint {
    pub users: i64,
    pub subscriptions: i64,
    pub views: i64,
}

impl From<&Stats> for StatsPoint {
    fn from(s: &Stats) -> Self {
        Self {
            users: s.users,
            subscriptions: s.subscriptions,
            views: s.views,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trend {
    pub count: i64,
    pub percentage: f64,
    pub profit: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    /// Oldest first, left-padded with zeros to twelve months.
    pub stats: Vec<StatsPoint>,
    pub users: Trend,
    pub subscriptions: Trend,
    pub views: Trend,
}

fn trend(current: i64, previous: i64) -> Trend {
    let percentage = if previous == 0 {
        (current * 100) as f64
    } else {
        (current - previous) as f64 / previous as f64 * 100.0
    };
    Trend {
        count: current,
        percentage,
        profit: percentage >= 0.0,
    }
}

/// `recent` is newest first, as returned by [`StatsStore::recent`].
pub fn build_dashboard(recent: &[Stats]) -> Dashboard {
    let zero = StatsPoint {
        users: 0,
        subscriptions: 0,
        views: 0,
    };
    let mut points: Vec<StatsPoint> = recent
        .iter()
        .take(DASHBOARD_MONTHS)
        .rev()
        .map(StatsPoint::from)
        .collect();
    let padding = DASHBOARD_MONTHS - points.len();
    points.splice(0..0, std::iter::repeat(zero).take(padding));

    let last = points[DASHBOARD_MONTHS - 1];
    let prev = points[DASHBOARD_MONTHS - 2];
    Dashboard {
        users: trend(last.users, prev.users),
        subscriptions: trend(last.subscriptions, prev.subscriptions),
        views: trend(last.views, prev.views),
        stats: points,
    }
}

#[instrument(skip(state, _admin))]
pub async fn dashboard(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<Envelope<Dashboard>>> {
    let recent = StatsStore::recent(&state.db, DASHBOARD_MONTHS as i64).await?;
    Ok(Json(Envelope::data(build_dashboard(&recent))))
}
