use std::sync::Arc;

use anyhow::Context;

mod app;
mod auth;
mod config;
mod courses;
mod email;
mod error;
mod events;
mod extract;
mod payments;
mod response;
mod state;
mod stats;
mod storage;
mod upload;
mod users;

use crate::{
    config::AppConfig,
    events::EventBus,
    state::AppState,
    stats::{ensure_current_record, StatsAggregator},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "coursehub=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    let (events, rx) = EventBus::new();
    let app_state = AppState::init(config, events).await?;

    sqlx::migrate!("./migrations")
        .run(&app_state.db)
        .await
        .context("run migrations")?;

    let current = ensure_current_record(&app_state.db).await?;
    tracing::info!(stats_id = %current.id, "stats record ready");

    let aggregator = StatsAggregator::new(Arc::new(app_state.db.clone()));
    tokio::spawn(aggregator.run(rx));

    let app = app::build_app(app_state)?;
    app::serve(app).await
}
