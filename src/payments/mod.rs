use crate::state::AppState;
use axum::Router;

pub mod gateway;
pub mod handlers;
pub mod repo;
pub mod teardown;

pub fn router() -> Router<AppState> {
    handlers::payment_routes()
}
