use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, put},
    Router,
};
use sqlx::PgPool;
use tracing::{info, instrument};

use super::{
    dto::UsersResponse,
    repo::playlist_for,
    repo_types::{PublicUser, User, ROLE_ADMIN, ROLE_USER},
    services::{delete_account, parse_id},
};
use crate::{
    auth::extractors::AdminUser,
    error::{ApiError, ApiResult},
    extract::{Json, Path},
    response::{Empty, Envelope},
    state::AppState,
};

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users))
        .route("/admin/user/:id", put(toggle_role).delete(delete_user))
}

async fn with_playlists(db: &PgPool, users: Vec<User>) -> anyhow::Result<Vec<PublicUser>> {
    let mut out = Vec::with_capacity(users.len());
    for user in users {
        let playlist = playlist_for(db, user.id).await?;
        out.push(PublicUser::new(&user, playlist));
    }
    Ok(out)
}

pub fn toggled_role(current: &str) -> &'static str {
    if current == ROLE_ADMIN {
        ROLE_USER
    } else {
        ROLE_ADMIN
    }
}

#[instrument(skip(state, _admin))]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<Envelope<UsersResponse>>> {
    let users = User::list_all(&state.db).await?;
    let users = with_playlists(&state.db, users).await?;
    Ok(Json(Envelope::with_message(
        "All Users In Database!",
        UsersResponse { users },
    )))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.0.id))]
pub async fn toggle_role(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Envelope<Empty>>> {
    let id = parse_id(&id, "User")?;
    let user = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Invalid User ID!"))?;

    let role = toggled_role(&user.role);
    User::set_role(&state.db, user.id, role).await?;
    state.user_changed();
    info!(user_id = %user.id, role, "role updated");
    Ok(Json(Envelope::message(format!("Role Updated to {role}!"))))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.0.id))]
pub async fn delete_user(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<Envelope<Empty>>)> {
    let id = parse_id(&id, "User")?;
    let user = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Invalid User ID!"))?;

    let outcome = delete_account(&state, &user).await?;
    state.user_changed();
    info!(user_id = %user.id, ?outcome, "user deleted by admin");
    Ok((
        StatusCode::ACCEPTED,
        Json(Envelope::message("User Deleted Successfully!")),
    ))
}
