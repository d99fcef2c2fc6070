use axum::{
    extract::{DefaultBodyLimit, FromRef, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        cookie::{expired_cookie, session_cookie, set_cookie_headers},
        jwt::JwtKeys,
        password::{hash_password_blocking, verify_password_blocking, MIN_PASSWORD_LEN},
    },
    error::{ApiError, ApiResult},
    extract::Json,
    response::{Empty, Envelope},
    state::AppState,
    storage::MediaKind,
    upload::{store_upload, MultipartForm},
    users::{
        repo::{playlist_for, NewUser},
        repo_types::{PublicUser, User},
        services::{is_valid_email, normalize_email},
    },
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/register",
            post(register).layer(DefaultBodyLimit::max(MediaKind::Avatar.max_bytes() + 64 * 1024)),
        )
        .route("/login", post(login))
        .route("/logout", get(logout))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserPayload {
    pub user: PublicUser,
}

fn session_headers(state: &AppState, user: &User) -> ApiResult<HeaderMap> {
    let keys = JwtKeys::from_ref(state);
    let token = keys.sign(user.id)?;
    set_cookie_headers(session_cookie(&token, keys.ttl, state.config.cookie.secure))
}

#[instrument(skip(state, form))]
pub async fn register(
    State(state): State<AppState>,
    mut form: MultipartForm,
) -> ApiResult<(StatusCode, HeaderMap, Json<Envelope<UserPayload>>)> {
    let [name, email, password] = form
        .require(["name", "email", "password"])
        .map_err(|_| ApiError::bad_request("Please enter all field"))?;
    let (name, email, password) = (name.to_string(), normalize_email(email), password.to_string());
    let file = form
        .file
        .take()
        .ok_or_else(|| ApiError::bad_request("Please enter all field"))?;

    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(ApiError::bad_request("Invalid email"));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if User::find_by_email(&state.db, &email).await?.is_some() {
        warn!(%email, "email already registered");
        return Err(ApiError::Conflict("User Already Exist".into()));
    }

    let avatar = store_upload(state.storage.as_ref(), MediaKind::Avatar, file).await?;
    let hash = hash_password_blocking(password).await?;

    let created = User::create(
        &state.db,
        NewUser {
            name: &name,
            email: &email,
            password_hash: &hash,
            avatar: &avatar,
        },
    )
    .await;
    let user = match created {
        Ok(u) => u,
        Err(e) => {
            // Don't leave an orphaned avatar behind.
            let _ = state.storage.destroy(&avatar.public_id).await;
            return Err(e.into());
        }
    };
    state.user_changed();

    let headers = session_headers(&state, &user)?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        headers,
        Json(Envelope::with_message(
            "User Registered Successfully!",
            UserPayload {
                user: PublicUser::new(&user, vec![]),
            },
        )),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<(HeaderMap, Json<Envelope<UserPayload>>)> {
    let email = normalize_email(&payload.email);
    if email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Please enter all field"));
    }

    let invalid = || ApiError::Unauthorized("Incorrect Email or Password".into());
    let user = match User::find_by_email(&state.db, &email).await? {
        Some(u) => u,
        None => {
            warn!(%email, "login unknown email");
            return Err(invalid());
        }
    };
    if !verify_password_blocking(payload.password, user.password_hash.clone()).await? {
        warn!(%email, user_id = %user.id, "login invalid password");
        return Err(invalid());
    }

    let headers = session_headers(&state, &user)?;
    let playlist = playlist_for(&state.db, user.id).await?;
    info!(user_id = %user.id, "user logged in");
    Ok((
        headers,
        Json(Envelope::with_message(
            format!("Welcome back, {}", user.name),
            UserPayload {
                user: PublicUser::new(&user, playlist),
            },
        )),
    ))
}

pub async fn logout(State(state): State<AppState>) -> ApiResult<(HeaderMap, Json<Envelope<Empty>>)> {
    let headers = set_cookie_headers(expired_cookie(state.config.cookie.secure))?;
    Ok((headers, Json(Envelope::message("Logged Out Successfully!"))))
}
