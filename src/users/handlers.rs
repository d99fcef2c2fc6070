use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post, put},
    Router,
};
use time::{Duration, OffsetDateTime};
use tracing::{error, info, instrument, warn};

use super::{
    dto::{
        ChangePasswordRequest, ForgotPasswordRequest, PlaylistRequest, ProfileResponse,
        ResetPasswordRequest, UpdateProfileRequest,
    },
    repo::{add_to_playlist, playlist_for, remove_from_playlist},
    repo_types::{PlaylistItem, PublicUser, User},
    services::{
        delete_account, hash_reset_token, is_valid_email, issue_reset_token, normalize_email,
        parse_id, reset_url,
    },
};
use crate::{
    auth::{
        cookie::{expired_cookie, set_cookie_headers},
        extractors::CurrentUser,
        password::{hash_password_blocking, verify_password_blocking, MIN_PASSWORD_LEN},
    },
    courses::repo_types::Course,
    email::password_reset_body,
    error::{ApiError, ApiResult},
    extract::{Json, Path, Query},
    response::{Empty, Envelope},
    state::AppState,
    storage::MediaKind,
    upload::{store_upload, MultipartForm},
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(profile).delete(delete_profile))
        .route("/changepassword", put(change_password))
        .route("/updateprofile", put(update_profile))
        .route(
            "/updateprofilepicture",
            put(update_profile_picture)
                .layer(DefaultBodyLimit::max(MediaKind::Avatar.max_bytes() + 64 * 1024)),
        )
        .route("/forgotpassword", post(forgot_password))
        .route("/resetpassword/:token", put(reset_password))
        .route("/addtoplaylist", post(add_playlist_item))
        .route("/removefromplaylist", delete(remove_playlist_item))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Envelope<ProfileResponse>>> {
    let playlist = playlist_for(&state.db, user.id).await?;
    Ok(Json(Envelope::data(ProfileResponse {
        user: PublicUser::new(&user, playlist),
    })))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn delete_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<(StatusCode, HeaderMap, Json<Envelope<Empty>>)> {
    let outcome = delete_account(&state, &user).await?;
    state.user_changed();
    info!(?outcome, "profile deleted");

    let headers = set_cookie_headers(expired_cookie(state.config.cookie.secure))?;
    Ok((
        StatusCode::ACCEPTED,
        headers,
        Json(Envelope::message("Your Profile Deleted Successfully!")),
    ))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> ApiResult<Json<Envelope<Empty>>> {
    if payload.old_password.is_empty() || payload.new_password.is_empty() {
        return Err(ApiError::bad_request("Please enter all field"));
    }
    if !verify_password_blocking(payload.old_password, user.password_hash.clone()).await? {
        warn!("old password mismatch");
        return Err(ApiError::bad_request("Old Password Is Incorrect"));
    }
    if payload.new_password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let hash = hash_password_blocking(payload.new_password).await?;
    User::update_password(&state.db, user.id, &hash).await?;
    state.user_changed();
    Ok(Json(Envelope::message("Password Updated Successfully!")))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> ApiResult<Json<Envelope<Empty>>> {
    let name = payload
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| user.name.clone());
    let email = payload
        .email
        .map(|e| normalize_email(&e))
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| user.email.clone());

    if email != user.email {
        if !is_valid_email(&email) {
            return Err(ApiError::bad_request("Invalid email"));
        }
        if User::find_by_email(&state.db, &email).await?.is_some() {
            return Err(ApiError::Conflict("Email already in use".into()));
        }
    }

    User::update_profile(&state.db, user.id, &name, &email).await?;
    state.user_changed();
    Ok(Json(Envelope::message("Profile Updated Successfully!")))
}

#[instrument(skip(state, user, form), fields(user_id = %user.id))]
pub async fn update_profile_picture(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    form: MultipartForm,
) -> ApiResult<Json<Envelope<Empty>>> {
    let file = form
        .file
        .ok_or_else(|| ApiError::bad_request("Please upload a file"))?;

    let avatar = store_upload(state.storage.as_ref(), MediaKind::Avatar, file).await?;
    if let Err(e) = User::update_avatar(&state.db, user.id, &avatar).await {
        let _ = state.storage.destroy(&avatar.public_id).await;
        return Err(e.into());
    }
    if let Err(e) = state.storage.destroy(&user.avatar_public_id).await {
        warn!(error = %e, "old avatar cleanup failed");
    }
    state.user_changed();
    Ok(Json(Envelope::message("Profile Picture Updated Successfully!")))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> ApiResult<Json<Envelope<Empty>>> {
    let email = normalize_email(&payload.email);
    if email.is_empty() {
        return Err(ApiError::bad_request("Please Enter Your Email!"));
    }
    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| ApiError::bad_request(format!("User with email: {email} doesn't exist!")))?;

    let ttl_minutes = state.config.reset_token_ttl_minutes;
    let token = issue_reset_token(OffsetDateTime::now_utc(), Duration::minutes(ttl_minutes));
    User::set_reset_token(&state.db, user.id, &token.hash, token.expires_at).await?;

    let url = reset_url(&state.config.frontend_url, &token.plain);
    if let Err(e) = state
        .mailer
        .send(&user.email, "CourseHub Reset Password", &password_reset_body(&url, ttl_minutes))
        .await
    {
        error!(error = %e, user_id = %user.id, "reset email failed");
        return Err(ApiError::Internal("send reset email".into()));
    }

    info!(user_id = %user.id, "reset token issued");
    Ok(Json(Envelope::message(format!(
        "Reset token send Successfully, To email: {}",
        user.email
    ))))
}

#[instrument(skip(state, token, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> ApiResult<Json<Envelope<Empty>>> {
    let user = User::find_by_reset_token(&state.db, &hash_reset_token(&token), OffsetDateTime::now_utc())
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Token is Invalid or has been Expired!".into()))?;

    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let hash = hash_password_blocking(payload.password).await?;
    User::update_password(&state.db, user.id, &hash).await?;
    state.user_changed();
    info!(user_id = %user.id, "password reset");
    Ok(Json(Envelope::message("Password Changed Successfully!")))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn add_playlist_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<PlaylistRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<Empty>>)> {
    let course_id = parse_id(&payload.id, "Course")?;
    let course = Course::find_by_id(&state.db, course_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Invalid Course ID!"))?;

    let item = PlaylistItem {
        course: course.id,
        poster: course.poster_url,
    };
    if !add_to_playlist(&state.db, user.id, &item).await? {
        return Err(ApiError::Conflict("Item Already Exist!".into()));
    }
    state.user_changed();
    Ok((
        StatusCode::CREATED,
        Json(Envelope::message("Course Added To Playlist!")),
    ))
}

#[instrument(skip(state, user, query), fields(user_id = %user.id))]
pub async fn remove_playlist_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<PlaylistRequest>,
) -> ApiResult<Json<Envelope<Empty>>> {
    let course_id = parse_id(&query.id, "Course")?;
    let course = Course::find_by_id(&state.db, course_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Invalid Course ID!"))?;

    remove_from_playlist(&state.db, user.id, course.id).await?;
    state.user_changed();
    Ok(Json(Envelope::message("Course Removed From Playlist!")))
}
