use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::{delete, get, post},
    Router,
};
use tracing::{info, instrument, warn};

use super::{
    dto::{CourseQuery, CoursesResponse, LectureQuery, LecturesResponse},
    repo::{append_lecture, load_with_lectures, remove_lecture, NewCourse, NewLecture},
    repo_types::{Course, CourseSummary, LectureView},
    services::remove_course,
};
use crate::{
    auth::extractors::{require_subscriber, AdminUser, CurrentUser},
    error::{ApiError, ApiResult},
    extract::{Json, Path, Query},
    response::{Empty, Envelope},
    state::AppState,
    storage::MediaKind,
    upload::{store_upload, MultipartForm},
    users::services::parse_id,
};

const FORM_OVERHEAD: usize = 64 * 1024;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/courses", get(list_courses))
        .route("/course/:id", get(course_lectures))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/createcourse",
            post(create_course).layer(DefaultBodyLimit::max(MediaKind::Poster.max_bytes() + FORM_OVERHEAD)),
        )
        .route(
            "/course/:id",
            post(add_lecture)
                .layer(DefaultBodyLimit::max(MediaKind::LectureVideo.max_bytes() + FORM_OVERHEAD))
                .delete(delete_course),
        )
        .route("/lecture", delete(delete_lecture))
}

fn course_not_found() -> ApiError {
    ApiError::not_found("Course Not Found")
}

#[instrument(skip(state))]
pub async fn list_courses(
    State(state): State<AppState>,
    Query(q): Query<CourseQuery>,
) -> ApiResult<Json<Envelope<CoursesResponse>>> {
    let courses = Course::search(&state.db, &q.keyword, &q.category).await?;
    Ok(Json(Envelope::data(CoursesResponse {
        courses: courses.into_iter().map(CourseSummary::from).collect(),
    })))
}

#[instrument(skip(state, admin, form), fields(admin_id = %admin.0.id))]
pub async fn create_course(
    State(state): State<AppState>,
    admin: AdminUser,
    mut form: MultipartForm,
) -> ApiResult<(StatusCode, Json<Envelope<Empty>>)> {
    let [title, description, category, created_by] =
        form.require(["title", "description", "category", "createdBy"])?;
    let (title, description, category, created_by) = (
        title.to_string(),
        description.to_string(),
        category.to_string(),
        created_by.to_string(),
    );
    let file = form
        .file
        .take()
        .ok_or_else(|| ApiError::bad_request("Please add all fields"))?;

    let poster = store_upload(state.storage.as_ref(), MediaKind::Poster, file).await?;
    let created = Course::create(
        &state.db,
        NewCourse {
            title: &title,
            description: &description,
            category: &category,
            created_by: &created_by,
            poster: &poster,
        },
    )
    .await;
    let course = match created {
        Ok(c) => c,
        Err(e) => {
            let _ = state.storage.destroy(&poster.public_id).await;
            return Err(e.into());
        }
    };
    state.course_changed();
    info!(course_id = %course.id, "course created");

    Ok((
        StatusCode::CREATED,
        Json(Envelope::message(
            "Course Created Successfully. You can add lectures now.",
        )),
    ))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn course_lectures(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Envelope<LecturesResponse>>> {
    require_subscriber(&user)?;
    let id = parse_id(&id, "Course")?;

    let views = Course::increment_views(&state.db, id)
        .await?
        .ok_or_else(course_not_found)?;
    let course = load_with_lectures(&state.db, id)
        .await?
        .ok_or_else(course_not_found)?;
    state.course_changed();
    tracing::debug!(course_id = %id, views, "course viewed");

    Ok(Json(Envelope::data(LecturesResponse {
        lectures: course.lectures().iter().map(LectureView::from).collect(),
    })))
}

#[instrument(skip(state, admin, form), fields(admin_id = %admin.0.id))]
pub async fn add_lecture(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
    mut form: MultipartForm,
) -> ApiResult<(StatusCode, Json<Envelope<Empty>>)> {
    let id = parse_id(&id, "Course")?;
    let [title, description] = form.require(["title", "description"])?;
    let (title, description) = (title.to_string(), description.to_string());
    let file = form
        .file
        .take()
        .ok_or_else(|| ApiError::bad_request("Please add all fields"))?;

    let mut course = load_with_lectures(&state.db, id)
        .await?
        .ok_or_else(course_not_found)?;

    let video = store_upload(state.storage.as_ref(), MediaKind::LectureVideo, file).await?;
    let appended = append_lecture(
        &state.db,
        &mut course,
        NewLecture {
            title: &title,
            description: &description,
            video: &video,
        },
    )
    .await;
    let lecture = match appended {
        Ok(l) => l,
        Err(e) => {
            let _ = state.storage.destroy(&video.public_id).await;
            return Err(e.into());
        }
    };
    state.course_changed();
    info!(
        course_id = %id,
        lecture_id = %lecture.id,
        num_of_videos = course.course.num_of_videos,
        "lecture added"
    );

    Ok((
        StatusCode::CREATED,
        Json(Envelope::message("Lecture Added To Course!")),
    ))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.0.id))]
pub async fn delete_course(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Envelope<Empty>>> {
    let id = parse_id(&id, "Course")?;
    let course = load_with_lectures(&state.db, id)
        .await?
        .ok_or_else(course_not_found)?;

    remove_course(state.storage.as_ref(), &state.db, &course).await?;
    state.course_changed();
    info!(course_id = %id, lectures = course.lectures().len(), "course deleted");

    Ok(Json(Envelope::message("Course Deleted Successfully!")))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.0.id))]
pub async fn delete_lecture(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(q): Query<LectureQuery>,
) -> ApiResult<Json<Envelope<Empty>>> {
    let course_id = parse_id(&q.course_id, "Course")?;
    let lecture_id = parse_id(&q.lecture_id, "Lecture")?;

    let mut course = load_with_lectures(&state.db, course_id)
        .await?
        .ok_or_else(course_not_found)?;
    let video_id = course
        .lectures()
        .iter()
        .find(|l| l.id == lecture_id)
        .map(|l| l.video_public_id.clone())
        .ok_or_else(|| ApiError::not_found("Lecture Not Found"))?;

    state.storage.destroy(&video_id).await?;
    if remove_lecture(&state.db, &mut course, lecture_id).await?.is_none() {
        warn!(%course_id, %lecture_id, "lecture vanished during delete");
        return Err(ApiError::not_found("Lecture Not Found"));
    }
    state.course_changed();
    info!(%course_id, %lecture_id, num_of_videos = course.course.num_of_videos, "lecture deleted");

    Ok(Json(Envelope::message("Lecture Deleted Successfully!")))
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn lectures_need_login() {
        let app = read_routes().with_state(AppState::fake());
        let res = app
            .oneshot(
                Request::get(format!("/course/{}", uuid::Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn course_writes_need_login() {
        let app = write_routes().with_state(AppState::fake());
        let res = app
            .oneshot(
                Request::delete("/lecture?courseId=x&lectureId=y")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
