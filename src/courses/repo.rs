use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{Course, CourseWithLectures, Lecture};
use crate::storage::MediaRef;

const COURSE_COLUMNS: &str = "id, title, description, category, created_by, poster_public_id, \
     poster_url, views, num_of_videos, created_at";

const LECTURE_COLUMNS: &str = "id, course_id, title, description, video_public_id, video_url, position";

pub struct NewCourse<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub category: &'a str,
    pub created_by: &'a str,
    pub poster: &'a MediaRef,
}

pub struct NewLecture<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub video: &'a MediaRef,
}

/// Escapes LIKE metacharacters so user input matches literally.
fn contains_pattern(raw: &str) -> String {
    let escaped = raw
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

impl Course {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Course>> {
        let course = sqlx::query_as::<_, Course>(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await
        .context("find course")?;
        Ok(course)
    }

    /// Case-insensitive substring match on title and category.
    pub async fn search(db: &PgPool, keyword: &str, category: &str) -> anyhow::Result<Vec<Course>> {
        let rows = sqlx::query_as::<_, Course>(&format!(
            r#"
            SELECT {COURSE_COLUMNS} FROM courses
             WHERE title ILIKE $1 AND category ILIKE $2
             ORDER BY created_at DESC
            "#
        ))
        .bind(contains_pattern(keyword))
        .bind(contains_pattern(category))
        .fetch_all(db)
        .await
        .context("search courses")?;
        Ok(rows)
    }

    pub async fn create(db: &PgPool, new: NewCourse<'_>) -> anyhow::Result<Course> {
        let course = sqlx::query_as::<_, Course>(&format!(
            r#"
            INSERT INTO courses (id, title, description, category, created_by, poster_public_id, poster_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {COURSE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new.title)
        .bind(new.description)
        .bind(new.category)
        .bind(new.created_by)
        .bind(&new.poster.public_id)
        .bind(&new.poster.url)
        .fetch_one(db)
        .await
        .context("insert course")?;
        Ok(course)
    }

    /// Bumps the view counter; `None` when the course is gone.
    pub async fn increment_views(db: &PgPool, id: Uuid) -> anyhow::Result<Option<i64>> {
        let views = sqlx::query_scalar::<_, i64>(
            "UPDATE courses SET views = views + 1 WHERE id = $1 RETURNING views",
        )
        .bind(id)
        .fetch_optional(db)
        .await
        .context("increment course views")?;
        Ok(views)
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(id)
            .execute(db)
            .await
            .context("delete course")?;
        Ok(())
    }
}

#[async_trait]
pub trait CourseStore: Send + Sync {
    async fn delete_course(&self, id: Uuid) -> anyhow::Result<()>;
}

#[async_trait]
impl CourseStore for PgPool {
    async fn delete_course(&self, id: Uuid) -> anyhow::Result<()> {
        Course::delete(self, id).await
    }
}

pub async fn load_with_lectures(db: &PgPool, id: Uuid) -> anyhow::Result<Option<CourseWithLectures>> {
    let Some(course) = Course::find_by_id(db, id).await? else {
        return Ok(None);
    };
    let lectures = sqlx::query_as::<_, Lecture>(&format!(
        "SELECT {LECTURE_COLUMNS} FROM lectures WHERE course_id = $1 ORDER BY position ASC"
    ))
    .bind(id)
    .fetch_all(db)
    .await
    .context("list lectures")?;
    Ok(Some(CourseWithLectures::new(course, lectures)))
}

/// Appends a lecture and resyncs `num_of_videos` in one transaction.
///
/// The course row is locked so concurrent appends get distinct positions.
pub async fn append_lecture(
    db: &PgPool,
    course: &mut CourseWithLectures,
    new: NewLecture<'_>,
) -> anyhow::Result<Lecture> {
    let mut tx = db.begin().await.context("begin tx")?;

    sqlx::query("SELECT id FROM courses WHERE id = $1 FOR UPDATE")
        .bind(course.course.id)
        .execute(&mut *tx)
        .await
        .context("lock course")?;

    let position = sqlx::query_scalar::<_, i32>(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM lectures WHERE course_id = $1",
    )
    .bind(course.course.id)
    .fetch_one(&mut *tx)
    .await
    .context("next lecture position")?;

    let lecture = sqlx::query_as::<_, Lecture>(&format!(
        r#"
        INSERT INTO lectures (id, course_id, title, description, video_public_id, video_url, position)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {LECTURE_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(course.course.id)
    .bind(new.title)
    .bind(new.description)
    .bind(&new.video.public_id)
    .bind(&new.video.url)
    .bind(position)
    .fetch_one(&mut *tx)
    .await
    .context("insert lecture")?;

    sync_video_count(&mut tx, course.course.id).await?;
    tx.commit().await.context("commit tx")?;

    course.push_lecture(lecture.clone());
    Ok(lecture)
}

/// Removes a lecture row and resyncs `num_of_videos`. `None` if the lecture is not on this course.
pub async fn remove_lecture(
    db: &PgPool,
    course: &mut CourseWithLectures,
    lecture_id: Uuid,
) -> anyhow::Result<Option<Lecture>> {
    let mut tx = db.begin().await.context("begin tx")?;

    let deleted = sqlx::query("DELETE FROM lectures WHERE id = $1 AND course_id = $2")
        .bind(lecture_id)
        .bind(course.course.id)
        .execute(&mut *tx)
        .await
        .context("delete lecture")?
        .rows_affected();
    if deleted == 0 {
        tx.rollback().await.context("rollback tx")?;
        return Ok(None);
    }

    sync_video_count(&mut tx, course.course.id).await?;
    tx.commit().await.context("commit tx")?;

    Ok(course.remove_lecture(lecture_id))
}

async fn sync_video_count(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    course_id: Uuid,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE courses
           SET num_of_videos = (SELECT COUNT(*) FROM lectures WHERE course_id = $1)
         WHERE id = $1
        "#,
    )
    .bind(course_id)
    .execute(&mut **tx)
    .await
    .context("sync video count")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_patterns_are_literal() {
        assert_eq!(contains_pattern(""), "%%");
        assert_eq!(contains_pattern(" rust "), "%rust%");
        assert_eq!(contains_pattern("100%_off"), "%100\\%\\_off%");
    }
}
