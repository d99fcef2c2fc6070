use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::storage::MediaRef;

#[derive(Debug, Clone, FromRow)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub created_by: String,
    pub poster_public_id: String,
    pub poster_url: String,
    pub views: i64,
    pub num_of_videos: i32,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct Lecture {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub description: String,
    pub video_public_id: String,
    pub video_url: String,
    pub position: i32,
}

impl Course {
    pub fn poster(&self) -> MediaRef {
        MediaRef {
            public_id: self.poster_public_id.clone(),
            url: self.poster_url.clone(),
        }
    }
}

impl Lecture {
    pub fn video(&self) -> MediaRef {
        MediaRef {
            public_id: self.video_public_id.clone(),
            url: self.video_url.clone(),
        }
    }
}

/// A course with its lectures in position order.
///
/// Lecture edits go through [`push_lecture`](Self::push_lecture) and
/// [`remove_lecture`](Self::remove_lecture) so `num_of_videos` always equals
/// the number of lectures held.
#[derive(Debug, Clone)]
pub struct CourseWithLectures {
    pub course: Course,
    lectures: Vec<Lecture>,
}

impl CourseWithLectures {
    pub fn new(mut course: Course, mut lectures: Vec<Lecture>) -> Self {
        lectures.sort_by_key(|l| l.position);
        course.num_of_videos = lectures.len() as i32;
        Self { course, lectures }
    }

    pub fn lectures(&self) -> &[Lecture] {
        &self.lectures
    }

    pub fn push_lecture(&mut self, lecture: Lecture) {
        self.lectures.push(lecture);
        self.course.num_of_videos = self.lectures.len() as i32;
    }

    pub fn remove_lecture(&mut self, lecture_id: Uuid) -> Option<Lecture> {
        let idx = self.lectures.iter().position(|l| l.id == lecture_id)?;
        let removed = self.lectures.remove(idx);
        self.course.num_of_videos = self.lectures.len() as i32;
        Some(removed)
    }
}

/// Catalog listing entry; lectures are never included.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSummary {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub created_by: String,
    pub poster: MediaRef,
    pub views: i64,
    pub num_of_videos: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Course> for CourseSummary {
    fn from(c: Course) -> Self {
        Self {
            poster: c.poster(),
            id: c.id,
            title: c.title,
            description: c.description,
            category: c.category,
            created_by: c.created_by,
            views: c.views,
            num_of_videos: c.num_of_videos,
            created_at: c.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LectureView {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub video: MediaRef,
}

impl From<&Lecture> for LectureView {
    fn from(l: &Lecture) -> Self {
        Self {
            id: l.id,
            title: l.title.clone(),
            description: l.description.clone(),
            video: l.video(),
        }
    }
}
