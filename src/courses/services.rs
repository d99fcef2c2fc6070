use std::collections::HashSet;

use tracing::debug;

use super::{repo::CourseStore, repo_types::CourseWithLectures};
use crate::storage::MediaStore;

/// Poster first, then lecture videos in order; each id once.
pub fn media_ids(course: &CourseWithLectures) -> Vec<&str> {
    let mut seen = HashSet::new();
    std::iter::once(course.course.poster_public_id.as_str())
        .chain(course.lectures().iter().map(|l| l.video_public_id.as_str()))
        .filter(|id| !id.is_empty() && seen.insert(*id))
        .collect()
}

/// Destroys every stored object owned by the course. Stops at the first failure
/// so the caller can keep the row and retry.
pub async fn purge_course_media(storage: &dyn MediaStore, course: &CourseWithLectures) -> anyhow::Result<()> {
    for id in media_ids(course) {
        storage.destroy(id).await?;
        debug!(course_id = %course.course.id, public_id = id, "course media destroyed");
    }
    Ok(())
}

/// Media first, then the row; a course whose media could not be purged stays.
pub async fn remove_course(
    storage: &dyn MediaStore,
    courses: &dyn CourseStore,
    course: &CourseWithLectures,
) -> anyhow::Result<()> {
    purge_course_media(storage, course).await?;
    courses.delete_course(course.course.id).await
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use uuid::Uuid;

    use super::*;
    use crate::courses::repo_types::tests::{sample_course, sample_lecture};
    use crate::state::tests::FakeStorage;

    #[tokio::test]
    async fn purge_destroys_poster_and_videos_once() {
        let course = sample_course();
        let id = course.id;
        let mut dup = sample_lecture(id, 2);
        dup.video_public_id = "lectures/0.mp4".into();
        let c = CourseWithLectures::new(
            course,
            vec![sample_lecture(id, 0), sample_lecture(id, 1), dup],
        );

        let storage = FakeStorage::default();
        purge_course_media(&storage, &c).await.unwrap();
        assert_eq!(
            storage.destroyed(),
            vec!["posters/p1.png", "lectures/0.mp4", "lectures/1.mp4"]
        );
    }

    struct RecordingCourses<'a> {
        storage: &'a FakeStorage,
        deleted: Mutex<Vec<(Uuid, Vec<String>)>>,
    }

    #[async_trait]
    impl CourseStore for RecordingCourses<'_> {
        async fn delete_course(&self, id: Uuid) -> anyhow::Result<()> {
            self.deleted.lock().unwrap().push((id, self.storage.destroyed()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn media_is_purged_before_the_row() {
        let course = sample_course();
        let id = course.id;
        let c = CourseWithLectures::new(course, vec![sample_lecture(id, 0)]);
        let storage = FakeStorage::default();
        let courses = RecordingCourses {
            storage: &storage,
            deleted: Mutex::new(Vec::new()),
        };

        remove_course(&storage, &courses, &c).await.unwrap();

        let deleted = courses.deleted.lock().unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].0, id);
        assert_eq!(deleted[0].1, vec!["posters/p1.png", "lectures/0.mp4"]);
    }

    #[tokio::test]
    async fn purge_failure_keeps_the_row() {
        let course = sample_course();
        let id = course.id;
        let c = CourseWithLectures::new(course, vec![sample_lecture(id, 0), sample_lecture(id, 1)]);
        let storage = FakeStorage::failing_on("lectures/0.mp4");
        let courses = RecordingCourses {
            storage: &storage,
            deleted: Mutex::new(Vec::new()),
        };

        assert!(remove_course(&storage, &courses, &c).await.is_err());
        assert!(courses.deleted.lock().unwrap().is_empty());
        assert!(!storage.destroyed().contains(&"lectures/1.mp4".to_string()));
    }

    #[tokio::test]
    async fn purge_without_lectures_only_hits_poster() {
        let storage = FakeStorage::default();
        purge_course_media(&storage, &CourseWithLectures::new(sample_course(), vec![]))
            .await
            .unwrap();
        assert_eq!(storage.destroyed(), vec!["posters/p1.png"]);
    }
}
