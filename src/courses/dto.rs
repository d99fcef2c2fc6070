use serde::{Deserialize, Serialize};

use super::repo_types::{CourseSummary, LectureView};

#[derive(Debug, Default, Deserialize)]
pub struct CourseQuery {
    #[serde(default)]
    pub keyword: String,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LectureQuery {
    #[serde(default)]
    pub course_id: String,
    #[serde(default)]
    pub lecture_id: String,
}

#[derive(Debug, Serialize)]
pub struct CoursesResponse {
    pub courses: Vec<CourseSummary>,
}

#[derive(Debug, Serialize)]
pub struct LecturesResponse {
    pub lectures: Vec<LectureView>,
}
