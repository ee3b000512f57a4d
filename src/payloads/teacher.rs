use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug)]
pub struct CreateCoursePayload {
    pub teacher_id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct CreateLessonPayload {
    pub teacher_id: i64,
    pub course_id: i64,
    pub title: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct GetLessonSubmissionsParams {
    pub teacher_id: i64,
    pub lesson_id: i64,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct GradeSubmissionPayload {
    pub teacher_id: i64,
    pub submission_id: i64,
    pub grade: i32,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct RegenerateCertificatePayload {
    pub teacher_id: i64,
    pub certificate_id: i64,
}
