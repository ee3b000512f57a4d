use crate::model::certificate::CertificateResponse;
use crate::schema::homework_submissions;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = homework_submissions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct HomeworkSubmission {
    pub id: i64,
    pub lesson_id: i64,
    pub student_id: i64,
    pub content: String,
    pub is_graded: bool,
    pub grade: Option<i32>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = homework_submissions)]
pub struct NewHomeworkSubmission {
    pub lesson_id: i64,
    pub student_id: i64,
    pub content: String,
    // is_graded defaults to false, grade to NULL
}

#[derive(Serialize, Deserialize, Debug, Clone, Queryable)]
pub struct SubmissionSummary {
    pub id: i64,
    pub lesson_id: i64,
    pub lesson_title: String,
    pub course_id: i64,
    pub course_title: String,
    pub content: String,
    pub is_graded: bool,
    pub grade: Option<i32>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LessonSubmissionResponse {
    pub id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub content: String,
    pub is_graded: bool,
    pub grade: Option<i32>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct DashboardLesson {
    pub lesson_id: i64,
    pub title: String,
    pub submission: Option<SubmissionSummary>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct DashboardCourse {
    pub course_id: i64,
    pub title: String,
    pub lessons: Vec<DashboardLesson>,
    pub certificate: Option<CertificateResponse>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct GradeResponse {
    pub submission_id: i64,
    pub grade: i32,
    /// Certificate issued by this grading event, if it completed the course.
    pub certificate: Option<CertificateResponse>,
}
