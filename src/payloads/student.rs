use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug)]
pub struct EnrollPayload {
    pub user_id: i64,
    pub course_id: i64,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct SubmitHomeworkPayload {
    pub user_id: i64,
    pub lesson_id: i64,
    pub content: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct EditSubmissionPayload {
    pub user_id: i64,
    pub submission_id: i64,
    pub content: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct DeleteSubmissionPayload {
    pub user_id: i64,
    pub submission_id: i64,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GradedFilter {
    Yes,
    No,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct GetSubmissionsParams {
    pub user_id: i64,
    pub course: Option<i64>,
    pub graded: Option<GradedFilter>,
    pub q: Option<String>,
    /// Kept as text so that malformed values fall back to the first page.
    pub page: Option<String>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct StudentParams {
    pub user_id: i64,
}
