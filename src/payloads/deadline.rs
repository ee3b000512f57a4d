use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug)]
pub struct CreateDeadlinePayload {
    pub user_id: i64,
    pub lesson_id: Option<i64>,
    pub due_at: NaiveDateTime,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct UpdateDeadlinePayload {
    pub user_id: i64,
    pub lesson_id: Option<i64>,
    pub due_at: NaiveDateTime,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct DeleteDeadlineParams {
    pub user_id: i64,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct CalendarParams {
    pub year: Option<i32>,
    pub month: Option<u32>,
}
