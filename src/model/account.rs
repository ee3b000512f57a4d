use crate::schema::{students, users};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub is_staff: bool,
    pub created_at: NaiveDateTime,
}

impl User {
    pub fn display_name(&self) -> String {
        display_name(&self.first_name, &self.last_name, &self.username)
    }

    /// Teachers are staff accounts; there is no separate account type.
    pub fn is_teacher(&self) -> bool {
        self.is_staff
    }
}

/// Full name when one is set, the account handle otherwise.
pub fn display_name(first_name: &str, last_name: &str, username: &str) -> String {
    let full_name = format!("{} {}", first_name.trim(), last_name.trim());
    let full_name = full_name.trim();
    if full_name.is_empty() {
        username.to_string()
    } else {
        full_name.to_string()
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub is_staff: bool,
    // created_at has a DB default (CURRENT_TIMESTAMP)
}

#[derive(Insertable, Debug)]
#[diesel(table_name = students)]
pub struct NewStudent {
    pub user_id: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AccountResponse {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub is_teacher: bool,
    pub student_id: Option<i64>,
}

impl AccountResponse {
    pub fn new(user: &User, student_id: Option<i64>) -> Self {
        AccountResponse {
            id: user.id,
            username: user.username.clone(),
            display_name: user.display_name(),
            is_teacher: user.is_teacher(),
            student_id,
        }
    }
}
