use crate::errors::AppError;
use crate::model::account::User;
use crate::schema::{students, users};
use deadpool_diesel::sqlite::Pool;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use tracing::{debug, warn};

const MAX_TITLE_LENGTH: usize = 200;

/// Per-connection settings SQLite does not persist in the database file.
fn configure_connection(conn: &mut SqliteConnection) -> QueryResult<()> {
    conn.batch_execute("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
}

/// Runs a single diesel query on a pooled connection.
pub(super) async fn run_query<T, F>(pool: &Pool, query: F) -> Result<T, AppError>
where
    F: FnOnce(&mut SqliteConnection) -> Result<T, diesel::result::Error> + Send + 'static,
    T: Send + 'static,
{
    with_connection(pool, move |conn| query(conn).map_err(AppError::from)).await
}

/// Runs `work` on a pooled connection; `work` may span several queries,
/// open transactions and return domain errors.
pub(super) async fn with_connection<T, F>(pool: &Pool, work: F) -> Result<T, AppError>
where
    F: FnOnce(&mut SqliteConnection) -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    let conn = pool.get().await?;
    debug!("DB connection object obtained from pool for interaction");

    conn.interact(move |conn| {
        configure_connection(conn)?;
        work(conn)
    })
    .await?
}

pub(super) fn find_user(conn: &mut SqliteConnection, user_id: i64) -> Result<User, AppError> {
    users::table
        .find(user_id)
        .select(User::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::NotFound(format!("User with ID {} not found.", user_id)))
}

/// Loads the acting user and checks it is a teacher.
pub(super) fn require_teacher(conn: &mut SqliteConnection, user_id: i64) -> Result<User, AppError> {
    let user = find_user(conn, user_id)?;
    if !user.is_teacher() {
        warn!("User {} attempted a teacher-only action", user_id);
        return Err(AppError::Forbidden(format!(
            "User with ID {} is not a teacher.",
            user_id
        )));
    }
    Ok(user)
}

/// Resolves the student profile of a user.
pub(super) fn require_student(conn: &mut SqliteConnection, user_id: i64) -> Result<i64, AppError> {
    students::table
        .filter(students::user_id.eq(user_id))
        .select(students::id)
        .first::<i64>(conn)
        .optional()?
        .ok_or_else(|| {
            AppError::NotFound(format!("Student profile for user ID {} not found.", user_id))
        })
}

/// Trims a title and checks it is non-empty and not too long.
pub(super) fn validate_title(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("{} must not be empty.", field)));
    }
    if trimmed.chars().count() > MAX_TITLE_LENGTH {
        return Err(AppError::BadRequest(format!(
            "{} must be at most {} characters.",
            field, MAX_TITLE_LENGTH
        )));
    }
    Ok(trimmed.to_string())
}
