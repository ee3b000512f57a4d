use super::helper;
use crate::errors::AppError;
use crate::model::deadline::{
    self, CalendarDay, CalendarMonthResponse, DeadlineChangeset, DeadlineFilter, DeadlineResponse,
    NewDeadline,
};
use crate::payloads::deadline::{
    CalendarParams, CreateDeadlinePayload, DeleteDeadlineParams, UpdateDeadlinePayload,
};
use crate::response::ApiResponse;
use crate::schema::{deadlines, lessons};
use axum::extract::{Path, Query, State};
use axum::response::Json;
use chrono::{Datelike, Months, NaiveDate, NaiveTime, Utc};
use deadpool_diesel::sqlite::Pool;
use diesel::dsl::exists;
use diesel::prelude::*;
use tracing::{debug, info, instrument, warn};

/// Lists all deadlines ordered by due time.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<DeadlineResponse>` (200 OK).
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool))]
pub async fn list_deadlines(
    State(pool): State<Pool>,
) -> Result<ApiResponse<Vec<DeadlineResponse>>, AppError> {
    info!("Fetching all deadlines");
    let deadlines =
        helper::run_query(&pool, |conn| deadline::list(conn, DeadlineFilter::default())).await?;
    Ok(ApiResponse::ok(deadlines))
}

/// Returns (wrapped in `ApiResponse`)
/// * `DeadlineResponse` (200 OK).
/// * `404 Not Found`: If no deadline has the given ID.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool))]
pub async fn get_deadline(
    State(pool): State<Pool>,
    Path(deadline_id): Path<i64>,
) -> Result<ApiResponse<DeadlineResponse>, AppError> {
    info!("Fetching deadline {}", deadline_id);
    let deadline = helper::with_connection(&pool, move |conn| find_deadline(conn, deadline_id))
        .await?;
    Ok(ApiResponse::ok(deadline))
}

/// Creates a deadline, optionally attached to a lesson.
///
/// Request Body: `CreateDeadlinePayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `DeadlineResponse`: The stored deadline (200 OK).
/// * `400 Bad Request`: If the title is empty or too long.
/// * `403 Forbidden`: If the user is not a teacher.
/// * `404 Not Found`: If the user or the lesson does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn create_deadline(
    State(pool): State<Pool>,
    Json(payload): Json<CreateDeadlinePayload>,
) -> Result<ApiResponse<DeadlineResponse>, AppError> {
    info!("Attempting to create deadline by user {}", payload.user_id);
    debug!("Create deadline payload: {:?}", payload);

    let title = helper::validate_title("Deadline title", &payload.title)?;

    let deadline = helper::with_connection(&pool, move |conn| {
        helper::require_teacher(conn, payload.user_id)?;
        ensure_lesson(conn, payload.lesson_id)?;

        let deadline_id = diesel::insert_into(deadlines::table)
            .values(&NewDeadline {
                lesson_id: payload.lesson_id,
                due_at: payload.due_at,
                title,
                description: payload.description,
                created_by: Some(payload.user_id),
            })
            .returning(deadlines::id)
            .get_result::<i64>(conn)?;
        find_deadline(conn, deadline_id)
    })
    .await?;

    info!("Created deadline {} due {}", deadline.id, deadline.due_at);
    Ok(ApiResponse::ok(deadline))
}

/// Replaces the editable fields of a deadline.
///
/// Request Body: `UpdateDeadlinePayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `DeadlineResponse`: The updated deadline (200 OK).
/// * `400 Bad Request`: If the title is empty or too long.
/// * `403 Forbidden`: If the user is not a teacher.
/// * `404 Not Found`: If the user, the deadline or the lesson does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn update_deadline(
    State(pool): State<Pool>,
    Path(deadline_id): Path<i64>,
    Json(payload): Json<UpdateDeadlinePayload>,
) -> Result<ApiResponse<DeadlineResponse>, AppError> {
    info!(
        "Attempting to update deadline {} by user {}",
        deadline_id, payload.user_id
    );
    debug!("Update deadline payload: {:?}", payload);

    let title = helper::validate_title("Deadline title", &payload.title)?;

    let deadline = helper::with_connection(&pool, move |conn| {
        helper::require_teacher(conn, payload.user_id)?;
        ensure_lesson(conn, payload.lesson_id)?;

        let updated = diesel::update(deadlines::table.find(deadline_id))
            .set(&DeadlineChangeset {
                lesson_id: payload.lesson_id,
                due_at: payload.due_at,
                title,
                description: payload.description,
            })
            .execute(conn)?;
        if updated == 0 {
            return Err(not_found(deadline_id));
        }
        find_deadline(conn, deadline_id)
    })
    .await?;

    info!("Updated deadline {}", deadline_id);
    Ok(ApiResponse::ok(deadline))
}

/// Query Parameters:
/// * user_id as `i64`
///
/// Returns (wrapped in `ApiResponse`)
/// * `()`: Empty success response (200 OK).
/// * `403 Forbidden`: If the user is not a teacher.
/// * `404 Not Found`: If the user or the deadline does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool))]
pub async fn delete_deadline(
    State(pool): State<Pool>,
    Path(deadline_id): Path<i64>,
    Query(params): Query<DeleteDeadlineParams>,
) -> Result<ApiResponse<()>, AppError> {
    info!(
        "Attempting to delete deadline {} by user {}",
        deadline_id, params.user_id
    );

    helper::with_connection(&pool, move |conn| {
        helper::require_teacher(conn, params.user_id)?;
        let deleted = diesel::delete(deadlines::table.find(deadline_id)).execute(conn)?;
        if deleted == 0 {
            return Err(not_found(deadline_id));
        }
        Ok(())
    })
    .await?;

    info!("Deleted deadline {}", deadline_id);
    Ok(ApiResponse::ok(()))
}

/// Month view: every day of the month with the deadlines due on it.
///
/// Query Parameters:
/// * year as `Option<i32>`: Defaults to the current UTC year.
/// * month as `Option<u32>`: 1-12, defaults to the current UTC month.
///
/// Returns (wrapped in `ApiResponse`)
/// * `CalendarMonthResponse` (200 OK).
/// * `400 Bad Request`: If the month is not a valid calendar month.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool))]
pub async fn get_calendar(
    State(pool): State<Pool>,
    Query(params): Query<CalendarParams>,
) -> Result<ApiResponse<CalendarMonthResponse>, AppError> {
    let today = Utc::now().date_naive();
    let year = params.year.unwrap_or(today.year());
    let month = params.month.unwrap_or(today.month());
    info!("Building calendar for {}-{:02}", year, month);

    let first_day = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
        warn!("Rejected calendar request for {}-{}", year, month);
        AppError::BadRequest(format!("Invalid month {}-{}.", year, month))
    })?;
    let next_month = first_day
        .checked_add_months(Months::new(1))
        .ok_or_else(|| AppError::BadRequest(format!("Invalid month {}-{}.", year, month)))?;

    let filter = DeadlineFilter {
        due_between: Some((
            first_day.and_time(NaiveTime::MIN),
            next_month.and_time(NaiveTime::MIN),
        )),
        ..DeadlineFilter::default()
    };
    let mut due = helper::run_query(&pool, move |conn| deadline::list(conn, filter))
        .await?
        .into_iter()
        .peekable();

    let mut days = Vec::new();
    for date in first_day.iter_days().take_while(|d| *d < next_month) {
        let mut deadlines = Vec::new();
        while let Some(d) = due.next_if(|d| d.due_at.date() == date) {
            deadlines.push(d);
        }
        days.push(CalendarDay { date, deadlines });
    }

    Ok(ApiResponse::ok(CalendarMonthResponse { year, month, days }))
}

fn find_deadline(
    conn: &mut SqliteConnection,
    deadline_id: i64,
) -> Result<DeadlineResponse, AppError> {
    let filter = DeadlineFilter {
        id: Some(deadline_id),
        ..DeadlineFilter::default()
    };
    deadline::list(conn, filter)?
        .pop()
        .ok_or_else(|| not_found(deadline_id))
}

fn ensure_lesson(conn: &mut SqliteConnection, lesson_id: Option<i64>) -> Result<(), AppError> {
    let Some(lesson_id) = lesson_id else {
        return Ok(());
    };
    let lesson_exists =
        diesel::select(exists(lessons::table.find(lesson_id))).get_result::<bool>(conn)?;
    if !lesson_exists {
        return Err(AppError::NotFound(format!(
            "Lesson with ID {} not found.",
            lesson_id
        )));
    }
    Ok(())
}

fn not_found(deadline_id: i64) -> AppError {
    AppError::NotFound(format!("Deadline with ID {} not found.", deadline_id))
}
