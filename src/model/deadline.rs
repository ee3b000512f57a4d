use crate::model::account::display_name;
use crate::schema::{deadlines, lessons, users};
use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = deadlines)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Deadline {
    pub id: i64,
    pub lesson_id: Option<i64>,
    pub due_at: NaiveDateTime,
    pub title: String,
    pub description: String,
    pub created_by: Option<i64>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = deadlines)]
pub struct NewDeadline {
    pub lesson_id: Option<i64>,
    pub due_at: NaiveDateTime,
    pub title: String,
    pub description: String,
    pub created_by: Option<i64>,
    // created_at has a DB default (CURRENT_TIMESTAMP)
}

/// Full replacement of the editable fields; a `None` lesson detaches the deadline.
#[derive(AsChangeset, Debug)]
#[diesel(table_name = deadlines)]
#[diesel(treat_none_as_null = true)]
pub struct DeadlineChangeset {
    pub lesson_id: Option<i64>,
    pub due_at: NaiveDateTime,
    pub title: String,
    pub description: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DeadlineResponse {
    pub id: i64,
    pub lesson_id: Option<i64>,
    pub lesson_title: Option<String>,
    pub due_at: NaiveDateTime,
    pub title: String,
    pub description: String,
    pub created_by: Option<i64>,
    pub creator_name: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub deadlines: Vec<DeadlineResponse>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CalendarMonthResponse {
    pub year: i32,
    pub month: u32,
    pub days: Vec<CalendarDay>,
}

/// Narrows a deadline listing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeadlineFilter {
    pub id: Option<i64>,
    pub lesson_id: Option<i64>,
    /// Half-open `[from, until)` window on the due timestamp.
    pub due_between: Option<(NaiveDateTime, NaiveDateTime)>,
}

type DeadlineRow = (Deadline, Option<String>, Option<(String, String, String)>);

/// Loads deadlines with their lesson title and creator name, ordered by due time.
pub fn list(
    conn: &mut SqliteConnection,
    filter: DeadlineFilter,
) -> QueryResult<Vec<DeadlineResponse>> {
    let mut query = deadlines::table
        .left_join(lessons::table.on(deadlines::lesson_id.eq(lessons::id.nullable())))
        .left_join(users::table.on(deadlines::created_by.eq(users::id.nullable())))
        .select((
            Deadline::as_select(),
            lessons::title.nullable(),
            (users::first_name, users::last_name, users::username).nullable(),
        ))
        .order((deadlines::due_at.asc(), deadlines::id.asc()))
        .into_boxed();

    if let Some(id) = filter.id {
        query = query.filter(deadlines::id.eq(id));
    }
    if let Some(lesson_id) = filter.lesson_id {
        query = query.filter(deadlines::lesson_id.eq(lesson_id));
    }
    if let Some((from, until)) = filter.due_between {
        query = query
            .filter(deadlines::due_at.ge(from))
            .filter(deadlines::due_at.lt(until));
    }

    let rows = query.load::<DeadlineRow>(conn)?;
    Ok(rows.into_iter().map(into_response).collect())
}

fn into_response((deadline, lesson_title, creator): DeadlineRow) -> DeadlineResponse {
    DeadlineResponse {
        id: deadline.id,
        lesson_id: deadline.lesson_id,
        lesson_title,
        due_at: deadline.due_at,
        title: deadline.title,
        description: deadline.description,
        created_by: deadline.created_by,
        creator_name: creator.map(|(first, last, username)| display_name(&first, &last, &username)),
        created_at: deadline.created_at,
    }
}
