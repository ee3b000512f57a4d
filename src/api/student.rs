use super::helper;
use crate::errors::AppError;
use crate::model::certificate::{Certificate, CertificateResponse, describe};
use crate::model::course::{Course, NewEnrollment};
use crate::model::homework::{
    DashboardCourse, DashboardLesson, HomeworkSubmission, NewHomeworkSubmission,
    SubmissionSummary,
};
use crate::payloads::student::{
    DeleteSubmissionPayload, EditSubmissionPayload, EnrollPayload, GetSubmissionsParams,
    GradedFilter, StudentParams, SubmitHomeworkPayload,
};
use crate::response::{ApiResponse, Page, resolve_page};
use crate::schema::{certificates, course_students, courses, homework_submissions, lessons};
use axum::extract::{Query, State};
use axum::response::Json;
use deadpool_diesel::sqlite::Pool;
use diesel::dsl::exists;
use diesel::prelude::*;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

const SUBMISSIONS_PER_PAGE: i64 = 10;

/// Enrolls the student in a course. Enrolling twice is a no-op.
///
/// Request Body: `EnrollPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `bool`: Whether a new enrollment was created (200 OK).
/// * `404 Not Found`: If the user has no student profile or the course does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn enroll(
    State(pool): State<Pool>,
    Json(payload): Json<EnrollPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    info!(
        "Attempting to enroll user {} in course {}",
        payload.user_id, payload.course_id
    );
    debug!("Enroll payload: {:?}", payload);

    let course_id = payload.course_id;
    let created = helper::with_connection(&pool, move |conn| {
        let student_id = helper::require_student(conn, payload.user_id)?;

        let course_exists =
            diesel::select(exists(courses::table.find(course_id))).get_result::<bool>(conn)?;
        if !course_exists {
            return Err(AppError::NotFound(format!(
                "Course with ID {} not found.",
                course_id
            )));
        }

        let inserted = diesel::insert_into(course_students::table)
            .values(&NewEnrollment {
                course_id,
                student_id,
            })
            .on_conflict((course_students::course_id, course_students::student_id))
            .do_nothing()
            .execute(conn)?;
        Ok(inserted == 1)
    })
    .await?;

    if created {
        info!("User {} enrolled in course {}", payload.user_id, course_id);
    } else {
        info!(
            "User {} was already enrolled in course {}",
            payload.user_id, course_id
        );
    }
    Ok(ApiResponse::ok(created))
}

/// Submits homework for a lesson. An existing ungraded submission for the
/// same lesson is overwritten.
///
/// Request Body: `SubmitHomeworkPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `i64`: The submission ID (200 OK).
/// * `404 Not Found`: If the user has no student profile or the lesson does not exist.
/// * `409 Conflict`: If the existing submission is already graded.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn submit_homework(
    State(pool): State<Pool>,
    Json(payload): Json<SubmitHomeworkPayload>,
) -> Result<ApiResponse<i64>, AppError> {
    info!(
        "Attempting to submit homework for lesson {} by user {}",
        payload.lesson_id, payload.user_id
    );

    let lesson_id = payload.lesson_id;
    let submission_id = helper::with_connection(&pool, move |conn| {
        let student_id = helper::require_student(conn, payload.user_id)?;

        conn.immediate_transaction::<_, AppError, _>(|tx| {
            let lesson_exists =
                diesel::select(exists(lessons::table.find(lesson_id))).get_result::<bool>(tx)?;
            if !lesson_exists {
                return Err(AppError::NotFound(format!(
                    "Lesson with ID {} not found.",
                    lesson_id
                )));
            }

            let existing = homework_submissions::table
                .filter(homework_submissions::lesson_id.eq(lesson_id))
                .filter(homework_submissions::student_id.eq(student_id))
                .select(HomeworkSubmission::as_select())
                .first(tx)
                .optional()?;

            match existing {
                Some(submission) if submission.is_graded => {
                    warn!(
                        "Submission {} is already graded and cannot be replaced",
                        submission.id
                    );
                    Err(AppError::Conflict(format!(
                        "Submission {} is already graded.",
                        submission.id
                    )))
                }
                Some(submission) => {
                    diesel::update(homework_submissions::table.find(submission.id))
                        .set(homework_submissions::content.eq(&payload.content))
                        .execute(tx)?;
                    Ok(submission.id)
                }
                None => Ok(diesel::insert_into(homework_submissions::table)
                    .values(&NewHomeworkSubmission {
                        lesson_id,
                        student_id,
                        content: payload.content.clone(),
                    })
                    .returning(homework_submissions::id)
                    .get_result::<i64>(tx)?),
            }
        })
    })
    .await?;

    info!(
        "Stored submission {} for lesson {}",
        submission_id, lesson_id
    );
    Ok(ApiResponse::ok(submission_id))
}

/// Replaces the content of the student's own ungraded submission.
///
/// Request Body: `EditSubmissionPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `()`: Empty success response (200 OK).
/// * `403 Forbidden`: If the submission belongs to someone else.
/// * `404 Not Found`: If the student profile or the submission does not exist.
/// * `409 Conflict`: If the submission is already graded.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn edit_submission(
    State(pool): State<Pool>,
    Json(payload): Json<EditSubmissionPayload>,
) -> Result<ApiResponse<()>, AppError> {
    let submission_id = payload.submission_id;
    info!(
        "Attempting to edit submission {} by user {}",
        submission_id, payload.user_id
    );

    helper::with_connection(&pool, move |conn| {
        let submission = owned_submission(conn, payload.user_id, submission_id)?;
        if submission.is_graded {
            warn!("Submission {} is graded and cannot be edited", submission_id);
            return Err(AppError::Conflict(format!(
                "Submission {} is already graded.",
                submission_id
            )));
        }

        diesel::update(homework_submissions::table.find(submission_id))
            .set(homework_submissions::content.eq(payload.content))
            .execute(conn)?;
        Ok(())
    })
    .await?;

    info!("Edited submission {}", submission_id);
    Ok(ApiResponse::ok(()))
}

/// Deletes the student's own submission.
///
/// Request Body: `DeleteSubmissionPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `()`: Empty success response (200 OK).
/// * `403 Forbidden`: If the submission belongs to someone else.
/// * `404 Not Found`: If the student profile or the submission does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn delete_submission(
    State(pool): State<Pool>,
    Json(payload): Json<DeleteSubmissionPayload>,
) -> Result<ApiResponse<()>, AppError> {
    let submission_id = payload.submission_id;
    info!(
        "Attempting to delete submission {} by user {}",
        submission_id, payload.user_id
    );

    helper::with_connection(&pool, move |conn| {
        owned_submission(conn, payload.user_id, submission_id)?;
        diesel::delete(homework_submissions::table.find(submission_id)).execute(conn)?;
        Ok(())
    })
    .await?;

    info!("Deleted submission {}", submission_id);
    Ok(ApiResponse::ok(()))
}

/// Lists the student's submissions, newest first.
///
/// Query Parameters:
/// * user_id as `i64`
/// * course as `Option<i64>`: Only submissions for this course.
/// * graded as `Option<"yes" | "no">`
/// * q as `Option<String>`: Case-insensitive match on lesson or course title.
/// * page as `Option<String>`: 1-based; invalid values select the first page,
///   out-of-range values the last one.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Page<SubmissionSummary>` with 10 items per page (200 OK).
/// * `404 Not Found`: If the user has no student profile.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, params))]
pub async fn get_submissions(
    State(pool): State<Pool>,
    Query(params): Query<GetSubmissionsParams>,
) -> Result<ApiResponse<Page<SubmissionSummary>>, AppError> {
    info!("Fetching submissions for user {}", params.user_id);
    debug!("Get submissions params: {:?}", params);

    let page = helper::with_connection(&pool, move |conn| {
        let student_id = helper::require_student(conn, params.user_id)?;
        let search = params
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", escape_like(q)));

        let filtered = || {
            let mut query = homework_submissions::table
                .inner_join(lessons::table.inner_join(courses::table))
                .filter(homework_submissions::student_id.eq(student_id))
                .into_boxed();

            if let Some(course_id) = params.course {
                query = query.filter(lessons::course_id.eq(course_id));
            }
            match params.graded {
                Some(GradedFilter::Yes) => {
                    query = query.filter(homework_submissions::is_graded.eq(true))
                }
                Some(GradedFilter::No) => {
                    query = query.filter(homework_submissions::is_graded.eq(false))
                }
                None => {}
            }
            if let Some(pattern) = search.clone() {
                query = query.filter(
                    lessons::title
                        .like(pattern.clone())
                        .escape('\\')
                        .or(courses::title.like(pattern).escape('\\')),
                );
            }
            query
        };

        let total_items = filtered().count().get_result::<i64>(conn)?;
        let (page, total_pages) =
            resolve_page(params.page.as_deref(), total_items, SUBMISSIONS_PER_PAGE);

        let items = filtered()
            .select(summary_columns())
            .order(homework_submissions::id.desc())
            .limit(SUBMISSIONS_PER_PAGE)
            .offset((page - 1) * SUBMISSIONS_PER_PAGE)
            .load::<SubmissionSummary>(conn)?;

        Ok(Page::new(items, page, total_pages, total_items))
    })
    .await?;

    info!(
        "Fetched page {}/{} ({} submissions total)",
        page.page, page.total_pages, page.total_items
    );
    Ok(ApiResponse::ok(page))
}

/// Enrolled courses with every lesson, the student's submission for each
/// lesson and the course certificate if one was issued.
///
/// Query Parameters:
/// * user_id as `i64`
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<DashboardCourse>` ordered by course ID (200 OK).
/// * `404 Not Found`: If the user has no student profile.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool))]
pub async fn get_dashboard(
    State(pool): State<Pool>,
    Query(params): Query<StudentParams>,
) -> Result<ApiResponse<Vec<DashboardCourse>>, AppError> {
    info!("Building dashboard for user {}", params.user_id);

    let dashboard = helper::with_connection(&pool, move |conn| {
        let student_id = helper::require_student(conn, params.user_id)?;

        let enrolled = course_students::table
            .inner_join(courses::table)
            .filter(course_students::student_id.eq(student_id))
            .order(courses::id.asc())
            .select(Course::as_select())
            .load::<Course>(conn)?;
        let course_ids: Vec<i64> = enrolled.iter().map(|c| c.id).collect();

        let mut lessons_by_course: HashMap<i64, Vec<(i64, String)>> = HashMap::new();
        for (lesson_id, course_id, title) in lessons::table
            .filter(lessons::course_id.eq_any(course_ids.clone()))
            .order(lessons::id.asc())
            .select((lessons::id, lessons::course_id, lessons::title))
            .load::<(i64, i64, String)>(conn)?
        {
            lessons_by_course
                .entry(course_id)
                .or_default()
                .push((lesson_id, title));
        }

        let mut submissions_by_lesson: HashMap<i64, SubmissionSummary> = homework_submissions::table
            .inner_join(lessons::table.inner_join(courses::table))
            .filter(homework_submissions::student_id.eq(student_id))
            .filter(lessons::course_id.eq_any(course_ids.clone()))
            .select(summary_columns())
            .load::<SubmissionSummary>(conn)?
            .into_iter()
            .map(|s| (s.lesson_id, s))
            .collect();

        let certificate_rows = certificates::table
            .filter(certificates::student_id.eq(student_id))
            .filter(certificates::course_id.eq_any(course_ids))
            .select(Certificate::as_select())
            .load::<Certificate>(conn)?;
        let mut certificates_by_course: HashMap<i64, CertificateResponse> =
            describe(conn, certificate_rows)?
                .into_iter()
                .map(|c| (c.course_id, c))
                .collect();

        Ok(enrolled
            .into_iter()
            .map(|course| DashboardCourse {
                lessons: lessons_by_course
                    .remove(&course.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(lesson_id, title)| DashboardLesson {
                        submission: submissions_by_lesson.remove(&lesson_id),
                        lesson_id,
                        title,
                    })
                    .collect(),
                certificate: certificates_by_course.remove(&course.id),
                course_id: course.id,
                title: course.title,
            })
            .collect::<Vec<_>>())
    })
    .await?;

    info!("Dashboard lists {} courses", dashboard.len());
    Ok(ApiResponse::ok(dashboard))
}

/// Lists the student's certificates, newest first.
///
/// Query Parameters:
/// * user_id as `i64`
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<CertificateResponse>` (200 OK).
/// * `404 Not Found`: If the user has no student profile.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool))]
pub async fn get_certificates(
    State(pool): State<Pool>,
    Query(params): Query<StudentParams>,
) -> Result<ApiResponse<Vec<CertificateResponse>>, AppError> {
    info!("Fetching certificates for user {}", params.user_id);

    let certificates = helper::with_connection(&pool, move |conn| {
        let student_id = helper::require_student(conn, params.user_id)?;
        let rows = certificates::table
            .filter(certificates::student_id.eq(student_id))
            .order((certificates::issued_at.desc(), certificates::id.desc()))
            .select(Certificate::as_select())
            .load::<Certificate>(conn)?;
        Ok(describe(conn, rows)?)
    })
    .await?;

    Ok(ApiResponse::ok(certificates))
}

/// Loads a submission and checks it belongs to the user's student profile.
fn owned_submission(
    conn: &mut SqliteConnection,
    user_id: i64,
    submission_id: i64,
) -> Result<HomeworkSubmission, AppError> {
    let student_id = helper::require_student(conn, user_id)?;
    let submission = homework_submissions::table
        .find(submission_id)
        .select(HomeworkSubmission::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| {
            AppError::NotFound(format!("Submission with ID {} not found.", submission_id))
        })?;

    if submission.student_id != student_id {
        warn!(
            "User {} attempted to modify submission {} owned by student {}",
            user_id, submission_id, submission.student_id
        );
        return Err(AppError::Forbidden(format!(
            "Submission {} does not belong to user {}.",
            submission_id, user_id
        )));
    }
    Ok(submission)
}

#[allow(clippy::type_complexity)]
fn summary_columns() -> (
    homework_submissions::id,
    homework_submissions::lesson_id,
    lessons::title,
    lessons::course_id,
    courses::title,
    homework_submissions::content,
    homework_submissions::is_graded,
    homework_submissions::grade,
) {
    (
        homework_submissions::id,
        homework_submissions::lesson_id,
        lessons::title,
        lessons::course_id,
        courses::title,
        homework_submissions::content,
        homework_submissions::is_graded,
        homework_submissions::grade,
    )
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
