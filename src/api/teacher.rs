use super::helper;
use crate::certificate::{CertificateRenderer, RenderOutcome};
use crate::completion::{self, CompletionOutcome};
use crate::errors::AppError;
use crate::model::account::display_name;
use crate::model::certificate::{Certificate, describe_one, load_details};
use crate::model::course::{Course, NewCourse, NewLesson};
use crate::model::homework::{GradeResponse, HomeworkSubmission, LessonSubmissionResponse};
use crate::payloads::teacher::{
    CreateCoursePayload, CreateLessonPayload, GetLessonSubmissionsParams, GradeSubmissionPayload,
    RegenerateCertificatePayload,
};
use crate::response::ApiResponse;
use crate::schema::{certificates, courses, homework_submissions, lessons, students, users};
use axum::extract::{Query, State};
use axum::response::Json;
use deadpool_diesel::sqlite::Pool;
use diesel::dsl::exists;
use diesel::prelude::*;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const MIN_GRADE: i32 = 0;
const MAX_GRADE: i32 = 100;

/// Creates a course owned by the requesting teacher.
///
/// Request Body: `CreateCoursePayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `Course`: The created course (200 OK).
/// * `400 Bad Request`: If the title is empty or too long.
/// * `403 Forbidden`: If the user is not a teacher.
/// * `404 Not Found`: If the user does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn create_course(
    State(pool): State<Pool>,
    Json(payload): Json<CreateCoursePayload>,
) -> Result<ApiResponse<Course>, AppError> {
    info!("Attempting to create course by teacher {}", payload.teacher_id);
    debug!("Create course payload: {:?}", payload);

    let title = helper::validate_title("Course title", &payload.title)?;

    let course = helper::with_connection(&pool, move |conn| {
        helper::require_teacher(conn, payload.teacher_id)?;
        Ok(diesel::insert_into(courses::table)
            .values(&NewCourse {
                title,
                description: payload.description,
                teacher_id: payload.teacher_id,
            })
            .returning(Course::as_returning())
            .get_result(conn)?)
    })
    .await?;

    info!("Created course {} ('{}')", course.id, course.title);
    Ok(ApiResponse::ok(course))
}

/// Adds a lesson to a course.
///
/// Request Body: `CreateLessonPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `i64`: The lesson ID (200 OK).
/// * `400 Bad Request`: If the title is empty or too long.
/// * `403 Forbidden`: If the user is not a teacher.
/// * `404 Not Found`: If the user or the course does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn create_lesson(
    State(pool): State<Pool>,
    Json(payload): Json<CreateLessonPayload>,
) -> Result<ApiResponse<i64>, AppError> {
    info!(
        "Attempting to create lesson in course {} by teacher {}",
        payload.course_id, payload.teacher_id
    );
    debug!("Create lesson payload: {:?}", payload);

    let title = helper::validate_title("Lesson title", &payload.title)?;
    let course_id = payload.course_id;

    let lesson_id = helper::with_connection(&pool, move |conn| {
        helper::require_teacher(conn, payload.teacher_id)?;

        let course_exists =
            diesel::select(exists(courses::table.find(course_id))).get_result::<bool>(conn)?;
        if !course_exists {
            return Err(AppError::NotFound(format!(
                "Course with ID {} not found.",
                course_id
            )));
        }

        Ok(diesel::insert_into(lessons::table)
            .values(&NewLesson {
                course_id,
                title,
                content: payload.content,
            })
            .returning(lessons::id)
            .get_result::<i64>(conn)?)
    })
    .await?;

    info!("Created lesson {} in course {}", lesson_id, course_id);
    Ok(ApiResponse::ok(lesson_id))
}

/// All submissions of a lesson with the submitting student's name.
///
/// Query Parameters:
/// * teacher_id as `i64`
/// * lesson_id as `i64`
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<LessonSubmissionResponse>` ordered by submission ID (200 OK).
/// * `403 Forbidden`: If the user is not a teacher.
/// * `404 Not Found`: If the user or the lesson does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool))]
pub async fn get_lesson_submissions(
    State(pool): State<Pool>,
    Query(params): Query<GetLessonSubmissionsParams>,
) -> Result<ApiResponse<Vec<LessonSubmissionResponse>>, AppError> {
    info!(
        "Fetching submissions of lesson {} for teacher {}",
        params.lesson_id, params.teacher_id
    );

    let submissions = helper::with_connection(&pool, move |conn| {
        helper::require_teacher(conn, params.teacher_id)?;

        let lesson_exists = diesel::select(exists(lessons::table.find(params.lesson_id)))
            .get_result::<bool>(conn)?;
        if !lesson_exists {
            return Err(AppError::NotFound(format!(
                "Lesson with ID {} not found.",
                params.lesson_id
            )));
        }

        let rows = homework_submissions::table
            .inner_join(students::table.inner_join(users::table))
            .filter(homework_submissions::lesson_id.eq(params.lesson_id))
            .order(homework_submissions::id.asc())
            .select((
                HomeworkSubmission::as_select(),
                users::first_name,
                users::last_name,
                users::username,
            ))
            .load::<(HomeworkSubmission, String, String, String)>(conn)?;

        Ok(rows
            .into_iter()
            .map(|(s, first, last, username)| LessonSubmissionResponse {
                id: s.id,
                student_id: s.student_id,
                student_name: display_name(&first, &last, &username),
                content: s.content,
                is_graded: s.is_graded,
                grade: s.grade,
            })
            .collect::<Vec<_>>())
    })
    .await?;

    info!("Found {} submissions", submissions.len());
    Ok(ApiResponse::ok(submissions))
}

/// Grades a submission and issues the course certificate when this grade
/// completes the course.
///
/// The grade, the graded flag and a newly issued certificate are written in
/// one transaction. Certificate artifacts are rendered after the commit; a
/// rendering failure never fails the request.
///
/// Request Body: `GradeSubmissionPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `GradeResponse`: The stored grade and the certificate issued by this
///   grading event, if any (200 OK).
/// * `403 Forbidden`: If the user is not a teacher.
/// * `404 Not Found`: If the user or the submission does not exist.
/// * `422 Unprocessable Entity`: If the grade is outside 0..=100.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, renderer, payload))]
pub async fn grade_submission(
    State(pool): State<Pool>,
    State(renderer): State<Arc<CertificateRenderer>>,
    Json(payload): Json<GradeSubmissionPayload>,
) -> Result<ApiResponse<GradeResponse>, AppError> {
    info!(
        "Attempting to grade submission {} by teacher {}",
        payload.submission_id, payload.teacher_id
    );
    debug!("Grade submission payload: {:?}", payload);

    if !(MIN_GRADE..=MAX_GRADE).contains(&payload.grade) {
        warn!(
            "Rejected grade {} for submission {}",
            payload.grade, payload.submission_id
        );
        return Err(AppError::UnprocessableEntity(format!(
            "Grade must be between {} and {}, got {}.",
            MIN_GRADE, MAX_GRADE, payload.grade
        )));
    }

    let submission_id = payload.submission_id;
    let grade = payload.grade;

    let response = helper::with_connection(&pool, move |conn| {
        helper::require_teacher(conn, payload.teacher_id)?;

        let outcome = conn.immediate_transaction::<_, AppError, _>(|tx| {
            let updated = diesel::update(homework_submissions::table.find(submission_id))
                .set((
                    homework_submissions::grade.eq(Some(grade)),
                    homework_submissions::is_graded.eq(true),
                ))
                .execute(tx)?;
            if updated == 0 {
                return Err(AppError::NotFound(format!(
                    "Submission with ID {} not found.",
                    submission_id
                )));
            }

            let submission = homework_submissions::table
                .find(submission_id)
                .select(HomeworkSubmission::as_select())
                .first(tx)?;
            Ok(completion::evaluate_submission(tx, &submission)?)
        })?;

        let issued = match outcome {
            CompletionOutcome::Certified(certificate) => {
                render_certificate(conn, &renderer, &certificate);
                Some(certificate.id)
            }
            CompletionOutcome::AlreadyCertified(certificate) if certificate.pdf_path.is_none() => {
                debug!(
                    "Certificate {} has no linked PDF yet, rendering again",
                    certificate.id
                );
                render_certificate(conn, &renderer, &certificate);
                None
            }
            CompletionOutcome::AlreadyCertified(_)
            | CompletionOutcome::Incomplete
            | CompletionOutcome::NotGraded => None,
        };

        // re-read so has_pdf reflects the render that just ran
        let certificate = match issued {
            Some(certificate_id) => {
                let row = certificates::table
                    .find(certificate_id)
                    .select(Certificate::as_select())
                    .first(conn)?;
                Some(describe_one(conn, row)?)
            }
            None => None,
        };

        Ok(GradeResponse {
            submission_id,
            grade,
            certificate,
        })
    })
    .await?;

    match &response.certificate {
        Some(certificate) => info!(
            "Graded submission {} with {}, issued certificate {}",
            submission_id, grade, certificate.uid
        ),
        None => info!("Graded submission {} with {}", submission_id, grade),
    }
    Ok(ApiResponse::ok(response))
}

/// Runs the certificate renderer again for an existing certificate.
///
/// Request Body: `RegenerateCertificatePayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `RenderOutcome`: How the invocation ended (200 OK).
/// * `403 Forbidden`: If the user is not a teacher.
/// * `404 Not Found`: If the user or the certificate does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, renderer, payload))]
pub async fn regenerate_certificate(
    State(pool): State<Pool>,
    State(renderer): State<Arc<CertificateRenderer>>,
    Json(payload): Json<RegenerateCertificatePayload>,
) -> Result<ApiResponse<RenderOutcome>, AppError> {
    let certificate_id = payload.certificate_id;
    info!(
        "Teacher {} requested rendering of certificate {}",
        payload.teacher_id, certificate_id
    );

    let outcome = helper::with_connection(&pool, move |conn| {
        helper::require_teacher(conn, payload.teacher_id)?;
        let details = load_details(conn, certificate_id)
            .optional()?
            .ok_or_else(|| {
                AppError::NotFound(format!("Certificate with ID {} not found.", certificate_id))
            })?;
        Ok(renderer.render(&details, conn))
    })
    .await?;

    info!("Certificate {} render outcome: {:?}", certificate_id, outcome);
    Ok(ApiResponse::ok(outcome))
}

/// Best-effort artifact generation after the grading transaction committed.
fn render_certificate(
    conn: &mut SqliteConnection,
    renderer: &CertificateRenderer,
    certificate: &Certificate,
) {
    match load_details(conn, certificate.id) {
        Ok(details) => {
            let outcome = renderer.render(&details, conn);
            info!(
                "Certificate {} render outcome: {:?}",
                certificate.id, outcome
            );
        }
        Err(e) => warn!(
            "Could not load details of certificate {}, skipping render: {}",
            certificate.id, e
        ),
    }
}
