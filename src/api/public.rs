use super::helper;
use crate::certificate::CertificateRenderer;
use crate::errors::AppError;
use crate::model::account::{AccountResponse, NewStudent, NewUser, User, display_name};
use crate::model::certificate::{Certificate, CertificateResponse, describe_one};
use crate::model::course::{
    Course, CourseDetailResponse, CourseSummary, Lesson, LessonDetailResponse, LessonSummary,
};
use crate::model::deadline::{self, DeadlineFilter};
use crate::payloads::account::{LoginPayload, RegisterPayload, Role};
use crate::response::ApiResponse;
use crate::schema::{certificates, courses, lessons, students, users};
use anyhow::Context;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Json, Response};
use deadpool_diesel::sqlite::Pool;
use diesel::dsl::exists;
use diesel::prelude::*;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Creates an account. Students also get their student profile.
///
/// Request Body: `RegisterPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `AccountResponse`: The new account (200 OK).
/// * `400 Bad Request`: If username or password is empty.
/// * `409 Conflict`: If the username is taken.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn register(
    State(pool): State<Pool>,
    Json(payload): Json<RegisterPayload>,
) -> Result<ApiResponse<AccountResponse>, AppError> {
    let username = payload.username.trim().to_string();
    info!(
        "Attempting to register user '{}' as {:?}",
        username, payload.role
    );

    if username.is_empty() || payload.password.is_empty() {
        warn!("Registration rejected: empty username or password");
        return Err(AppError::BadRequest(
            "Username and password must not be empty.".to_string(),
        ));
    }

    let account = helper::with_connection(&pool, move |conn| {
        let password_hash = bcrypt::hash(&payload.password, bcrypt::DEFAULT_COST)
            .context("Failed to hash password")?;

        conn.transaction::<_, AppError, _>(|tx| {
            let taken = diesel::select(exists(users::table.filter(users::username.eq(&username))))
                .get_result::<bool>(tx)?;
            if taken {
                warn!("Username '{}' is already taken", username);
                return Err(AppError::Conflict(format!(
                    "Username '{}' is already taken.",
                    username
                )));
            }

            let user = diesel::insert_into(users::table)
                .values(&NewUser {
                    username: username.clone(),
                    first_name: payload.first_name.trim().to_string(),
                    last_name: payload.last_name.trim().to_string(),
                    email: payload.email.trim().to_string(),
                    password_hash,
                    is_staff: payload.role == Role::Teacher,
                })
                .returning(User::as_returning())
                .get_result(tx)?;

            let student_id = match payload.role {
                Role::Student => Some(
                    diesel::insert_into(students::table)
                        .values(&NewStudent { user_id: user.id })
                        .returning(students::id)
                        .get_result::<i64>(tx)?,
                ),
                Role::Teacher => None,
            };

            Ok(AccountResponse::new(&user, student_id))
        })
    })
    .await?;

    info!(
        "Registered user '{}' with ID {}",
        account.username, account.id
    );
    Ok(ApiResponse::ok(account))
}

/// Checks a username/password pair.
///
/// Request Body: `LoginPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `AccountResponse`: The matching account (200 OK).
/// * `401 Unauthorized`: If the credentials do not match.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn login(
    State(pool): State<Pool>,
    Json(payload): Json<LoginPayload>,
) -> Result<ApiResponse<AccountResponse>, AppError> {
    info!("Login attempt for user '{}'", payload.username);

    let account = helper::with_connection(&pool, move |conn| {
        let invalid = || AppError::Unauthorized("Invalid username or password.".to_string());

        let user = users::table
            .filter(users::username.eq(payload.username.trim()))
            .select(User::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(invalid)?;

        let matches = bcrypt::verify(&payload.password, &user.password_hash)
            .context("Failed to verify password hash")?;
        if !matches {
            warn!("Wrong password for user '{}'", user.username);
            return Err(invalid());
        }

        let student_id = students::table
            .filter(students::user_id.eq(user.id))
            .select(students::id)
            .first::<i64>(conn)
            .optional()?;

        Ok(AccountResponse::new(&user, student_id))
    })
    .await?;

    info!("User '{}' authenticated", account.username);
    Ok(ApiResponse::ok(account))
}

/// Lists all courses with their teacher.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<CourseSummary>` ordered by ID (200 OK).
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool))]
pub async fn list_courses(
    State(pool): State<Pool>,
) -> Result<ApiResponse<Vec<CourseSummary>>, AppError> {
    info!("Fetching course list");

    let rows = helper::run_query(&pool, |conn| {
        courses::table
            .inner_join(users::table)
            .order(courses::id.asc())
            .select((
                Course::as_select(),
                users::first_name,
                users::last_name,
                users::username,
            ))
            .load::<(Course, String, String, String)>(conn)
    })
    .await?;

    let courses = rows
        .into_iter()
        .map(|(course, first, last, username)| course_summary(course, &first, &last, &username))
        .collect::<Vec<_>>();

    info!("Fetched {} courses", courses.len());
    Ok(ApiResponse::ok(courses))
}

/// Retrieves a course and its lessons.
///
/// Path Parameters:
/// * course_id as `i64`
///
/// Returns (wrapped in `ApiResponse`)
/// * `CourseDetailResponse` (200 OK).
/// * `404 Not Found`: If the course does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool))]
pub async fn get_course(
    State(pool): State<Pool>,
    Path(course_id): Path<i64>,
) -> Result<ApiResponse<CourseDetailResponse>, AppError> {
    info!("Fetching course {}", course_id);

    let detail = helper::with_connection(&pool, move |conn| {
        let (course, first, last, username) = courses::table
            .inner_join(users::table)
            .filter(courses::id.eq(course_id))
            .select((
                Course::as_select(),
                users::first_name,
                users::last_name,
                users::username,
            ))
            .first::<(Course, String, String, String)>(conn)
            .optional()?
            .ok_or_else(|| AppError::NotFound(format!("Course with ID {} not found.", course_id)))?;

        let lessons = lessons::table
            .filter(lessons::course_id.eq(course_id))
            .order(lessons::id.asc())
            .select((lessons::id, lessons::title))
            .load::<LessonSummary>(conn)?;

        Ok(CourseDetailResponse {
            course: course_summary(course, &first, &last, &username),
            lessons,
        })
    })
    .await?;

    Ok(ApiResponse::ok(detail))
}

/// Retrieves a lesson with the deadlines attached to it.
///
/// Path Parameters:
/// * lesson_id as `i64`
///
/// Returns (wrapped in `ApiResponse`)
/// * `LessonDetailResponse` (200 OK).
/// * `404 Not Found`: If the lesson does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool))]
pub async fn get_lesson(
    State(pool): State<Pool>,
    Path(lesson_id): Path<i64>,
) -> Result<ApiResponse<LessonDetailResponse>, AppError> {
    info!("Fetching lesson {}", lesson_id);

    let detail = helper::with_connection(&pool, move |conn| {
        let (lesson, course_title) = lessons::table
            .inner_join(courses::table)
            .filter(lessons::id.eq(lesson_id))
            .select((Lesson::as_select(), courses::title))
            .first::<(Lesson, String)>(conn)
            .optional()?
            .ok_or_else(|| AppError::NotFound(format!("Lesson with ID {} not found.", lesson_id)))?;

        let deadlines = deadline::list(
            conn,
            DeadlineFilter {
                lesson_id: Some(lesson_id),
                ..Default::default()
            },
        )?;

        Ok(LessonDetailResponse {
            id: lesson.id,
            course_id: lesson.course_id,
            course_title,
            title: lesson.title,
            content: lesson.content,
            deadlines,
        })
    })
    .await?;

    Ok(ApiResponse::ok(detail))
}

/// Public lookup of a certificate by its opaque identifier.
///
/// Path Parameters:
/// * uid as `String`
///
/// Returns (wrapped in `ApiResponse`)
/// * `CertificateResponse` (200 OK).
/// * `404 Not Found`: If no certificate has this identifier.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool))]
pub async fn verify_certificate(
    State(pool): State<Pool>,
    Path(uid): Path<String>,
) -> Result<ApiResponse<CertificateResponse>, AppError> {
    info!("Verifying certificate {}", uid);

    let certificate = helper::with_connection(&pool, move |conn| {
        let row = certificates::table
            .filter(certificates::uid.eq(&uid))
            .select(Certificate::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| AppError::NotFound(format!("Certificate '{}' not found.", uid)))?;
        Ok(describe_one(conn, row)?)
    })
    .await?;

    Ok(ApiResponse::ok(certificate))
}

/// Streams the linked certificate PDF.
///
/// Path Parameters:
/// * uid as `String`
///
/// Returns
/// * `application/pdf` body (200 OK).
/// * `404 Not Found`: If the certificate is unknown or has no PDF on disk.
/// * `500 Internal Server Error`: If a database or filesystem error occurs.
#[instrument(skip(pool, renderer))]
pub async fn download_certificate(
    State(pool): State<Pool>,
    State(renderer): State<Arc<CertificateRenderer>>,
    Path(uid): Path<String>,
) -> Result<Response, AppError> {
    info!("Downloading certificate {}", uid);

    let lookup_uid = uid.clone();
    let link = helper::run_query(&pool, move |conn| {
        certificates::table
            .filter(certificates::uid.eq(lookup_uid))
            .select(certificates::pdf_path)
            .first::<Option<String>>(conn)
            .optional()
    })
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Certificate '{}' not found.", uid)))?
    .ok_or_else(|| AppError::NotFound(format!("Certificate '{}' has no PDF yet.", uid)))?;

    let file = renderer.paths().resolve(&link);
    let bytes = match tokio::fs::read(&file).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Linked PDF {} is missing on disk", file.display());
            return Err(AppError::NotFound(format!(
                "Certificate '{}' has no PDF yet.",
                uid
            )));
        }
        Err(e) => {
            error!("Failed to read {}: {:?}", file.display(), e);
            return Err(AppError::InternalServerError(
                anyhow::Error::new(e).context("Failed to read certificate PDF"),
            ));
        }
    };

    let headers = [
        (header::CONTENT_TYPE, "application/pdf".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"certificate-{}.pdf\"", uid),
        ),
    ];
    Ok((headers, bytes).into_response())
}

fn course_summary(course: Course, first: &str, last: &str, username: &str) -> CourseSummary {
    CourseSummary {
        id: course.id,
        title: course.title,
        description: course.description,
        teacher_id: course.teacher_id,
        teacher_name: display_name(first, last, username),
    }
}
