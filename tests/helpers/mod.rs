#![allow(dead_code)]

use axum::Router;
pub(crate) use axum_test::TestServer;
pub(crate) use deadpool_diesel::sqlite::Pool as TestPool;
use diesel::prelude::*;
use image::{Rgb, RgbImage};
use lms_server::certificate::{
    CertificatePaths, CertificateRenderer, CertificateSettings, PdfBackend,
};
use lms_server::model::account::{NewStudent, NewUser};
use lms_server::model::certificate::Certificate;
use lms_server::model::course::{NewCourse, NewEnrollment, NewLesson};
use lms_server::model::homework::NewHomeworkSubmission;
use lms_server::{init_pool, init_test_router, run_migrations, schema};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// test infra setup

/// A migrated database and a media root, both inside one temporary
/// directory that lives as long as this value.
pub struct TestEnv {
    pub server: TestServer,
    pub pool: TestPool,
    pub dir: TempDir,
}

impl TestEnv {
    pub fn media_root(&self) -> PathBuf {
        self.dir.path().join("media")
    }

    pub fn paths(&self) -> CertificatePaths {
        CertificatePaths::new(self.media_root())
    }
}

pub fn test_settings(media_root: &Path) -> CertificateSettings {
    CertificateSettings {
        media_root: media_root.to_path_buf(),
        font_path: None,
        pdf_font_dir: media_root.join("no-such-fonts"),
        pdf_font_name: "Missing".to_string(),
    }
}

pub async fn setup_test_environment() -> TestEnv {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let media_root = dir.path().join("media");
    let renderer = CertificateRenderer::new(test_settings(&media_root));
    setup_with_renderer(dir, renderer)
}

pub async fn setup_test_environment_with_backends(backends: Vec<Box<dyn PdfBackend>>) -> TestEnv {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let media_root = dir.path().join("media");
    let renderer = CertificateRenderer::with_backends(test_settings(&media_root), backends);
    setup_with_renderer(dir, renderer)
}

fn setup_with_renderer(dir: TempDir, renderer: CertificateRenderer) -> TestEnv {
    let db_path = dir.path().join("test.sqlite3");
    let db_url = db_path.to_str().expect("Temp path is not UTF-8").to_string();

    run_migrations(&db_url).expect("Failed to migrate test database");
    let pool = init_pool(&db_url, 8).expect("Failed to create test database pool");

    let app: Router = init_test_router(pool.clone(), renderer);
    let server = TestServer::new(app).expect("Failed to create TestServer");
    TestEnv { server, pool, dir }
}

/// Writes a small plain template to `media_root`.
pub fn write_test_template(media_root: &Path) -> PathBuf {
    let target = CertificatePaths::new(media_root).template();
    std::fs::create_dir_all(target.parent().unwrap()).expect("Failed to create template dir");
    RgbImage::from_pixel(400, 300, Rgb([245, 245, 230]))
        .save(&target)
        .expect("Failed to write test template");
    target
}

// fixtures

async fn insert_user(pool: &TestPool, username: &'static str, is_staff: bool) -> i64 {
    let conn = pool.get().await.expect("Failed to get conn for user insert");
    conn.interact(move |conn| {
        diesel::insert_into(schema::users::table)
            .values(&NewUser {
                username: username.to_string(),
                first_name: String::new(),
                last_name: String::new(),
                email: format!("{}@example.com", username),
                password_hash: "not-a-real-hash".to_string(),
                is_staff,
            })
            .returning(schema::users::id)
            .get_result::<i64>(conn)
    })
    .await
    .expect("Interact failed for user insert")
    .expect("Failed to insert test user")
}

pub async fn create_test_teacher(pool: &TestPool, username: &'static str) -> i64 {
    insert_user(pool, username, true).await
}

/// Returns `(user_id, student_id)`.
pub async fn create_test_student(pool: &TestPool, username: &'static str) -> (i64, i64) {
    let user_id = insert_user(pool, username, false).await;
    let conn = pool.get().await.expect("Failed to get conn for student insert");
    let student_id = conn
        .interact(move |conn| {
            diesel::insert_into(schema::students::table)
                .values(&NewStudent { user_id })
                .returning(schema::students::id)
                .get_result::<i64>(conn)
        })
        .await
        .expect("Interact failed for student insert")
        .expect("Failed to insert test student");
    (user_id, student_id)
}

pub async fn set_test_user_name(
    pool: &TestPool,
    user_id: i64,
    first_name: &'static str,
    last_name: &'static str,
) {
    let conn = pool.get().await.expect("Failed to get conn for name update");
    conn.interact(move |conn| {
        diesel::update(schema::users::table.find(user_id))
            .set((
                schema::users::first_name.eq(first_name),
                schema::users::last_name.eq(last_name),
            ))
            .execute(conn)
    })
    .await
    .expect("Interact failed for name update")
    .expect("Failed to update test user name");
}

pub async fn create_test_course(pool: &TestPool, teacher_id: i64, title: &'static str) -> i64 {
    let conn = pool.get().await.expect("Failed to get conn for course insert");
    conn.interact(move |conn| {
        diesel::insert_into(schema::courses::table)
            .values(&NewCourse {
                title: title.to_string(),
                description: format!("{} description", title),
                teacher_id,
            })
            .returning(schema::courses::id)
            .get_result::<i64>(conn)
    })
    .await
    .expect("Interact failed for course insert")
    .expect("Failed to insert test course")
}

pub async fn create_test_lesson(pool: &TestPool, course_id: i64, title: &'static str) -> i64 {
    let conn = pool.get().await.expect("Failed to get conn for lesson insert");
    conn.interact(move |conn| {
        diesel::insert_into(schema::lessons::table)
            .values(&NewLesson {
                course_id,
                title: title.to_string(),
                content: format!("{} content", title),
            })
            .returning(schema::lessons::id)
            .get_result::<i64>(conn)
    })
    .await
    .expect("Interact failed for lesson insert")
    .expect("Failed to insert test lesson")
}

pub async fn enroll_test_student(pool: &TestPool, course_id: i64, student_id: i64) {
    let conn = pool.get().await.expect("Failed to get conn for enrollment");
    conn.interact(move |conn| {
        diesel::insert_into(schema::course_students::table)
            .values(&NewEnrollment {
                course_id,
                student_id,
            })
            .execute(conn)
    })
    .await
    .expect("Interact failed for enrollment")
    .expect("Failed to insert test enrollment");
}

pub async fn create_test_submission(
    pool: &TestPool,
    lesson_id: i64,
    student_id: i64,
    content: &'static str,
) -> i64 {
    let conn = pool.get().await.expect("Failed to get conn for submission insert");
    conn.interact(move |conn| {
        diesel::insert_into(schema::homework_submissions::table)
            .values(&NewHomeworkSubmission {
                lesson_id,
                student_id,
                content: content.to_string(),
            })
            .returning(schema::homework_submissions::id)
            .get_result::<i64>(conn)
    })
    .await
    .expect("Interact failed for submission insert")
    .expect("Failed to insert test submission")
}

pub async fn grade_test_submission(pool: &TestPool, submission_id: i64, grade: i32) {
    let conn = pool.get().await.expect("Failed to get conn for grading");
    conn.interact(move |conn| {
        diesel::update(schema::homework_submissions::table.find(submission_id))
            .set((
                schema::homework_submissions::grade.eq(Some(grade)),
                schema::homework_submissions::is_graded.eq(true),
            ))
            .execute(conn)
    })
    .await
    .expect("Interact failed for grading")
    .expect("Failed to grade test submission");
}

// checks

pub async fn get_certificates_for(
    pool: &TestPool,
    student_id: i64,
    course_id: i64,
) -> Vec<Certificate> {
    let conn = pool.get().await.expect("Failed to get conn for certificate check");
    conn.interact(move |conn| {
        schema::certificates::table
            .filter(schema::certificates::student_id.eq(student_id))
            .filter(schema::certificates::course_id.eq(course_id))
            .select(Certificate::as_select())
            .load::<Certificate>(conn)
    })
    .await
    .expect("Interact failed for certificate check")
    .expect("Failed to load certificates")
}

pub async fn get_submission_grade(pool: &TestPool, submission_id: i64) -> (bool, Option<i32>) {
    let conn = pool.get().await.expect("Failed to get conn for submission check");
    conn.interact(move |conn| {
        schema::homework_submissions::table
            .find(submission_id)
            .select((
                schema::homework_submissions::is_graded,
                schema::homework_submissions::grade,
            ))
            .first::<(bool, Option<i32>)>(conn)
    })
    .await
    .expect("Interact failed for submission check")
    .expect("Failed to load submission")
}

pub async fn submission_exists(pool: &TestPool, submission_id: i64) -> bool {
    let conn = pool.get().await.expect("Failed to get conn for submission check");
    conn.interact(move |conn| {
        diesel::select(diesel::dsl::exists(
            schema::homework_submissions::table.find(submission_id),
        ))
        .get_result::<bool>(conn)
    })
    .await
    .expect("Interact failed for submission check")
    .expect("Failed to check submission")
}
