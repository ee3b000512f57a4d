use crate::certificate::CertificateRenderer;
use crate::cli::Args;
use anyhow::{Context, anyhow};
use axum::Router;
use axum::extract::FromRef;
use axum::routing::{get, post};
use deadpool_diesel::Runtime;
use deadpool_diesel::sqlite::{Manager, Pool};
use diesel::{Connection, SqliteConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use std::sync::Arc;
use tracing::info;

pub mod certificate;
pub mod cli;
pub mod completion;
pub mod model;
pub mod payloads;
pub mod response;
pub mod schema;

mod api;
mod errors;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub certificates: Arc<CertificateRenderer>,
}

impl FromRef<AppState> for Pool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Arc<CertificateRenderer> {
    fn from_ref(state: &AppState) -> Self {
        state.certificates.clone()
    }
}

pub fn init_router(args: &Args) -> anyhow::Result<Router> {
    info!("Running database migrations...");
    run_migrations(&args.connection_str).context("Failed to migrate database")?;

    info!("Initializing database pool...");
    let pool = init_pool(&args.connection_str, args.db_pool_max_size)
        .context("Failed to initialize database pool")?;

    info!("Initializing certificate renderer...");
    let renderer = CertificateRenderer::new(args.certificate_settings());

    info!("Initializing router...");
    Ok(init_router_internal(AppState {
        pool,
        certificates: Arc::new(renderer),
    }))
}

pub fn init_test_router(pool: Pool, renderer: CertificateRenderer) -> Router {
    init_router_internal(AppState {
        pool,
        certificates: Arc::new(renderer),
    })
}

/// Applies all pending embedded migrations to the database at `conn_str`.
pub fn run_migrations(conn_str: &str) -> anyhow::Result<()> {
    let mut conn = SqliteConnection::establish(conn_str)
        .with_context(|| format!("Failed to open database {}", conn_str))?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow!("Failed to run migrations: {}", e))?;
    Ok(())
}

pub fn init_pool(conn_str: &str, max_size: u32) -> anyhow::Result<Pool> {
    let manager = Manager::new(conn_str, Runtime::Tokio1);
    let pool = Pool::builder(manager).max_size(max_size as usize).build()?;
    Ok(pool)
}

fn init_router_internal(state: AppState) -> Router {
    Router::new()
        .merge(public_routes())
        .merge(deadline_routes())
        .nest("/student", student_routes())
        .nest("/teacher", teacher_routes())
        .with_state(state)
}

fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(api::public::register))
        .route("/login", post(api::public::login))
        .route("/courses", get(api::public::list_courses))
        .route("/courses/{course_id}", get(api::public::get_course))
        .route("/lessons/{lesson_id}", get(api::public::get_lesson))
        .route("/certificates/{uid}", get(api::public::verify_certificate))
        .route(
            "/certificates/{uid}/pdf",
            get(api::public::download_certificate),
        )
}

fn student_routes() -> Router<AppState> {
    Router::new()
        .route("/enroll", post(api::student::enroll))
        .route("/submit_homework", post(api::student::submit_homework))
        .route("/edit_submission", post(api::student::edit_submission))
        .route("/delete_submission", post(api::student::delete_submission))
        .route("/get_submissions", get(api::student::get_submissions))
        .route("/get_dashboard", get(api::student::get_dashboard))
        .route("/get_certificates", get(api::student::get_certificates))
}

fn teacher_routes() -> Router<AppState> {
    Router::new()
        .route("/create_course", post(api::teacher::create_course))
        .route("/create_lesson", post(api::teacher::create_lesson))
        .route(
            "/get_lesson_submissions",
            get(api::teacher::get_lesson_submissions),
        )
        .route("/grade_submission", post(api::teacher::grade_submission))
        .route(
            "/regenerate_certificate",
            post(api::teacher::regenerate_certificate),
        )
}

fn deadline_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/deadlines",
            get(api::deadline::list_deadlines).post(api::deadline::create_deadline),
        )
        .route("/deadlines/calendar", get(api::deadline::get_calendar))
        .route(
            "/deadlines/{deadline_id}",
            get(api::deadline::get_deadline)
                .put(api::deadline::update_deadline)
                .delete(api::deadline::delete_deadline),
        )
}
