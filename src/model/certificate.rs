use crate::certificate::{CertificateDetails, CertificateStore};
use crate::model::account::display_name;
use crate::schema::{certificates, courses, students, users};
use anyhow::{Context, bail};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = certificates)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Certificate {
    pub id: i64,
    pub uid: String,
    pub student_id: i64,
    pub course_id: i64,
    pub issued_at: NaiveDateTime,
    pub pdf_path: Option<String>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = certificates)]
pub struct NewCertificate {
    pub uid: String,
    pub student_id: i64,
    pub course_id: i64,
    // issued_at has a DB default (CURRENT_TIMESTAMP)
    // pdf_path stays NULL until the renderer links an artifact
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CertificateResponse {
    pub id: i64,
    pub uid: String,
    pub student_id: i64,
    pub student_name: String,
    pub course_id: i64,
    pub course_title: String,
    pub issued_at: NaiveDateTime,
    pub has_pdf: bool,
}

/// Attaches student names and course titles to certificate rows.
pub fn describe(
    conn: &mut SqliteConnection,
    rows: Vec<Certificate>,
) -> QueryResult<Vec<CertificateResponse>> {
    let student_ids: Vec<i64> = rows.iter().map(|c| c.student_id).collect();
    let course_ids: Vec<i64> = rows.iter().map(|c| c.course_id).collect();

    let student_names: HashMap<i64, String> = students::table
        .inner_join(users::table)
        .filter(students::id.eq_any(student_ids))
        .select((
            students::id,
            users::first_name,
            users::last_name,
            users::username,
        ))
        .load::<(i64, String, String, String)>(conn)?
        .into_iter()
        .map(|(id, first, last, username)| (id, display_name(&first, &last, &username)))
        .collect();

    let course_titles: HashMap<i64, String> = courses::table
        .filter(courses::id.eq_any(course_ids))
        .select((courses::id, courses::title))
        .load::<(i64, String)>(conn)?
        .into_iter()
        .collect();

    Ok(rows
        .into_iter()
        .map(|c| CertificateResponse {
            student_name: student_names
                .get(&c.student_id)
                .cloned()
                .unwrap_or_default(),
            course_title: course_titles.get(&c.course_id).cloned().unwrap_or_default(),
            has_pdf: c.pdf_path.is_some(),
            id: c.id,
            uid: c.uid,
            student_id: c.student_id,
            course_id: c.course_id,
            issued_at: c.issued_at,
        })
        .collect())
}

pub fn describe_one(
    conn: &mut SqliteConnection,
    row: Certificate,
) -> QueryResult<CertificateResponse> {
    describe(conn, vec![row])?
        .pop()
        .ok_or(diesel::result::Error::NotFound)
}

/// Loads everything the renderer prints on a certificate.
pub fn load_details(
    conn: &mut SqliteConnection,
    certificate_id: i64,
) -> QueryResult<CertificateDetails> {
    let certificate = certificates::table
        .find(certificate_id)
        .select(Certificate::as_select())
        .first(conn)?;

    let (first, last, username) = students::table
        .inner_join(users::table)
        .filter(students::id.eq(certificate.student_id))
        .select((users::first_name, users::last_name, users::username))
        .first::<(String, String, String)>(conn)?;

    let (course_title, teacher_id) = courses::table
        .find(certificate.course_id)
        .select((courses::title, courses::teacher_id))
        .first::<(String, i64)>(conn)?;

    let (teacher_first, teacher_last, teacher_username) = users::table
        .find(teacher_id)
        .select((users::first_name, users::last_name, users::username))
        .first::<(String, String, String)>(conn)?;

    Ok(CertificateDetails {
        id: certificate.id,
        uid: certificate.uid,
        issued_at: certificate.issued_at,
        pdf_path: certificate.pdf_path,
        student_name: display_name(&first, &last, &username),
        course_title,
        instructor_name: display_name(&teacher_first, &teacher_last, &teacher_username),
    })
}

impl CertificateStore for SqliteConnection {
    fn attach_pdf(&mut self, certificate_id: i64, pdf_path: &str) -> anyhow::Result<()> {
        let updated = diesel::update(certificates::table.find(certificate_id))
            .set(certificates::pdf_path.eq(pdf_path))
            .execute(self)
            .with_context(|| format!("Failed to link PDF to certificate {}", certificate_id))?;

        if updated != 1 {
            bail!(
                "Linking PDF to certificate {} affected {} rows, expected 1",
                certificate_id,
                updated
            );
        }
        Ok(())
    }
}
