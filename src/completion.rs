//! Decides when a graded submission completes a course and issues the
//! course certificate.

use crate::model::certificate::{Certificate, NewCertificate};
use crate::model::homework::HomeworkSubmission;
use crate::schema::{certificates, homework_submissions, lessons};
use diesel::prelude::*;
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    /// The submission is not graded; nothing was evaluated.
    NotGraded,
    Incomplete,
    /// The pair already had a certificate; nothing was written.
    AlreadyCertified(Certificate),
    /// This evaluation created the certificate.
    Certified(Certificate),
}

/// A course is complete when it has lessons and every one of them has a
/// graded submission. Courses without lessons are never complete.
pub fn is_course_complete(lesson_ids: &[i64], graded_lesson_ids: &HashSet<i64>) -> bool {
    !lesson_ids.is_empty() && lesson_ids.iter().all(|id| graded_lesson_ids.contains(id))
}

/// Re-evaluates completion after `submission` was written.
///
/// Run this inside the transaction that graded the submission so the grade
/// and the certificate land together.
pub fn evaluate_submission(
    conn: &mut SqliteConnection,
    submission: &HomeworkSubmission,
) -> QueryResult<CompletionOutcome> {
    if !submission.is_graded {
        return Ok(CompletionOutcome::NotGraded);
    }

    let course_id = lessons::table
        .find(submission.lesson_id)
        .select(lessons::course_id)
        .first::<i64>(conn)?;

    evaluate_course(conn, submission.student_id, course_id)
}

pub fn evaluate_course(
    conn: &mut SqliteConnection,
    student_id: i64,
    course_id: i64,
) -> QueryResult<CompletionOutcome> {
    let lesson_ids = lessons::table
        .filter(lessons::course_id.eq(course_id))
        .select(lessons::id)
        .load::<i64>(conn)?;

    let graded_lesson_ids: HashSet<i64> = homework_submissions::table
        .inner_join(lessons::table)
        .filter(lessons::course_id.eq(course_id))
        .filter(homework_submissions::student_id.eq(student_id))
        .filter(homework_submissions::is_graded.eq(true))
        .select(homework_submissions::lesson_id)
        .load::<i64>(conn)?
        .into_iter()
        .collect();

    if !is_course_complete(&lesson_ids, &graded_lesson_ids) {
        debug!(
            "Student {} has {}/{} lessons of course {} graded",
            student_id,
            graded_lesson_ids.len(),
            lesson_ids.len(),
            course_id
        );
        return Ok(CompletionOutcome::Incomplete);
    }

    // get-or-create; the (student_id, course_id) unique index decides who creates
    let created = diesel::insert_into(certificates::table)
        .values(&NewCertificate {
            uid: Uuid::new_v4().to_string(),
            student_id,
            course_id,
        })
        .on_conflict((certificates::student_id, certificates::course_id))
        .do_nothing()
        .execute(conn)?;

    let certificate = certificates::table
        .filter(certificates::student_id.eq(student_id))
        .filter(certificates::course_id.eq(course_id))
        .select(Certificate::as_select())
        .first(conn)?;

    if created == 1 {
        info!(
            "Student {} completed course {}, issued certificate {}",
            student_id, course_id, certificate.uid
        );
        Ok(CompletionOutcome::Certified(certificate))
    } else {
        Ok(CompletionOutcome::AlreadyCertified(certificate))
    }
}
