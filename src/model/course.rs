use crate::model::deadline::DeadlineResponse;
use crate::schema::{course_students, courses, lessons};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = courses)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Course {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub teacher_id: i64,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = courses)]
pub struct NewCourse {
    pub title: String,
    pub description: String,
    pub teacher_id: i64,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = lessons)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Lesson {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub content: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = lessons)]
pub struct NewLesson {
    pub course_id: i64,
    pub title: String,
    pub content: String,
}

/// A single enrollment row; both "students of a course" and "courses of a
/// student" are read from it.
#[derive(Insertable, Debug)]
#[diesel(table_name = course_students)]
pub struct NewEnrollment {
    pub course_id: i64,
    pub student_id: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CourseSummary {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub teacher_id: i64,
    pub teacher_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Queryable)]
pub struct LessonSummary {
    pub id: i64,
    pub title: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CourseDetailResponse {
    pub course: CourseSummary,
    pub lessons: Vec<LessonSummary>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LessonDetailResponse {
    pub id: i64,
    pub course_id: i64,
    pub course_title: String,
    pub title: String,
    pub content: String,
    pub deadlines: Vec<DeadlineResponse>,
}
