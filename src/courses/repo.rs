use anyhow::Context;
use async_trait::async_trait;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

use crate::courses::repo_types::{
    Course, CourseRow, Enrollment, EnrollmentCourseRow, EnrollmentRow, EnrollmentUpdate,
    EnrollmentWithCourse, NewCourse,
};
use crate::store::PgStore;

const ENROLLMENT_COLUMNS: &str =
    "id, user_id, course_id, status, enrolled_at, progress, feedback, rating";

#[async_trait]
pub trait CourseRepo: Send + Sync {
    async fn find_course(&self, course_id: &str) -> anyhow::Result<Option<Course>>;
    /// Inserts the course; `None` when the course ID is taken.
    async fn create_course(&self, new: NewCourse) -> anyhow::Result<Option<Course>>;
    async fn list_courses(&self) -> anyhow::Result<Vec<Course>>;
}

#[async_trait]
pub trait EnrollmentRepo: Send + Sync {
    /// Inserts an active enrollment. The (user, course) pair is unique at the
    /// storage level; `None` means the pair already exists.
    async fn insert_enrollment(
        &self,
        user_id: Uuid,
        course_id: &str,
    ) -> anyhow::Result<Option<Enrollment>>;
    async fn list_enrollments(&self, user_id: Uuid) -> anyhow::Result<Vec<EnrollmentWithCourse>>;
    /// `None` when the user is not enrolled in the course.
    async fn complete_lesson(
        &self,
        user_id: Uuid,
        course_id: &str,
        lesson_id: &str,
    ) -> anyhow::Result<Option<Enrollment>>;
    /// `None` when the user is not enrolled in the course.
    async fn update_enrollment(
        &self,
        user_id: Uuid,
        course_id: &str,
        update: EnrollmentUpdate,
    ) -> anyhow::Result<Option<Enrollment>>;
}

#[async_trait]
impl CourseRepo for PgStore {
    async fn find_course(&self, course_id: &str) -> anyhow::Result<Option<Course>> {
        let row = sqlx::query_as::<_, CourseRow>(
            r#"
            SELECT course_id, title, description, category, difficulty_level, created_by, created_at
              FROM courses
             WHERE course_id = $1
            "#,
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await
        .context("find course")?;
        row.map(Course::try_from).transpose()
    }

    async fn create_course(&self, new: NewCourse) -> anyhow::Result<Option<Course>> {
        let row = sqlx::query_as::<_, CourseRow>(
            r#"
            INSERT INTO courses (course_id, title, description, category, difficulty_level, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (course_id) DO NOTHING
            RETURNING course_id, title, description, category, difficulty_level, created_by, created_at
            "#,
        )
        .bind(&new.course_id)
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.category)
        .bind(new.difficulty_level.as_str())
        .bind(&new.created_by)
        .fetch_optional(&self.pool)
        .await
        .context("insert course")?;
        row.map(Course::try_from).transpose()
    }

    async fn list_courses(&self) -> anyhow::Result<Vec<Course>> {
        let rows = sqlx::query_as::<_, CourseRow>(
            r#"
            SELECT course_id, title, description, category, difficulty_level, created_by, created_at
              FROM courses
             ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("list courses")?;
        rows.into_iter().map(Course::try_from).collect()
    }
}

#[async_trait]
impl EnrollmentRepo for PgStore {
    async fn insert_enrollment(
        &self,
        user_id: Uuid,
        course_id: &str,
    ) -> anyhow::Result<Option<Enrollment>> {
        let row = sqlx::query_as::<_, EnrollmentRow>(&format!(
            r#"
            INSERT INTO enrollments (id, user_id, course_id, status)
            VALUES ($1, $2, $3, 'active')
            ON CONFLICT (user_id, course_id) DO NOTHING
            RETURNING {ENROLLMENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await
        .context("insert enrollment")?;
        row.map(Enrollment::try_from).transpose()
    }

    async fn list_enrollments(&self, user_id: Uuid) -> anyhow::Result<Vec<EnrollmentWithCourse>> {
        let rows = sqlx::query_as::<_, EnrollmentCourseRow>(
            r#"
            SELECT e.id, e.user_id, e.course_id, e.status, e.enrolled_at, e.progress,
                   e.feedback, e.rating,
                   c.title, c.description, c.category, c.difficulty_level, c.created_by,
                   c.created_at AS course_created_at
              FROM enrollments e
              JOIN courses c ON c.course_id = e.course_id
             WHERE e.user_id = $1
             ORDER BY e.enrolled_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("list enrollments")?;
        rows.into_iter().map(EnrollmentWithCourse::try_from).collect()
    }

    async fn complete_lesson(
        &self,
        user_id: Uuid,
        course_id: &str,
        lesson_id: &str,
    ) -> anyhow::Result<Option<Enrollment>> {
        let completed_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .context("format completion time")?;
        let row = sqlx::query_as::<_, EnrollmentRow>(&format!(
            r#"
            UPDATE enrollments
               SET progress = CASE
                   WHEN progress @> jsonb_build_array(jsonb_build_object('lesson_id', $3::text))
                   THEN progress
                   ELSE progress || jsonb_build_array(
                       jsonb_build_object('lesson_id', $3::text, 'completed_at', $4::text))
                   END
             WHERE user_id = $1 AND course_id = $2
            RETURNING {ENROLLMENT_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(course_id)
        .bind(lesson_id)
        .bind(completed_at)
        .fetch_optional(&self.pool)
        .await
        .context("complete lesson")?;
        row.map(Enrollment::try_from).transpose()
    }

    async fn update_enrollment(
        &self,
        user_id: Uuid,
        course_id: &str,
        update: EnrollmentUpdate,
    ) -> anyhow::Result<Option<Enrollment>> {
        let row = sqlx::query_as::<_, EnrollmentRow>(&format!(
            r#"
            UPDATE enrollments
               SET status   = COALESCE($3, status),
                   feedback = COALESCE($4, feedback),
                   rating   = COALESCE($5, rating)
             WHERE user_id = $1 AND course_id = $2
            RETURNING {ENROLLMENT_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(course_id)
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.feedback)
        .bind(update.rating)
        .fetch_optional(&self.pool)
        .await
        .context("update enrollment")?;
        row.map(Enrollment::try_from).transpose()
    }
}
