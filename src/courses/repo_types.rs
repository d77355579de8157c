use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "Beginner",
            Difficulty::Intermediate => "Intermediate",
            Difficulty::Advanced => "Advanced",
        }
    }
}

impl FromStr for Difficulty {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Beginner" => Ok(Difficulty::Beginner),
            "Intermediate" => Ok(Difficulty::Intermediate),
            "Advanced" => Ok(Difficulty::Advanced),
            other => anyhow::bail!("unknown difficulty level {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Dropped,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Completed => "completed",
            EnrollmentStatus::Dropped => "dropped",
        }
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnrollmentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(EnrollmentStatus::Active),
            "completed" => Ok(EnrollmentStatus::Completed),
            "dropped" => Ok(EnrollmentStatus::Dropped),
            other => anyhow::bail!("unknown enrollment status {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Course {
    pub course_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub difficulty_level: Difficulty,
    pub created_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, FromRow)]
pub struct CourseRow {
    pub course_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub difficulty_level: String,
    pub created_by: String,
    pub created_at: OffsetDateTime,
}

impl TryFrom<CourseRow> for Course {
    type Error = anyhow::Error;

    fn try_from(r: CourseRow) -> Result<Self, Self::Error> {
        Ok(Self {
            course_id: r.course_id,
            title: r.title,
            description: r.description,
            category: r.category,
            difficulty_level: r.difficulty_level.parse()?,
            created_by: r.created_by,
            created_at: r.created_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewCourse {
    pub course_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub difficulty_level: Difficulty,
    pub created_by: String,
}

/// Completion marker for a single lesson.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LessonProgress {
    pub lesson_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct Enrollment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: String,
    pub status: EnrollmentStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub enrolled_at: OffsetDateTime,
    pub progress: Vec<LessonProgress>,
    pub feedback: Option<String>,
    pub rating: Option<i16>,
}

impl Enrollment {
    pub fn new(user_id: Uuid, course_id: &str, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            course_id: course_id.to_string(),
            status: EnrollmentStatus::Active,
            enrolled_at: now,
            progress: Vec::new(),
            feedback: None,
            rating: None,
        }
    }

    /// Appends a completion marker unless the lesson is already recorded.
    pub fn complete_lesson(&mut self, lesson_id: &str, now: OffsetDateTime) {
        if !self.progress.iter().any(|p| p.lesson_id == lesson_id) {
            self.progress.push(LessonProgress {
                lesson_id: lesson_id.to_string(),
                completed_at: now,
            });
        }
    }

    pub fn apply(&mut self, update: &EnrollmentUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(feedback) = &update.feedback {
            self.feedback = Some(feedback.clone());
        }
        if let Some(rating) = update.rating {
            self.rating = Some(rating);
        }
    }
}

#[derive(Debug, FromRow)]
pub struct EnrollmentRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: String,
    pub status: String,
    pub enrolled_at: OffsetDateTime,
    pub progress: Json<Vec<LessonProgress>>,
    pub feedback: Option<String>,
    pub rating: Option<i16>,
}

impl TryFrom<EnrollmentRow> for Enrollment {
    type Error = anyhow::Error;

    fn try_from(r: EnrollmentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            course_id: r.course_id,
            status: r.status.parse()?,
            enrolled_at: r.enrolled_at,
            progress: r.progress.0,
            feedback: r.feedback,
            rating: r.rating,
        })
    }
}

/// Partial update applied to an enrollment; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct EnrollmentUpdate {
    pub status: Option<EnrollmentStatus>,
    pub feedback: Option<String>,
    pub rating: Option<i16>,
}

/// Enrollment joined with the course it refers to.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentWithCourse {
    #[serde(flatten)]
    pub enrollment: Enrollment,
    pub course: Course,
}

#[derive(Debug, FromRow)]
pub struct EnrollmentCourseRow {
    #[sqlx(flatten)]
    pub enrollment: EnrollmentRow,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub difficulty_level: String,
    pub created_by: String,
    pub course_created_at: OffsetDateTime,
}

impl TryFrom<EnrollmentCourseRow> for EnrollmentWithCourse {
    type Error = anyhow::Error;

    fn try_from(r: EnrollmentCourseRow) -> Result<Self, Self::Error> {
        let enrollment = Enrollment::try_from(r.enrollment)?;
        let course = Course {
            course_id: enrollment.course_id.clone(),
            title: r.title,
            description: r.description,
            category: r.category,
            difficulty_level: r.difficulty_level.parse()?,
            created_by: r.created_by,
            created_at: r.course_created_at,
        };
        Ok(Self { enrollment, course })
    }
}
