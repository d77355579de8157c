use serde::{Deserialize, Serialize};

use crate::{
    courses::repo_types::{Difficulty, EnrollmentStatus, EnrollmentUpdate, NewCourse},
    error::{AppResult, Validator},
};

#[derive(Debug, Deserialize)]
pub struct CreateCourseRequest {
    #[serde(default)]
    pub course_id: String,
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub difficulty_level: String,
}

impl CreateCourseRequest {
    pub fn into_new_course(self, created_by: &str) -> AppResult<NewCourse> {
        let course_id = self.course_id.trim().to_string();
        let title = self.title.trim().to_string();
        let category = self.category.trim().to_string();
        let difficulty = self.difficulty_level.parse::<Difficulty>().ok();

        let mut v = Validator::new();
        v.check(!course_id.is_empty(), "course_id", "course_id should not be empty")
            .check(
                !course_id.contains('/'),
                "course_id",
                "course_id must not contain '/'",
            )
            .check(!title.is_empty(), "title", "title should not be empty")
            .check(!category.is_empty(), "category", "category should not be empty")
            .check(
                difficulty.is_some(),
                "difficulty_level",
                "difficulty_level must be one of the following values: Beginner, Intermediate, Advanced",
            );
        v.finish()?;

        Ok(NewCourse {
            course_id,
            title,
            description: self.description,
            category,
            difficulty_level: difficulty.unwrap_or(Difficulty::Beginner),
            created_by: created_by.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateEnrollmentRequest {
    pub status: Option<EnrollmentStatus>,
    pub feedback: Option<String>,
    pub rating: Option<i16>,
}

impl UpdateEnrollmentRequest {
    pub fn into_update(self) -> AppResult<EnrollmentUpdate> {
        let mut v = Validator::new();
        if let Some(rating) = self.rating {
            v.check((1..=5).contains(&rating), "rating", "rating must be between 1 and 5");
        }
        v.finish()?;
        Ok(EnrollmentUpdate {
            status: self.status,
            feedback: self.feedback,
            rating: self.rating,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
