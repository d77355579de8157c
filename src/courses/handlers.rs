use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        extractors::CurrentUser,
        policy::{Access, RouteSpec, Verb, STAFF, STUDENT},
    },
    courses::{
        dto::{CreateCourseRequest, MessageResponse, UpdateEnrollmentRequest},
        repo_types::{Course, Enrollment, EnrollmentWithCourse},
    },
    error::{AppError, AppResult},
    extract::AppJson,
    state::AppState,
};

pub fn routes() -> Vec<RouteSpec> {
    vec![
        RouteSpec::new(Verb::Get, "/courses", Access::Public, list_courses),
        RouteSpec::new(Verb::Post, "/courses", STAFF, create_course),
        RouteSpec::new(
            Verb::Get,
            "/courses/enrollments/test",
            Access::Authenticated,
            list_my_enrollments,
        ),
        RouteSpec::new(Verb::Get, "/courses/:course_id", Access::Public, get_course),
        RouteSpec::new(Verb::Post, "/courses/:course_id/enroll", STUDENT, enroll),
        RouteSpec::new(
            Verb::Put,
            "/courses/:course_id/enrollment",
            STUDENT,
            update_enrollment,
        ),
        RouteSpec::new(
            Verb::Post,
            "/courses/:course_id/lessons/:lesson_id/complete",
            STUDENT,
            complete_lesson,
        ),
    ]
}

#[instrument(skip(state))]
pub async fn list_courses(State(state): State<AppState>) -> AppResult<Json<Vec<Course>>> {
    Ok(Json(state.store.list_courses().await?))
}

#[instrument(skip(state))]
pub async fn get_course(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> AppResult<Json<Course>> {
    state
        .store
        .find_course(&course_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Course not found"))
}

#[instrument(skip(state, caller, payload))]
pub async fn create_course(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    AppJson(payload): AppJson<CreateCourseRequest>,
) -> AppResult<(StatusCode, Json<Course>)> {
    let new = payload.into_new_course(&caller.email)?;
    let course = state.store.create_course(new).await?.ok_or_else(|| {
        warn!(user_id = %caller.id, "duplicate course id");
        AppError::conflict("Course already exists")
    })?;
    info!(course_id = %course.course_id, user_id = %caller.id, "course created");
    Ok((StatusCode::CREATED, Json(course)))
}

#[instrument(skip(state, caller), fields(user_id = %caller.0.id))]
pub async fn enroll(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(course_id): Path<String>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    let user = caller.0;
    if state.store.find_course(&course_id).await?.is_none() {
        warn!(%course_id, "enroll in unknown course");
        return Err(AppError::not_found("Course not found"));
    }

    if state
        .store
        .insert_enrollment(user.id, &course_id)
        .await?
        .is_none()
    {
        warn!(%course_id, "already enrolled");
        return Err(AppError::conflict("Already enrolled in this course"));
    }

    info!(%course_id, "enrolled");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: format!("Successfully enrolled in course {course_id}"),
        }),
    ))
}

#[instrument(skip(state, caller), fields(user_id = %caller.0.id))]
pub async fn list_my_enrollments(
    State(state): State<AppState>,
    caller: CurrentUser,
) -> AppResult<Json<Vec<EnrollmentWithCourse>>> {
    Ok(Json(state.store.list_enrollments(caller.0.id).await?))
}

#[instrument(skip(state, caller, payload), fields(user_id = %caller.0.id))]
pub async fn update_enrollment(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(course_id): Path<String>,
    AppJson(payload): AppJson<UpdateEnrollmentRequest>,
) -> AppResult<Json<Enrollment>> {
    let update = payload.into_update()?;
    let enrollment = state
        .store
        .update_enrollment(caller.0.id, &course_id, update)
        .await?
        .ok_or_else(|| AppError::not_found("Enrollment not found"))?;
    info!(%course_id, status = %enrollment.status, "enrollment updated");
    Ok(Json(enrollment))
}

#[instrument(skip(state, caller), fields(user_id = %caller.0.id))]
pub async fn complete_lesson(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path((course_id, lesson_id)): Path<(String, String)>,
) -> AppResult<Json<Enrollment>> {
    let enrollment = state
        .store
        .complete_lesson(caller.0.id, &course_id, &lesson_id)
        .await?
        .ok_or_else(|| AppError::not_found("Enrollment not found"))?;
    Ok(Json(enrollment))
}
