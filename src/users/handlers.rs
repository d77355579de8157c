use axum::{
    extract::{Path, Query, State},
    Json,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        claims::Role,
        dto::PublicUser,
        extractors::CurrentUser,
        handlers::audit,
        policy::{Access, RouteSpec, Verb, ADMIN},
        repo_types::{Activity, User},
    },
    courses::dto::MessageResponse,
    error::{AppError, AppResult},
    extract::AppJson,
    state::AppState,
    users::dto::{SearchQuery, UpdateProfileRequest},
};

pub fn routes() -> Vec<RouteSpec> {
    vec![
        RouteSpec::new(Verb::Get, "/users", ADMIN, list_users),
        RouteSpec::new(Verb::Get, "/users/search", ADMIN, search_users),
        RouteSpec::new(Verb::Get, "/users/:user_id", Access::Authenticated, get_user),
        RouteSpec::new(Verb::Put, "/users/:user_id", Access::Authenticated, update_user),
        RouteSpec::new(Verb::Delete, "/users/:user_id", ADMIN, delete_user),
    ]
}

fn not_found(raw: &str) -> AppError {
    AppError::not_found(format!("User with ID {raw} not found."))
}

/// A malformed id can never match a user, so it reads as not found.
fn parse_user_id(raw: &str) -> AppResult<Uuid> {
    raw.parse().map_err(|_| not_found(raw))
}

fn ensure_self_or_admin(caller: &User, target: Uuid) -> AppResult<()> {
    if caller.id == target || caller.role == Role::Admin {
        return Ok(());
    }
    warn!(caller = %caller.id, %target, "access to another user's profile");
    Err(AppError::forbidden(
        "You do not have permission to access this resource",
    ))
}

fn public(users: Vec<User>) -> Json<Vec<PublicUser>> {
    Json(users.iter().map(PublicUser::from).collect())
}

#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<PublicUser>>> {
    Ok(public(state.store.list_users().await?))
}

#[instrument(skip(state))]
pub async fn search_users(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Vec<PublicUser>>> {
    Ok(public(state.store.search_users(query.q.trim()).await?))
}

#[instrument(skip(state, caller), fields(caller = %caller.0.id))]
pub async fn get_user(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(raw_id): Path<String>,
) -> AppResult<Json<PublicUser>> {
    let id = parse_user_id(&raw_id)?;
    ensure_self_or_admin(&caller.0, id)?;
    let user = state
        .store
        .find_user_by_id(id)
        .await?
        .ok_or_else(|| not_found(&raw_id))?;
    Ok(Json(PublicUser::from(&user)))
}

#[instrument(skip(state, caller, payload), fields(caller = %caller.0.id))]
pub async fn update_user(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(raw_id): Path<String>,
    AppJson(payload): AppJson<UpdateProfileRequest>,
) -> AppResult<Json<PublicUser>> {
    let id = parse_user_id(&raw_id)?;
    ensure_self_or_admin(&caller.0, id)?;
    let update = payload.into_update()?;

    let user = state
        .store
        .update_profile(id, update)
        .await?
        .ok_or_else(|| not_found(&raw_id))?;
    audit(&state, &user.email, Activity::ProfileUpdated).await;

    info!(user_id = %user.id, "profile updated");
    Ok(Json(PublicUser::from(&user)))
}

#[instrument(skip(state, caller), fields(caller = %caller.0.id))]
pub async fn delete_user(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(raw_id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let id = parse_user_id(&raw_id)?;
    let user = state
        .store
        .find_user_by_id(id)
        .await?
        .ok_or_else(|| not_found(&raw_id))?;

    if !state.store.delete_user(id).await? {
        // removed concurrently between the lookup and the delete
        return Err(not_found(&raw_id));
    }
    audit(&state, &user.email, Activity::UserDeleted).await;

    info!(user_id = %id, "user deleted");
    Ok(Json(MessageResponse {
        message: format!("User {} deleted", user.email),
    }))
}
