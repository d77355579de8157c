use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    Json,
};
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        claims::Role,
        dto::{
            normalize_email, EnableMfaRequest, EnableMfaResponse, LoginRequest, LoginResponse,
            MfaStatus, PublicUser, SessionResponse, SignUpRequest, TokenResponse,
            VerifyOtpRequest,
        },
        extractors::{ClientIp, CurrentUser},
        jwt::JwtKeys,
        password::{hash_password, verify_against_dummy, verify_password},
        policy::{Access, RouteSpec, Verb, ADMIN},
        repo_types::{Activity, AuditLogEntry, FailedLoginEntry, NewUser},
    },
    error::{AppError, AppResult},
    extract::AppJson,
    state::AppState,
};

pub fn routes() -> Vec<RouteSpec> {
    vec![
        RouteSpec::new(Verb::Post, "/auth/signup", Access::Public, signup),
        RouteSpec::new(Verb::Post, "/auth/login", Access::Public, login),
        RouteSpec::new(Verb::Post, "/auth/verify-otp", Access::Public, verify_otp),
        RouteSpec::new(Verb::Post, "/auth/enable-mfa", Access::Authenticated, enable_mfa),
        RouteSpec::new(Verb::Get, "/auth/me", Access::Authenticated, get_me),
        RouteSpec::new(Verb::Get, "/auth/mfa-statuses", ADMIN, mfa_statuses),
        RouteSpec::new(Verb::Get, "/auth/audit-logs", ADMIN, audit_logs),
        RouteSpec::new(Verb::Get, "/auth/failed-logins", ADMIN, failed_logins),
    ]
}

/// Audit writes are best effort: a store failure is logged and the request
/// it describes still completes.
pub(crate) async fn audit(state: &AppState, email: &str, activity: Activity) {
    if let Err(e) = state.store.record_audit(email, activity).await {
        error!(error = %e, activity = activity.as_str(), "audit write failed");
    }
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    AppJson(mut payload): AppJson<SignUpRequest>,
) -> AppResult<(StatusCode, Json<TokenResponse>)> {
    let role = payload.validate().map_err(|e| {
        warn!(email = %payload.email, "invalid signup payload");
        e
    })?;

    if state.store.find_user_by_email(&payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(AppError::conflict("Email already registered"));
    }

    let password_hash = hash_password(&payload.password)?;
    let user = state
        .store
        .create_user(NewUser {
            name: payload.name,
            email: payload.email,
            password_hash,
            role,
            profile_picture_url: payload.profile_picture_url,
        })
        .await?
        // lost a race with a concurrent signup for the same email
        .ok_or_else(|| AppError::conflict("Email already registered"))?;

    let token = JwtKeys::from_ref(&state).sign(user.id, user.role)?;
    audit(&state, &user.email, Activity::Signup).await;

    info!(user_id = %user.id, email = %user.email, role = %user.role, "user registered");
    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}

#[instrument(skip(state, payload), fields(ip = %ip.0))]
pub async fn login(
    State(state): State<AppState>,
    ip: ClientIp,
    AppJson(mut payload): AppJson<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    payload.validate()?;

    let found = state.store.find_user_by_email(&payload.email).await?;
    let password_ok = match &found {
        Some(u) => verify_password(&payload.password, &u.password_hash)?,
        None => {
            verify_against_dummy(&payload.password);
            false
        }
    };

    let user = match found {
        Some(u) if password_ok => u,
        _ => {
            warn!(email = %payload.email, "login invalid credentials");
            if let Err(e) = state.store.record_failed_login(&payload.email, &ip.0).await {
                error!(error = %e, "failed-login write failed");
            }
            return Err(AppError::unauthorized("Invalid credentials"));
        }
    };

    if user.mfa_enabled() {
        audit(&state, &user.email, Activity::LoginMfaPending).await;
        info!(user_id = %user.id, "login awaiting second factor");
        return Ok(Json(LoginResponse::MfaRequired { mfa_enabled: true }));
    }

    let token = JwtKeys::from_ref(&state).sign(user.id, user.role)?;
    audit(&state, &user.email, Activity::Login).await;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(LoginResponse::Session(SessionResponse {
        token,
        role: user.role,
    })))
}

#[instrument(skip(state, payload))]
pub async fn verify_otp(
    State(state): State<AppState>,
    AppJson(payload): AppJson<VerifyOtpRequest>,
) -> AppResult<Json<SessionResponse>> {
    let email = normalize_email(&payload.email);

    let (user, secret) = match state.store.find_user_by_email(&email).await? {
        Some(u) => match u.mfa_secret.clone() {
            Some(secret) => (u, secret),
            None => return Err(AppError::unauthorized("MFA not enabled")),
        },
        None => return Err(AppError::unauthorized("MFA not enabled")),
    };

    let now = OffsetDateTime::now_utc().unix_timestamp().max(0) as u64;
    let Some(step) = state
        .authenticator()
        .matching_step(&secret, &user.email, &payload.otp, now)?
    else {
        warn!(user_id = %user.id, "invalid otp");
        return Err(AppError::unauthorized("Invalid OTP"));
    };

    if !state.store.consume_otp_step(user.id, step as i64).await? {
        warn!(user_id = %user.id, step, "otp replayed");
        return Err(AppError::unauthorized("Invalid OTP"));
    }

    let token = JwtKeys::from_ref(&state).sign(user.id, user.role)?;
    audit(&state, &user.email, Activity::OtpVerified).await;

    info!(user_id = %user.id, "second factor verified");
    Ok(Json(SessionResponse {
        token,
        role: user.role,
    }))
}

#[instrument(skip(state, caller, payload), fields(caller = %caller.0.id))]
pub async fn enable_mfa(
    State(state): State<AppState>,
    caller: CurrentUser,
    AppJson(payload): AppJson<EnableMfaRequest>,
) -> AppResult<Json<EnableMfaResponse>> {
    let CurrentUser(caller) = caller;
    let email = match normalize_email(&payload.email) {
        e if e.is_empty() => caller.email.clone(),
        e => e,
    };

    if email != caller.email && caller.role != Role::Admin {
        warn!(caller = %caller.id, target = %email, "enable-mfa for another account");
        return Err(AppError::forbidden(
            "You do not have permission to access this resource",
        ));
    }

    let user = state
        .store
        .find_user_by_email(&email)
        .await?
        .ok_or_else(|| AppError::unauthorized("User not found"))?;

    let provisioning = state.authenticator().provision(&user.email)?;
    state
        .store
        .set_mfa_secret(user.id, &provisioning.secret_base32)
        .await?;
    audit(&state, &user.email, Activity::MfaEnabled).await;

    info!(user_id = %user.id, "mfa enabled");
    Ok(Json(EnableMfaResponse {
        qr_code: provisioning.uri,
    }))
}

#[instrument(skip(caller))]
pub async fn get_me(caller: CurrentUser) -> Json<PublicUser> {
    Json(PublicUser::from(&caller.0))
}

#[instrument(skip(state))]
pub async fn mfa_statuses(State(state): State<AppState>) -> AppResult<Json<Vec<MfaStatus>>> {
    let users = state.store.list_users().await?;
    Ok(Json(
        users
            .into_iter()
            .map(|u| MfaStatus {
                mfa_enabled: u.mfa_enabled(),
                email: u.email,
            })
            .collect(),
    ))
}

#[instrument(skip(state))]
pub async fn audit_logs(State(state): State<AppState>) -> AppResult<Json<Vec<AuditLogEntry>>> {
    Ok(Json(state.store.list_audit_logs().await?))
}

#[instrument(skip(state))]
pub async fn failed_logins(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<FailedLoginEntry>>> {
    Ok(Json(state.store.list_failed_logins().await?))
}
