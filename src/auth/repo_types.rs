use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use super::claims::Role;

/// User record.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub role: Role,
    #[serde(skip_serializing)]
    pub mfa_secret: Option<String>, // base32 TOTP secret
    #[serde(skip_serializing)]
    pub mfa_last_step: Option<i64>, // last TOTP time step accepted
    pub profile_picture_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl User {
    pub fn mfa_enabled(&self) -> bool {
        self.mfa_secret.is_some()
    }
}

/// Row shape as stored; `role` is TEXT in the database.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub mfa_secret: Option<String>,
    pub mfa_last_step: Option<i64>,
    pub profile_picture_url: Option<String>,
    pub created_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            name: r.name,
            email: r.email,
            password_hash: r.password_hash,
            role: r.role.parse()?,
            mfa_secret: r.mfa_secret,
            mfa_last_step: r.mfa_last_step,
            profile_picture_url: r.profile_picture_url,
            created_at: r.created_at,
        })
    }
}

/// Fields needed to insert a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub profile_picture_url: Option<String>,
}

/// Profile fields a user (or an admin) may change. `None` keeps the value.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub profile_picture_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub user_email: String,
    pub activity: String,
    #[serde(rename = "timestamp", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FailedLoginEntry {
    pub id: Uuid,
    pub email: String,
    pub ip_address: String,
    #[serde(rename = "timestamp", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Activities written to the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Signup,
    Login,
    LoginMfaPending,
    MfaEnabled,
    OtpVerified,
    ProfileUpdated,
    UserDeleted,
}

impl Activity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Activity::Signup => "signup",
            Activity::Login => "login",
            Activity::LoginMfaPending => "login_mfa_pending",
            Activity::MfaEnabled => "mfa_enabled",
            Activity::OtpVerified => "otp_verified",
            Activity::ProfileUpdated => "profile_updated",
            Activity::UserDeleted => "user_deleted",
        }
    }
}
