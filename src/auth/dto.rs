use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::{
    auth::{claims::Role, password::MIN_PASSWORD_LEN, repo_types::User},
    error::{AppResult, Validator},
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s:]+@[^@\s:]+\.[^@\s:]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn is_valid_url(url: &str) -> bool {
    lazy_static! {
        static ref URL_RE: Regex = Regex::new(r"^https?://[^\s/$.?#][^\s]*$").unwrap();
    }
    URL_RE.is_match(url)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Request body for sign-up.
#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub role: String,
    pub profile_picture_url: Option<String>,
}

impl SignUpRequest {
    /// Normalizes the email and checks every field, returning the parsed role.
    pub fn validate(&mut self) -> AppResult<Role> {
        self.email = normalize_email(&self.email);
        self.name = self.name.trim().to_string();
        let role = self.role.parse::<Role>().ok();

        let mut v = Validator::new();
        v.check(!self.name.is_empty(), "name", "name should not be empty")
            .check(
                is_valid_email(&self.email),
                "email",
                "Please enter a valid email address",
            )
            .check(
                self.password.chars().count() >= MIN_PASSWORD_LEN,
                "password",
                "Password must be at least 6 characters long",
            )
            .check(
                role.is_some(),
                "role",
                "Role must be one of the following values: student, instructor, admin",
            );
        if let Some(url) = &self.profile_picture_url {
            v.check(
                is_valid_url(url),
                "profile_picture_url",
                "Please enter a valid URL for the profile picture",
            );
        }
        v.finish()?;

        // validated above
        Ok(role.unwrap_or(Role::Student))
    }
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&mut self) -> AppResult<()> {
        self.email = normalize_email(&self.email);
        let mut v = Validator::new();
        v.check(
            is_valid_email(&self.email),
            "email",
            "Please enter a valid email address",
        )
        .check(!self.password.is_empty(), "password", "password should not be empty");
        v.finish()
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default, deserialize_with = "otp_code")]
    pub otp: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OtpInput {
    Text(String),
    Number(u64),
}

/// Authenticator codes arrive either as `"012345"` or as `12345`; numbers
/// are zero-padded back to six digits.
fn otp_code<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match OtpInput::deserialize(deserializer)? {
        OtpInput::Text(code) => code.trim().to_string(),
        OtpInput::Number(code) => format!("{code:06}"),
    })
}

#[derive(Debug, Deserialize)]
pub struct EnableMfaRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub role: Role,
}

/// Login outcome. With a second factor configured no token is issued until
/// `verify-otp` succeeds.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LoginResponse {
    Session(SessionResponse),
    MfaRequired {
        #[serde(rename = "mfaEnabled")]
        mfa_enabled: bool,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnableMfaResponse {
    pub qr_code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MfaStatus {
    pub email: String,
    pub mfa_enabled: bool,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub profile_picture_url: Option<String>,
    #[serde(rename = "mfaEnabled")]
    pub mfa_enabled: bool,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
            role: u.role,
            profile_picture_url: u.profile_picture_url.clone(),
            mfa_enabled: u.mfa_enabled(),
        }
    }
}
