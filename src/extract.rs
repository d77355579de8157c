use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{AppError, FieldErrors};

/// JSON body extractor whose rejections use the same 400 body as every
/// other validation failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(AppJson(value))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let (field, message) = match &rejection {
            JsonRejection::JsonDataError(e) => field_and_message(&e.body_text()),
            other => ("body".to_string(), other.body_text()),
        };
        warn!(%field, %message, "rejected request body");

        let mut errors = FieldErrors::new();
        errors.entry(field).or_default().push(message);
        AppError::Validation(errors)
    }
}

/// Splits `"<prefix>: <path>: <message>"` as produced for typed
/// deserialization failures. Anything without a usable path lands on `body`.
fn field_and_message(text: &str) -> (String, String) {
    let detail = text.split_once(": ").map_or(text, |(_, rest)| rest);
    match detail.split_once(": ") {
        Some((path, message)) if !path.is_empty() && path != "." && !path.contains(' ') => {
            (path.to_string(), message.to_string())
        }
        _ => ("body".to_string(), detail.to_string()),
    }
}
