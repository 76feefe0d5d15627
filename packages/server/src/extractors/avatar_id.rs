use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;

use crate::error::AppError;

/// The `{id}` path segment of an avatar route.
///
/// Must be a 32-character hex string (the MD5-shaped ids clients already
/// use). Stored lowercase, so `ABC...` and `abc...` name the same avatar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarId(pub String);

impl AvatarId {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        if raw.len() == 32 && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(raw.to_ascii_lowercase()))
        } else {
            Err(AppError::Validation("\"Id\" must be MD5 hash string".into()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for AvatarId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;
        Self::parse(&raw)
    }
}
