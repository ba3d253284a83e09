use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::models::internal::UserProfile;
use crate::storage::repository::RepositoryError;

/// Resolves a bearer credential to a stable user. How the credential was
/// minted is not this crate's concern.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Option<UserProfile>, RepositoryError>;
}

/// Tokens are only ever stored and compared as SHA-256 hex digests.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authorization header")]
    MissingCredential,
    #[error("Invalid authorization format")]
    InvalidFormat,
    #[error("Invalid or expired credential")]
    UnknownCredential,
    #[error("Identity service unavailable")]
    Unavailable,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::UNAUTHORIZED,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// The caller, as verified from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserProfile);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<dyn IdentityVerifier>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AuthError::MissingCredential)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::InvalidFormat)?;

        let verifier = <Arc<dyn IdentityVerifier> as FromRef<S>>::from_ref(state);

        match verifier.verify(token).await {
            Ok(Some(user)) => Ok(AuthUser(user)),
            Ok(None) => Err(AuthError::UnknownCredential),
            Err(e) => {
                tracing::error!("Identity lookup failed: {}", e);
                Err(AuthError::Unavailable)
            }
        }
    }
}
