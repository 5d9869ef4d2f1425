use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};

use crate::{
    credentials::CredentialState,
    error::AppError,
    models::User,
    repository::UserStore,
};

/// AuthUser
///
/// The subject of a verified bearer token. Extraction is pure: it checks signature
/// and expiry but does not touch storage, so the handler can resolve the account
/// inside its own unit of work via [`AuthUser::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    /// The user id carried in the token's `sub` claim.
    pub id: i64,
}

impl AuthUser {
    /// load
    ///
    /// Resolves the token subject to its current account record. A token whose user has
    /// since been deleted is treated exactly like an invalid token (401).
    pub async fn load<S>(&self, store: &mut S) -> Result<User, AppError>
    where
        S: UserStore + ?Sized,
    {
        store
            .get_user_by_id(self.id)
            .await?
            .ok_or_else(|| {
                tracing::debug!(user_id = self.id, "token subject no longer exists");
                AppError::Unauthenticated
            })
    }
}

/// AuthUser Extractor Implementation
///
/// 1. Pulls the credential service from the application state.
/// 2. Requires an `Authorization: Bearer <token>` header.
/// 3. Verifies the token.
///
/// Rejection: `AppError::Unauthenticated`, rendered as 401 with `WWW-Authenticate: Bearer`.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    CredentialState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let credentials = CredentialState::from_ref(state);

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or(AppError::Unauthenticated)?;

        let id = credentials
            .verify_token(token)
            .ok_or(AppError::Unauthenticated)?;

        Ok(AuthUser { id })
    }
}

// The scheme name is case-insensitive (RFC 7235).
fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}
