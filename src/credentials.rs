use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

use crate::{
    config::{AppConfig, MAX_TOKEN_MINUTES},
    error::AppError,
};

/// Claims
///
/// Payload signed into every access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user id, string-encoded.
    pub sub: String,
    /// Expiration Time (exp): seconds since the epoch. The token is valid strictly before it.
    pub exp: i64,
    /// Issued At (iat): seconds since the epoch.
    pub iat: i64,
}

/// CredentialService
///
/// Password hashing and bearer-token issuance/verification. Built once from the
/// startup configuration and shared read-only, so it can be called concurrently
/// without coordination.
pub struct CredentialService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    token_ttl: Duration,
    // Hashed on first use; verified against when a login names no known account.
    decoy_hash: OnceLock<String>,
}

/// The concrete type used to share the credential service across the application state.
pub type CredentialState = Arc<CredentialService>;

impl CredentialService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_secret(
            config.jwt_secret.as_bytes(),
            config.jwt_algorithm,
            Duration::minutes(config.access_token_expire_minutes.clamp(1, MAX_TOKEN_MINUTES)),
        )
    }

    pub fn with_secret(secret: &[u8], algorithm: Algorithm, token_ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            algorithm,
            token_ttl,
            decoy_hash: OnceLock::new(),
        }
    }

    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    /// hash_password
    ///
    /// Argon2id with a fresh random salt, encoded in PHC string format.
    pub fn hash_password(&self, password: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
    }

    /// verify_password
    ///
    /// Returns false for a wrong password and for a hash that does not parse.
    pub fn verify_password(&self, password: &str, hashed: &str) -> bool {
        match PasswordHash::new(hashed) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    /// reject_unknown_account
    ///
    /// Always false. Spends one full verification so a login for an unregistered
    /// email takes as long as one with a wrong password.
    pub fn reject_unknown_account(&self, password: &str) -> bool {
        let decoy = self
            .decoy_hash
            .get_or_init(|| self.hash_password("unknown-account").unwrap_or_default());
        self.verify_password(password, decoy);
        false
    }

    /// issue_token
    ///
    /// Signs `{sub, iat, exp = issued_at + ttl}` with the process secret.
    pub fn issue_token(&self, subject_id: i64, issued_at: DateTime<Utc>) -> Result<String, AppError> {
        let expires_at = issued_at
            .checked_add_signed(self.token_ttl)
            .ok_or_else(|| AppError::Internal("token expiry out of range".to_string()))?;
        let claims = Claims {
            sub: subject_id.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))
    }

    /// verify_token
    ///
    /// Verifies against the current wall clock. See [`CredentialService::verify_token_at`].
    pub fn verify_token(&self, token: &str) -> Option<i64> {
        self.verify_token_at(token, Utc::now())
    }

    /// verify_token_at
    ///
    /// Checks signature, algorithm and structure, then expiry against `now`.
    /// Any failure yields `None`; callers cannot tell an expired token from a forged one.
    pub fn verify_token_at(&self, token: &str, now: DateTime<Utc>) -> Option<i64> {
        let mut validation = Validation::new(self.algorithm);
        // Expiry is checked below against the supplied clock, with no leeway.
        validation.validate_exp = false;
        validation.required_spec_claims = ["exp", "sub"].iter().map(|c| c.to_string()).collect();

        let claims = match decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                tracing::debug!("token rejected: {:?}", e.kind());
                return None;
            }
        };

        if now.timestamp() >= claims.exp {
            tracing::debug!("token rejected: expired");
            return None;
        }

        claims.sub.parse::<i64>().ok()
    }
}
