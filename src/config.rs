use std::env;

use jsonwebtoken::Algorithm;
use thiserror::Error;

/// AppConfig
///
/// Holds the application's entire configuration state. Built once at startup and
/// handed to the credential service and storage constructors; it is also pulled into
/// handlers through `FromRef` as part of the shared `AppState`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls log format and whether a database is mandatory.
    pub env: Env,
    // Postgres connection string. `None` selects the in-memory store (local only).
    pub db_url: Option<String>,
    // Process-wide HMAC secret used to sign and verify access tokens.
    pub jwt_secret: String,
    // Signing algorithm for access tokens (HMAC family only).
    pub jwt_algorithm: Algorithm,
    // Lifetime of an issued access token.
    pub access_token_expire_minutes: i64,
    // Socket address the HTTP server binds to.
    pub bind_addr: String,
}

/// Env
///
/// Defines the runtime context: human-readable logs and an optional database locally,
/// JSON logs and a mandatory database in production.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

pub const DEFAULT_TOKEN_MINUTES: i64 = 30;
/// Upper bound on token lifetime: one year.
pub const MAX_TOKEN_MINUTES: i64 = 365 * 24 * 60;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

impl Default for AppConfig {
    /// Safe, non-panicking instance used for test state setup.
    fn default() -> Self {
        Self {
            env: Env::Local,
            db_url: None,
            jwt_secret: "super-secure-test-secret-value-local".to_string(),
            jwt_algorithm: Algorithm::HS256,
            access_token_expire_minutes: DEFAULT_TOKEN_MINUTES,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from the environment and implements the **fail-fast**
    /// principle: the server never starts without a signing secret.
    ///
    /// # Panics
    /// Panics if `SECRET_KEY` is unset or empty, if `DATABASE_URL` is unset in
    /// production, or if any optional variable holds an unparsable value.
    pub fn load() -> Self {
        Self::from_env().unwrap_or_else(|e| panic!("FATAL: {e}"))
    }

    /// Fallible variant of [`AppConfig::load`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let jwt_secret = env::var("SECRET_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("SECRET_KEY"))?;

        let jwt_algorithm = match env::var("ALGORITHM") {
            Ok(raw) => parse_algorithm(&raw)?,
            Err(_) => Algorithm::HS256,
        };

        let access_token_expire_minutes = match env::var("ACCESS_TOKEN_EXPIRE_MINUTES") {
            Ok(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|m| (1..=MAX_TOKEN_MINUTES).contains(m))
                .ok_or(ConfigError::Invalid {
                    name: "ACCESS_TOKEN_EXPIRE_MINUTES",
                    value: raw,
                })?,
            Err(_) => DEFAULT_TOKEN_MINUTES,
        };

        let db_url = env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());
        if env == Env::Production && db_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());

        Ok(Self {
            env,
            db_url,
            jwt_secret,
            jwt_algorithm,
            access_token_expire_minutes,
            bind_addr,
        })
    }
}

// Tokens are signed with a shared secret, so only the HMAC family makes sense here.
fn parse_algorithm(raw: &str) -> Result<Algorithm, ConfigError> {
    match raw {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => Err(ConfigError::Invalid {
            name: "ALGORITHM",
            value: other.to_string(),
        }),
    }
}
