//! Worker configuration, loaded from the environment (and `.env` in
//! development).

use anyhow::{ensure, Context, Result};

/// Minimum length for the JWT and credential secrets. Short secrets are
/// a deployment mistake, not a preference.
const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct Config {
    pub nats_url: String,
    pub nats_user: Option<String>,
    pub nats_password: Option<String>,
    pub database_url: String,
    pub jwt_secret: String,
    /// Key phrase for the reversible password cipher.
    pub credential_key: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Missing .env is fine in production; variables come from the
        // process environment there.
        dotenvy::dotenv().ok();

        let nats_url =
            std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string());
        let nats_user = std::env::var("NATS_USER").ok();
        let nats_password = std::env::var("NATS_PASSWORD").ok();

        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let credential_key =
            std::env::var("CREDENTIAL_KEY").context("CREDENTIAL_KEY must be set")?;

        ensure!(
            jwt_secret.len() >= MIN_SECRET_LEN,
            "JWT_SECRET must be at least {MIN_SECRET_LEN} characters"
        );
        ensure!(
            credential_key.len() >= MIN_SECRET_LEN,
            "CREDENTIAL_KEY must be at least {MIN_SECRET_LEN} characters"
        );

        Ok(Self {
            nats_url,
            nats_user,
            nats_password,
            database_url,
            jwt_secret,
            credential_key,
        })
    }
}
