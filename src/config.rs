use anyhow::{bail, Context};
use jsonwebtoken::Algorithm;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub algorithm: Algorithm,
    pub ttl_minutes: i64,
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct HashingConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        // OWASP baseline for argon2id
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// `None` runs the service on the in-memory repository.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub hashing: HashingConfig,
    pub request_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let algorithm = match std::env::var("JWT_ALGORITHM") {
            Ok(raw) => parse_algorithm(&raw)?,
            Err(_) => Algorithm::HS256,
        };
        let jwt = JwtConfig {
            secret,
            algorithm,
            ttl_minutes: env_or("JWT_TTL_MINUTES", 60)?,
        };

        let defaults = HashingConfig::default();
        let hashing = HashingConfig {
            memory_kib: env_or("ARGON2_MEMORY_KIB", defaults.memory_kib)?,
            iterations: env_or("ARGON2_ITERATIONS", defaults.iterations)?,
            parallelism: env_or("ARGON2_PARALLELISM", defaults.parallelism)?,
        };

        let config = Self {
            database_url,
            jwt,
            hashing,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 10)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.jwt.secret.is_empty() {
            bail!("JWT_SECRET must not be empty");
        }
        if self.jwt.ttl_minutes <= 0 {
            bail!("JWT_TTL_MINUTES must be positive");
        }
        if self.request_timeout_secs == 0 {
            bail!("REQUEST_TIMEOUT_SECS must be positive");
        }
        Ok(())
    }
}

/// Only HMAC algorithms are accepted; the service signs with a shared secret.
pub fn parse_algorithm(raw: &str) -> anyhow::Result<Algorithm> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => bail!("unsupported JWT_ALGORITHM '{other}', expected HS256, HS384 or HS512"),
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid {key} '{raw}': {e}")),
        Err(_) => Ok(default),
    }
}
