use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::FromRef;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::auth::gate::AuthGate;
use crate::auth::jwt::JwtKeys;
use crate::auth::password::CredentialHasher;
use crate::config::AppConfig;
use crate::users::memory::InMemoryUserRepository;
use crate::users::repo::{PgUserRepository, UserRepository};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repo: Arc<dyn UserRepository>,
    pub keys: Arc<JwtKeys>,
    pub hasher: CredentialHasher,
}

impl AppState {
    /// Loads configuration, builds the key material and the hasher, and
    /// connects the repository. Any failure here aborts startup.
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let repo: Arc<dyn UserRepository> = match &config.database_url {
            Some(url) => {
                let db = PgPoolOptions::new()
                    .max_connections(10)
                    .acquire_timeout(Duration::from_secs(config.request_timeout_secs))
                    .connect(url)
                    .await
                    .context("connect to database")?;
                sqlx::migrate!("./migrations")
                    .run(&db)
                    .await
                    .context("run migrations")?;
                info!("using postgres repository");
                Arc::new(PgUserRepository::new(db))
            }
            None => {
                warn!("DATABASE_URL not set; accounts are kept in memory");
                Arc::new(InMemoryUserRepository::new())
            }
        };

        Self::from_parts(config, repo)
    }

    pub fn from_parts(config: Arc<AppConfig>, repo: Arc<dyn UserRepository>) -> anyhow::Result<Self> {
        let keys = Arc::new(JwtKeys::new(&config.jwt).context("jwt signing configuration")?);
        let hasher = CredentialHasher::new(config.hashing).context("password hashing configuration")?;
        info!(
            alg = ?keys.algorithm(),
            ttl_minutes = config.jwt.ttl_minutes,
            argon2_memory_kib = config.hashing.memory_kib,
            "auth configured"
        );
        Ok(Self {
            config,
            repo,
            keys,
            hasher,
        })
    }
}

impl FromRef<AppState> for AuthGate {
    fn from_ref(state: &AppState) -> Self {
        AuthGate::new(state.keys.clone(), state.repo.clone())
    }
}
