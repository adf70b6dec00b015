use std::sync::Arc;

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::{error, warn};

use crate::config::HashingConfig;
use crate::error::{AuthError, AuthResult};

/// Argon2id password hasher with fixed cost parameters.
///
/// Verification goes through `PasswordVerifier`, which recomputes the digest
/// with the parameters and salt stored in the PHC string and compares in
/// constant time.
#[derive(Clone)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
    // Verified against when a login names an unknown account.
    dummy_hash: Arc<str>,
}

impl CredentialHasher {
    pub fn new(cfg: HashingConfig) -> AuthResult<Self> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.parallelism, None)
            .map_err(|e| AuthError::Hashing(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let dummy_hash = hash_with(&argon2, "placeholder-password")?;
        Ok(Self {
            argon2,
            dummy_hash: dummy_hash.into(),
        })
    }

    pub fn hash(&self, plain: &str) -> AuthResult<String> {
        hash_with(&self.argon2, plain)
    }

    pub fn verify(&self, plain: &str, hash: &str) -> bool {
        let parsed = match PasswordHash::new(hash) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "stored password hash is malformed");
                return false;
            }
        };
        self.argon2
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok()
    }

    /// Burns one verification so that an unknown account costs as much as a
    /// wrong password.
    pub fn verify_dummy(&self, plain: &str) -> bool {
        let _ = self.verify(plain, &self.dummy_hash);
        false
    }

    pub async fn hash_blocking(&self, plain: String) -> AuthResult<String> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&plain))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?
    }

    /// `hash = None` runs the dummy verification.
    pub async fn verify_blocking(&self, plain: String, hash: Option<String>) -> bool {
        let hasher = self.clone();
        let res = tokio::task::spawn_blocking(move || match hash {
            Some(h) => hasher.verify(&plain, &h),
            None => hasher.verify_dummy(&plain),
        })
        .await;
        match res {
            Ok(ok) => ok,
            Err(e) => {
                error!(error = %e, "password verification task failed");
                false
            }
        }
    }
}

fn hash_with(argon2: &Argon2<'_>, plain: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            AuthError::Hashing(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

#[cfg(test)]
pub(crate) fn test_hasher() -> CredentialHasher {
    CredentialHasher::new(HashingConfig {
        memory_kib: 8,
        iterations: 1,
        parallelism: 1,
    })
    .expect("cheap argon2 params")
}
