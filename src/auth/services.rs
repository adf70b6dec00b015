use tracing::{info, warn};

use crate::auth::jwt::{IssuedToken, JwtKeys};
use crate::auth::password::CredentialHasher;
use crate::error::{ApiError, ApiResult};
use crate::users::repo::UserRepository;

/// Exchanges email + password for a signed token.
///
/// An unknown email and a wrong password return the same
/// [`ApiError::InvalidCredentials`], and both pay for one Argon2 verification.
pub async fn login(
    repo: &dyn UserRepository,
    hasher: &CredentialHasher,
    keys: &JwtKeys,
    email: &str,
    password: &str,
) -> ApiResult<IssuedToken> {
    let email = normalize_email(email);

    let account = repo.find_by_email(&email).await.map_err(ApiError::from)?;

    let stored_hash = account.as_ref().map(|a| a.password_hash.clone());
    let ok = hasher
        .verify_blocking(password.to_owned(), stored_hash)
        .await;

    let account = match account {
        Some(a) if ok => a,
        Some(a) => {
            warn!(account_id = a.id, "login with wrong password");
            return Err(ApiError::InvalidCredentials);
        }
        None => {
            warn!("login for unknown email");
            return Err(ApiError::InvalidCredentials);
        }
    };

    let issued = keys.issue(&account.username, &account.email)?;
    info!(account_id = account.id, username = %account.username, "user logged in");
    Ok(issued)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
