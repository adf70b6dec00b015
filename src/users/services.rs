use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::auth::password::CredentialHasher;
use crate::auth::services::normalize_email;
use crate::error::{ApiError, ApiResult};
use crate::users::dto::{CreateUserRequest, UpdateUserRequest};
use crate::users::repo::UserRepository;
use crate::users::repo_types::{Account, AccountChanges, NewAccount};

pub const MAX_USERNAME_LEN: usize = 50;
pub const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn validate_username(username: &str) -> ApiResult<()> {
    if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN {
        return Err(ApiError::bad_request(format!(
            "username must be 1 to {MAX_USERNAME_LEN} characters"
        )));
    }
    if username.chars().any(char::is_whitespace) {
        return Err(ApiError::bad_request("username must not contain whitespace"));
    }
    Ok(())
}

fn validate_password(password: &str) -> ApiResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request("Password too short"));
    }
    Ok(())
}

fn validate_email(email: &str) -> ApiResult<()> {
    if !is_valid_email(email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::bad_request("Invalid email"));
    }
    Ok(())
}

pub async fn create_account(
    repo: &dyn UserRepository,
    hasher: &CredentialHasher,
    req: CreateUserRequest,
) -> ApiResult<Account> {
    let username = req.username.trim().to_owned();
    let email = normalize_email(&req.email);
    validate_username(&username)?;
    validate_email(&email)?;
    validate_password(&req.password)?;

    let password_hash = hasher.hash_blocking(req.password).await?;
    let account = repo
        .create(NewAccount {
            username,
            email,
            password_hash,
        })
        .await?;

    info!(account_id = account.id, username = %account.username, "account created");
    Ok(account)
}

pub async fn update_account(
    repo: &dyn UserRepository,
    hasher: &CredentialHasher,
    account: &Account,
    req: UpdateUserRequest,
) -> ApiResult<Account> {
    let mut changes = AccountChanges::default();
    if let Some(email) = req.email {
        let email = normalize_email(&email);
        validate_email(&email)?;
        changes.email = Some(email);
    }
    if let Some(password) = req.password {
        validate_password(&password)?;
        changes.password_hash = Some(hasher.hash_blocking(password).await?);
    }
    if changes.is_empty() {
        return Err(ApiError::bad_request("nothing to update"));
    }

    let updated = repo
        .update(account.id, changes)
        .await?
        .ok_or(ApiError::NotFound)?;
    info!(account_id = updated.id, "account updated");
    Ok(updated)
}

pub async fn delete_account(repo: &dyn UserRepository, account: &Account) -> ApiResult<i64> {
    if !repo.delete(account.id).await? {
        return Err(ApiError::NotFound);
    }
    info!(account_id = account.id, username = %account.username, "account deleted");
    Ok(account.id)
}
