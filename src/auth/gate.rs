use std::future::Future;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Path},
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::{debug, warn};

use crate::auth::claims::Claims;
use crate::auth::jwt::JwtKeys;
use crate::error::{ApiError, ApiResult};
use crate::users::repo::UserRepository;
use crate::users::repo_types::Account;

/// Decides whether a request may touch a specific account.
///
/// Authentication (is the token ours and current) and authorization (does
/// the token's username own the addressed account) are separate steps; a
/// valid token for one account never opens another.
#[derive(Clone)]
pub struct AuthGate {
    keys: Arc<JwtKeys>,
    repo: Arc<dyn UserRepository>,
}

impl AuthGate {
    pub fn new(keys: Arc<JwtKeys>, repo: Arc<dyn UserRepository>) -> Self {
        Self { keys, repo }
    }

    /// Header presence and token verification only.
    pub fn authenticate(&self, credential: Option<&str>) -> ApiResult<Claims> {
        let Some(raw) = credential else {
            debug!("missing authorization header");
            return Err(ApiError::Unauthenticated);
        };
        self.keys.verify(bearer_token(raw)).map_err(|e| {
            warn!(reason = %e, "token rejected");
            ApiError::from(e)
        })
    }

    pub async fn authorize(&self, credential: Option<&str>, raw_id: &str) -> ApiResult<Account> {
        let claims = self.authenticate(credential)?;
        self.authorize_claims(&claims, raw_id).await
    }

    /// Binds already verified claims to the account addressed by `raw_id`.
    pub async fn authorize_claims(&self, claims: &Claims, raw_id: &str) -> ApiResult<Account> {
        let id = parse_account_id(raw_id)?;

        let account = self
            .repo
            .find_by_id(id)
            .await
            .map_err(ApiError::from)?
            .ok_or_else(|| {
                warn!(account_id = id, "token presented for unknown account");
                ApiError::Unauthenticated
            })?;

        if claims.username != account.username {
            warn!(
                account_id = id,
                claimed = %claims.username,
                "token does not own addressed account"
            );
            return Err(ApiError::Forbidden);
        }

        debug!(account_id = id, "request authorized");
        Ok(account)
    }

    /// Runs `op` with the authorized account. Errors from `op` pass through
    /// untouched.
    pub async fn guard<T, F, Fut>(
        &self,
        credential: Option<&str>,
        raw_id: &str,
        op: F,
    ) -> ApiResult<T>
    where
        F: FnOnce(Account) -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let account = self.authorize(credential, raw_id).await?;
        op(account).await
    }
}

/// Accepts both `<token>` and `Bearer <token>`.
pub fn bearer_token(header: &str) -> &str {
    let header = header.trim();
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim_start)
        .unwrap_or(header)
}

pub fn parse_account_id(raw: &str) -> ApiResult<i64> {
    raw.parse::<i64>()
        .map_err(|_| ApiError::bad_request(format!("invalid id {raw}")))
}

fn credential_header(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Claims of a verified token, with no resource binding.
pub struct Authenticated(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
    AuthGate: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let gate = AuthGate::from_ref(state);
        gate.authenticate(credential_header(parts)).map(Authenticated)
    }
}

/// The account addressed by the `:id` path segment, owned by the caller.
pub struct AuthorizedAccount(pub Account);

#[async_trait]
impl<S> FromRequestParts<S> for AuthorizedAccount
where
    S: Send + Sync,
    AuthGate: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let gate = AuthGate::from_ref(state);

        // Authentication comes before any look at the path.
        let claims = gate.authenticate(credential_header(parts))?;

        let Path(raw_id) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::bad_request("missing account id"))?;

        gate.authorize_claims(&claims, &raw_id)
            .await
            .map(AuthorizedAccount)
    }
}
