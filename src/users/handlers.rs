use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{debug, instrument};

use crate::{
    auth::gate::{Authenticated, AuthorizedAccount},
    error::ApiResult,
    state::AppState,
    users::{
        dto::{CreateUserRequest, DeletedResponse, UpdateUserRequest},
        repo_types::Account,
        services,
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/user", post(create_user).get(list_users))
        .route(
            "/user/:id",
            get(get_user).patch(update_user).delete(delete_user),
        )
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<Account>)> {
    let account = services::create_account(state.repo.as_ref(), &state.hasher, payload).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

#[instrument(skip(state, claims))]
pub async fn list_users(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
) -> ApiResult<Json<Vec<Account>>> {
    debug!(username = %claims.username, "listing accounts");
    let accounts = state.repo.list().await?;
    Ok(Json(accounts))
}

#[instrument(skip_all)]
pub async fn get_user(AuthorizedAccount(account): AuthorizedAccount) -> Json<Account> {
    Json(account)
}

#[instrument(skip_all)]
pub async fn update_user(
    State(state): State<AppState>,
    AuthorizedAccount(account): AuthorizedAccount,
    Json(payload): Json<UpdateUserRequest>,
) -> ApiResult<Json<Account>> {
    let updated =
        services::update_account(state.repo.as_ref(), &state.hasher, &account, payload).await?;
    Ok(Json(updated))
}

#[instrument(skip_all)]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthorizedAccount(account): AuthorizedAccount,
) -> ApiResult<Json<DeletedResponse>> {
    let deleted = services::delete_account(state.repo.as_ref(), &account).await?;
    Ok(Json(DeletedResponse { deleted }))
}
