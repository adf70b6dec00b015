use axum::{extract::State, routing::post, Json, Router};
use tracing::instrument;

use crate::{
    auth::{
        dto::{LoginRequest, LoginResponse},
        services,
    },
    error::ApiResult,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/login", post(login))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let issued = services::login(
        state.repo.as_ref(),
        &state.hasher,
        &state.keys,
        &payload.email,
        &payload.password,
    )
    .await?;

    Ok(Json(LoginResponse {
        token: issued.token,
        expires_at: issued.expires_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_response_serialization() {
        let response = LoginResponse {
            token: "a.b.c".to_string(),
            expires_at: time::OffsetDateTime::from_unix_timestamp(0).unwrap(),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"token\":\"a.b.c\""));
        assert!(json.contains("1970-01-01T00:00:00Z"));
    }
}
