use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::auth::cookie::{clear_session_cookie, session_cookie};
use crate::auth::gateway::NewUser;
use crate::error::{AppError, AppResult};
use crate::extractors::{JsonBody, MaybeUser, RequestContext};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// POST /api/auth/register: create the account and sign it in
pub async fn register(
    State(state): State<AppState>,
    JsonBody(new_user): JsonBody<NewUser>,
) -> AppResult<Response> {
    let user = state.auth.register(new_user).await?;
    let token = state.auth.create_session(&user.id).await?;

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, session_cookie(&state.config.auth, &token))],
        Json(json!({ "user": user })),
    )
        .into_response())
}

/// POST /api/auth/login: verify credentials and issue a session cookie
pub async fn login(
    State(state): State<AppState>,
    ctx: RequestContext,
    JsonBody(req): JsonBody<LoginRequest>,
) -> AppResult<Response> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::BadRequest("Email and password are required".into()));
    }

    let user = match state.auth.authenticate(&req.email, &req.password).await {
        Ok(user) => user,
        Err(e) => {
            tracing::info!("Failed login attempt");
            return Err(e.into());
        }
    };

    // Replace whatever session this browser held before.
    if let Some(old) = ctx.session_token.as_deref() {
        state.auth.revoke_session(old).await?;
    }
    let token = state.auth.create_session(&user.id).await?;
    tracing::info!(user_id = %user.id, "User logged in");

    Ok((
        [(header::SET_COOKIE, session_cookie(&state.config.auth, &token))],
        Json(json!({ "user": user })),
    )
        .into_response())
}

/// POST /api/auth/logout: delete the session and clear the cookie
pub async fn logout(State(state): State<AppState>, ctx: RequestContext) -> AppResult<Response> {
    if let Some(token) = ctx.session_token.as_deref() {
        state.auth.revoke_session(token).await?;
    }

    Ok((
        [(header::SET_COOKIE, clear_session_cookie(&state.config.auth))],
        Json(json!({ "success": true })),
    )
        .into_response())
}

/// GET /api/auth/session: the signed-in user, or null
pub async fn session(MaybeUser(user): MaybeUser) -> Json<serde_json::Value> {
    Json(json!({ "user": user }))
}
