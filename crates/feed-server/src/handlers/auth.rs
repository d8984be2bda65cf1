//! Auth handlers

use axum::{extract::rejection::JsonRejection, extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::auth::SignupInput;
use crate::config::AppState;
use crate::ctx::Ctx;
use crate::error::{Error, FieldError, Result};
use crate::handlers::form::json_body;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

/// PUT /auth/signup
pub async fn signup(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SignupInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>)> {
    let input = json_body(payload)?;
    info!("PUT /auth/signup - {}", input.email);

    let user = state.accounts.signup(input).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User created",
            "userId": user.id,
        })),
    ))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<Value>> {
    let req = json_body(payload)?;
    info!("POST /auth/login - {}", req.email);

    let user = state.accounts.login(&req.email, &req.password).await?;
    let token = state
        .tokens
        .issue(&user.id, Some(&user.name), state.tokens.ttl())?;

    Ok(Json(json!({
        "token": token,
        "userId": user.id,
    })))
}

/// GET /auth/status
pub async fn get_status(State(state): State<AppState>, ctx: Ctx) -> Result<Json<Value>> {
    let status = state.accounts.status(ctx.user_id()).await?;

    Ok(Json(json!({ "status": status })))
}

/// PATCH /auth/status
pub async fn update_status(
    State(state): State<AppState>,
    ctx: Ctx,
    payload: std::result::Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Json<Value>> {
    let req = json_body(payload)?;
    let status = req.status.trim();
    if status.is_empty() {
        return Err(Error::validation(vec![FieldError::new(
            "status",
            "Status must not be empty.",
        )]));
    }

    state.accounts.update_status(ctx.user_id(), status).await?;

    Ok(Json(json!({ "message": "User updated." })))
}
