// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication endpoints: registration, login, logout, token refresh and
//! password reset.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::Utc;

use crate::{
    auth::{
        password::{
            hash_password, normalize_email, validate_password, verify_against_dummy, verify_password,
        },
        tokens::new_opaque_token,
        Auth, AuthError, Role,
    },
    error::ApiError,
    models::{
        AuthPayload, Credentials, ForgotPasswordRequest, MessageResponse, RefreshRequest,
        RefreshResponse, RegisterRequest, ResetPasswordRequest, User,
    },
    state::AppState,
};

const FORGOT_PASSWORD_MESSAGE: &str =
    "If an account exists for that email, password reset instructions have been sent";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/refresh", post(refresh))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
}

/// Issue an access token and a stored refresh token for `user`.
async fn issue_session(state: &AppState, user: User) -> Result<AuthPayload, ApiError> {
    let access = state.tokens.issue_access_token(&user)?;
    let refresh = new_opaque_token();
    let expires_at = Utc::now() + state.config.refresh_token_ttl;

    state
        .store
        .write()
        .await
        .insert_refresh_token(user.id, &refresh, expires_at);

    Ok(AuthPayload {
        user: Some(user),
        token: Some(access),
        access_token: None,
        refresh_token: Some(refresh),
    })
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthPayload>), ApiError> {
    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::bad_request("Name is required"));
    }
    let email = normalize_email(&request.email).map_err(ApiError::bad_request)?;
    validate_password(&request.password).map_err(ApiError::bad_request)?;

    let password_hash = hash_password(&request.password)?;
    let user = state
        .store
        .write()
        .await
        .create_user(name, email, password_hash, Role::User)?;

    tracing::info!(user_id = user.id, "Account registered");
    let payload = issue_session(&state, user).await?;
    Ok((StatusCode::CREATED, Json(payload)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<AuthPayload>, ApiError> {
    let email = normalize_email(&credentials.email).map_err(|_| AuthError::InvalidCredentials)?;

    let stored = state.store.read().await.find_by_email(&email).cloned();
    let Some(stored) = stored else {
        verify_against_dummy(&credentials.password);
        tracing::info!("Login rejected: unknown account");
        return Err(AuthError::InvalidCredentials.into());
    };

    if !verify_password(&credentials.password, &stored.password_hash) {
        tracing::info!(user_id = stored.user.id, "Login rejected: wrong password");
        return Err(AuthError::InvalidCredentials.into());
    }

    tracing::info!(user_id = stored.user.id, "Login succeeded");
    Ok(Json(issue_session(&state, stored.user).await?))
}

pub async fn logout(
    Auth(caller): Auth,
    State(state): State<AppState>,
) -> Json<MessageResponse> {
    let revoked = state
        .store
        .write()
        .await
        .revoke_refresh_tokens(caller.user_id);
    tracing::info!(user_id = caller.user_id, revoked, "Logged out");
    Json(MessageResponse::new("Logged out"))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let user = {
        let mut store = state.store.write().await;
        let user_id = store
            .refresh_token_owner(&request.refresh_token, Utc::now())
            .ok_or(AuthError::InvalidRefreshToken)?;
        store.user(user_id).map_err(|_| AuthError::UnknownAccount)?
    };

    let token = state.tokens.issue_access_token(&user)?;
    tracing::debug!(user_id = user.id, "Access token refreshed");
    Ok(Json(RefreshResponse {
        token: Some(token),
        ..RefreshResponse::default()
    }))
}

/// Start a password reset. The response never reveals whether the email exists.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = normalize_email(&request.email).map_err(ApiError::bad_request)?;
    let mut response = MessageResponse::new(FORGOT_PASSWORD_MESSAGE);

    let mut store = state.store.write().await;
    let Some(user_id) = store.find_by_email(&email).map(|stored| stored.user.id) else {
        return Ok(Json(response));
    };

    let token = new_opaque_token();
    store.insert_reset_token(user_id, &token, Utc::now() + state.config.reset_token_ttl);
    tracing::debug!(user_id, reset_token = %token, "Password reset token issued");

    if state.config.expose_reset_tokens {
        response.reset_token = Some(token);
    }
    Ok(Json(response))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    validate_password(&request.password).map_err(ApiError::bad_request)?;
    let password_hash = hash_password(&request.password)?;

    let mut store = state.store.write().await;
    let user_id = store
        .take_reset_token(&request.token, Utc::now())
        .ok_or_else(|| ApiError::bad_request("Invalid or expired reset token"))?;
    store.set_password_hash(user_id, password_hash)?;
    let revoked = store.revoke_refresh_tokens(user_id);

    tracing::info!(user_id, revoked, "Password reset");
    Ok(Json(MessageResponse::new("Password has been reset")))
}
