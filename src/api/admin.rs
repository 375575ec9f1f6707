// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Admin endpoints: user management and platform statistics.
//!
//! Every handler requires the `AdminOnly` extractor.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, put},
    Json, Router,
};

use crate::{
    auth::{AdminOnly, Role},
    error::ApiError,
    models::{AdminStats, RoleUpdate, User},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{user_id}", delete(delete_user))
        .route("/users/{user_id}/role", put(update_user_role))
        .route("/stats", get(stats))
}

pub async fn list_users(AdminOnly(_admin): AdminOnly, State(state): State<AppState>) -> Json<Vec<User>> {
    Json(state.store.read().await.list_users())
}

pub async fn update_user_role(
    AdminOnly(admin): AdminOnly,
    Path(user_id): Path<i64>,
    State(state): State<AppState>,
    Json(request): Json<RoleUpdate>,
) -> Result<Json<User>, ApiError> {
    if user_id == admin.user_id && request.role != Role::Admin {
        return Err(ApiError::unprocessable("Admins cannot demote themselves"));
    }

    let user = state.store.write().await.set_role(user_id, request.role)?;
    tracing::info!(
        admin_id = admin.user_id,
        user_id,
        role = %user.role,
        "User role changed"
    );
    Ok(Json(user))
}

pub async fn delete_user(
    AdminOnly(admin): AdminOnly,
    Path(user_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    if user_id == admin.user_id {
        return Err(ApiError::unprocessable("Admins cannot delete their own account"));
    }

    state.store.write().await.delete_user(user_id)?;
    tracing::info!(admin_id = admin.user_id, user_id, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn stats(AdminOnly(_admin): AdminOnly, State(state): State<AppState>) -> Json<AdminStats> {
    Json(state.store.read().await.stats())
}
