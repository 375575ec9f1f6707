// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Profile endpoints for the authenticated user.

use axum::{extract::State, routing::get, Json, Router};

use crate::{
    auth::{Auth, AuthError},
    error::ApiError,
    models::{ProfileUpdate, User},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/profile", get(get_profile).put(update_profile))
}

/// Get the current user's profile.
///
/// The record is read from the store, so role or permission changes made
/// since the access token was issued are reflected.
pub async fn get_profile(
    Auth(caller): Auth,
    State(state): State<AppState>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .store
        .read()
        .await
        .user(caller.user_id)
        .map_err(|_| AuthError::UnknownAccount)?;
    Ok(Json(user))
}

pub async fn update_profile(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .store
        .write()
        .await
        .update_profile(caller.user_id, update)?;
    tracing::info!(user_id = user.id, "Profile updated");
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;
    use crate::auth::{AuthenticatedUser, Role};

    async fn state_with_user() -> (AppState, AuthenticatedUser) {
        let state = AppState::default();
        let user = state
            .store
            .write()
            .await
            .create_user("Ada", "ada@uni.edu", "hash", Role::User)
            .unwrap();
        let caller = AuthenticatedUser {
            user_id: user.id,
            email: user.email,
            role: user.role,
            expires_at: 0,
        };
        (state, caller)
    }

    #[tokio::test]
    async fn profile_reflects_store() {
        let (state, caller) = state_with_user().await;
        let Json(user) = get_profile(Auth(caller), State(state)).await.unwrap();
        assert_eq!(user.name, "Ada");
        assert_eq!(user.permissions, Role::User.default_permissions());
    }

    #[tokio::test]
    async fn update_changes_name_and_avatar() {
        let (state, caller) = state_with_user().await;
        let Json(user) = update_profile(
            Auth(caller),
            State(state),
            Json(ProfileUpdate {
                name: Some("Ada Lovelace".into()),
                avatar: Some("https://cdn.example/ada.png".into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(user.name, "Ada Lovelace");
        assert_eq!(user.avatar.as_deref(), Some("https://cdn.example/ada.png"));
    }

    #[tokio::test]
    async fn deleted_account_profile_is_unauthorized() {
        let (state, caller) = state_with_user().await;
        state.store.write().await.delete_user(caller.user_id).unwrap();
        let err = get_profile(Auth(caller), State(state)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }
}
