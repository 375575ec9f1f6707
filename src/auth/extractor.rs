// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated users.
//!
//! Use the `Auth` extractor in handlers to require authentication:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is AuthenticatedUser
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::{AuthError, AuthenticatedUser};
use crate::state::AppState;

/// Extractor for authenticated users.
///
/// Validates the bearer access token from the Authorization header.
pub struct Auth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let user = state.tokens.verify(token)?;
        Ok(Auth(user))
    }
}

/// Extractor that only admits callers who are admins right now.
///
/// The role is read from the account record, not the token, so a demotion
/// takes effect before the caller's access token expires.
pub struct AdminOnly(pub AuthenticatedUser);

impl FromRequestParts<AppState> for AdminOnly {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Auth(mut user) = Auth::from_request_parts(parts, state).await?;
        user.role = state
            .store
            .read()
            .await
            .user(user.user_id)
            .map_err(|_| AuthError::UnknownAccount)?
            .role;
        if !user.is_admin() {
            tracing::debug!(user_id = user.user_id, role = %user.role, "Admin route refused");
            return Err(AuthError::InsufficientPermissions);
        }
        Ok(AdminOnly(user))
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::InvalidAuthHeader)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use axum::http::Request;

    use super::*;
    use crate::auth::Role;
    use crate::models::User;

    fn parts_with_auth(value: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/users/profile");
        if let Some(value) = value {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn token_for(state: &AppState, role: Role) -> String {
        let user = User {
            id: 3,
            name: "Grace".into(),
            email: "grace@uni.edu".into(),
            role,
            permissions: BTreeSet::new(),
            avatar: None,
        };
        state.tokens.issue_access_token(&user).unwrap()
    }

    /// Create an account and return a bearer header for it.
    async fn account_header(state: &AppState, role: Role) -> (i64, String) {
        let user = state
            .store
            .write()
            .await
            .create_user("Grace", "grace@uni.edu", "hash", role)
            .unwrap();
        let token = state.tokens.issue_access_token(&user).unwrap();
        (user.id, format!("Bearer {token}"))
    }

    #[tokio::test]
    async fn missing_header_is_rejected() {
        let state = AppState::default();
        let mut parts = parts_with_auth(None);
        let err = Auth::from_request_parts(&mut parts, &state).await.err().unwrap();
        assert!(matches!(err, AuthError::MissingAuthHeader));
    }

    #[tokio::test]
    async fn non_bearer_scheme_is_rejected() {
        let state = AppState::default();
        let mut parts = parts_with_auth(Some("Basic abc"));
        let err = Auth::from_request_parts(&mut parts, &state).await.err().unwrap();
        assert!(matches!(err, AuthError::InvalidAuthHeader));
    }

    #[tokio::test]
    async fn valid_token_yields_user() {
        let state = AppState::default();
        let header = format!("Bearer {}", token_for(&state, Role::User));
        let mut parts = parts_with_auth(Some(&header));
        let Auth(user) = Auth::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(user.user_id, 3);
    }

    #[tokio::test]
    async fn admin_only_refuses_teachers() {
        let state = AppState::default();
        let (_, header) = account_header(&state, Role::Teacher).await;
        let mut parts = parts_with_auth(Some(&header));
        let err = AdminOnly::from_request_parts(&mut parts, &state).await.err().unwrap();
        assert!(matches!(err, AuthError::InsufficientPermissions));
    }

    #[tokio::test]
    async fn admin_only_admits_admins() {
        let state = AppState::default();
        let (_, header) = account_header(&state, Role::Admin).await;
        let mut parts = parts_with_auth(Some(&header));
        let AdminOnly(admin) = AdminOnly::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(admin.role, Role::Admin);
    }

    #[tokio::test]
    async fn demoted_admin_is_refused_with_a_live_token() {
        let state = AppState::default();
        let (user_id, header) = account_header(&state, Role::Admin).await;
        state.store.write().await.set_role(user_id, Role::User).unwrap();

        let mut parts = parts_with_auth(Some(&header));
        let err = AdminOnly::from_request_parts(&mut parts, &state).await.err().unwrap();
        assert!(matches!(err, AuthError::InsufficientPermissions));
    }

    #[tokio::test]
    async fn admin_token_for_deleted_account_is_refused() {
        let state = AppState::default();
        let header = format!("Bearer {}", token_for(&state, Role::Admin));
        let mut parts = parts_with_auth(Some(&header));
        let err = AdminOnly::from_request_parts(&mut parts, &state).await.err().unwrap();
        assert!(matches!(err, AuthError::UnknownAccount));
    }
}
