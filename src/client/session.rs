// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Auth Session Store
//!
//! The session is an immutable record replaced on every [`SessionAction`]
//! by the pure [`reduce`] function. `role` and `permissions` are only ever
//! copied from the user payload.
//!
//! ## Lifecycle
//!
//! ```text
//! Loading ──restore──▶ Authenticated ◀──login──▶ Unauthenticated
//!    └────restore (no valid session)───────────▶
//! ```
//!
//! ## Persistence
//!
//! After each state change the store mirrors the session into the
//! [`TokenStore`]: an authenticated session is saved, a settled
//! unauthenticated one is cleared, and a loading session is left alone.
//! Writes are skipped when the same state was already persisted.

use std::collections::BTreeSet;
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::watch;

use super::token_store::TokenStore;
use crate::auth::Role;
use crate::models::{TokenPair, User};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user: Option<User>,
    pub token: Option<String>,
    pub refresh_token: Option<String>,
    pub is_authenticated: bool,
    pub loading: bool,
    pub error: Option<String>,
    pub role: Option<Role>,
    pub permissions: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Loading,
    Authenticated,
    Unauthenticated,
}

impl Session {
    /// State at startup, before the persisted session has been checked.
    pub fn initial() -> Self {
        Self {
            loading: true,
            ..Self::signed_out()
        }
    }

    /// Settled state with no session.
    pub fn signed_out() -> Self {
        Self {
            user: None,
            token: None,
            refresh_token: None,
            is_authenticated: false,
            loading: false,
            error: None,
            role: None,
            permissions: BTreeSet::new(),
        }
    }

    pub fn status(&self) -> SessionStatus {
        if self.loading {
            SessionStatus::Loading
        } else if self.is_authenticated {
            SessionStatus::Authenticated
        } else {
            SessionStatus::Unauthenticated
        }
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == Some(role)
    }

    /// Replace the user and everything derived from it.
    fn with_user(mut self, user: User) -> Self {
        self.role = Some(user.role);
        self.permissions = user.permissions.clone();
        self.user = Some(user);
        self.is_authenticated = self.token.is_some();
        self
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::initial()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    LoginStart,
    LoginSuccess {
        user: User,
        token: String,
        refresh_token: Option<String>,
    },
    LoginFailure {
        error: String,
    },
    Logout,
    /// Profile change; tokens are untouched.
    SetUser {
        user: User,
    },
    ClearError,
    /// The HTTP client replaced the access token (and possibly the refresh
    /// token) after a refresh.
    TokenRefreshed {
        token: String,
        refresh_token: Option<String>,
    },
}

impl SessionAction {
    fn name(&self) -> &'static str {
        match self {
            SessionAction::LoginStart => "login_start",
            SessionAction::LoginSuccess { .. } => "login_success",
            SessionAction::LoginFailure { .. } => "login_failure",
            SessionAction::Logout => "logout",
            SessionAction::SetUser { .. } => "set_user",
            SessionAction::ClearError => "clear_error",
            SessionAction::TokenRefreshed { .. } => "token_refreshed",
        }
    }
}

pub fn reduce(session: &Session, action: SessionAction) -> Session {
    match action {
        SessionAction::LoginStart => Session {
            loading: true,
            error: None,
            ..session.clone()
        },
        SessionAction::LoginSuccess {
            user,
            token,
            refresh_token,
        } => Session {
            token: Some(token),
            refresh_token,
            ..Session::signed_out()
        }
        .with_user(user),
        SessionAction::LoginFailure { error } => Session {
            error: Some(error),
            ..Session::signed_out()
        },
        SessionAction::Logout => Session::signed_out(),
        SessionAction::SetUser { user } => session.clone().with_user(user),
        SessionAction::ClearError => Session {
            error: None,
            ..session.clone()
        },
        SessionAction::TokenRefreshed {
            token,
            refresh_token,
        } => {
            if !session.is_authenticated {
                return session.clone();
            }
            Session {
                token: Some(token),
                refresh_token: refresh_token.or_else(|| session.refresh_token.clone()),
                ..session.clone()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Persisted {
    Saved {
        token: String,
        refresh_token: Option<String>,
        user: User,
    },
    Cleared,
}

/// Holds the current [`Session`] and mirrors it into the [`TokenStore`].
pub struct SessionStore {
    state: watch::Sender<Session>,
    tokens: TokenStore,
    last_persisted: Mutex<Option<Persisted>>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("session", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    pub fn new(tokens: TokenStore) -> Self {
        let (state, _) = watch::channel(Session::initial());
        Self {
            state,
            tokens,
            last_persisted: Mutex::new(None),
        }
    }

    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Watch session changes.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Apply `action` and persist the resulting state.
    pub fn dispatch(&self, action: SessionAction) -> Session {
        let name = action.name();
        self.state
            .send_modify(|session| *session = reduce(session, action));
        let session = self.snapshot();
        tracing::debug!(
            action = name,
            authenticated = session.is_authenticated,
            loading = session.loading,
            "Session updated"
        );
        self.persist(&session);
        session
    }

    /// Load the persisted session once: a complete one signs in, anything
    /// else signs out.
    pub fn restore(&self) -> Session {
        match self.tokens.load() {
            Some(stored) => {
                tracing::info!(user_id = stored.user.id, "Restored persisted session");
                self.dispatch(SessionAction::LoginSuccess {
                    user: stored.user,
                    token: stored.token,
                    refresh_token: stored.refresh_token,
                })
            }
            None => self.dispatch(SessionAction::Logout),
        }
    }

    fn persist(&self, session: &Session) {
        if session.loading {
            return;
        }

        let target = match (&session.user, &session.token) {
            (Some(user), Some(token)) if session.is_authenticated => Persisted::Saved {
                token: token.clone(),
                refresh_token: session.refresh_token.clone(),
                user: user.clone(),
            },
            _ => Persisted::Cleared,
        };

        let mut last = self
            .last_persisted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if last.as_ref() == Some(&target) {
            return;
        }

        let result = match &target {
            Persisted::Saved {
                token,
                refresh_token,
                user,
            } => self.tokens.save(
                &TokenPair {
                    access_token: token.clone(),
                    refresh_token: refresh_token.clone(),
                },
                user,
            ),
            Persisted::Cleared => self.tokens.clear(),
        };

        match result {
            Ok(()) => *last = Some(target),
            Err(e) => tracing::warn!(error = %e, "Failed to persist session"),
        }
    }
}
