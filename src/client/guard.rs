// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Route guards: pure decisions over a [`Session`] snapshot.
//!
//! Role requirements are exact matches; an admin does not satisfy a
//! teacher-only route unless the route lists the permission instead.

use super::session::Session;
use crate::auth::Role;
use crate::config::ClientConfig;

/// What the router should do with a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session not known yet; show a loading state.
    Pending,
    Render,
    /// Navigate to `to`. `from` is the originally requested path, kept so
    /// the user can be sent back after signing in.
    Redirect { to: String, from: Option<String> },
}

/// Navigation paths the guards redirect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardPaths {
    pub login: String,
    pub unauthorized: String,
    pub default: String,
}

impl From<&ClientConfig> for GuardPaths {
    fn from(config: &ClientConfig) -> Self {
        Self {
            login: config.login_path.clone(),
            unauthorized: config.unauthorized_path.clone(),
            default: config.default_path.clone(),
        }
    }
}

impl Default for GuardPaths {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

/// The navigation being guarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    /// Target remembered by an earlier redirect, if any.
    pub from: Option<String>,
}

impl Location {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            from: None,
        }
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }
}

/// Requires an authenticated session, optionally with a role and
/// permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectedRoute {
    pub required_role: Option<Role>,
    pub required_permissions: Vec<String>,
}

impl ProtectedRoute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(mut self, role: Role) -> Self {
        self.required_role = Some(role);
        self
    }

    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.required_permissions.push(permission.into());
        self
    }

    pub fn evaluate(&self, session: &Session, location: &Location, paths: &GuardPaths) -> GuardDecision {
        if session.loading {
            return GuardDecision::Pending;
        }
        if !session.is_authenticated {
            return GuardDecision::Redirect {
                to: paths.login.clone(),
                from: Some(location.path.clone()),
            };
        }

        let role_ok = self.required_role.map_or(true, |role| session.has_role(role));
        let permissions_ok = self
            .required_permissions
            .iter()
            .all(|permission| session.has_permission(permission));

        if role_ok && permissions_ok {
            GuardDecision::Render
        } else {
            tracing::debug!(path = %location.path, role_ok, permissions_ok, "Route access denied");
            GuardDecision::Redirect {
                to: paths.unauthorized.clone(),
                from: Some(location.path.clone()),
            }
        }
    }
}

/// A public route. When `restricted` (login, register), signed-in users
/// are sent on to where they were going.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublicRoute {
    pub restricted: bool,
}

impl PublicRoute {
    pub fn open() -> Self {
        Self { restricted: false }
    }

    pub fn restricted() -> Self {
        Self { restricted: true }
    }

    pub fn evaluate(&self, session: &Session, location: &Location, paths: &GuardPaths) -> GuardDecision {
        if session.loading {
            return GuardDecision::Pending;
        }
        if session.is_authenticated && self.restricted {
            return GuardDecision::Redirect {
                to: location.from.clone().unwrap_or_else(|| paths.default.clone()),
                from: None,
            };
        }
        GuardDecision::Render
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    Protected(ProtectedRoute),
    Public(PublicRoute),
}

impl Guard {
    pub fn evaluate(&self, session: &Session, location: &Location, paths: &GuardPaths) -> GuardDecision {
        match self {
            Guard::Protected(route) => route.evaluate(session, location, paths),
            Guard::Public(route) => route.evaluate(session, location, paths),
        }
    }
}

/// Evaluates guard chains against configured paths.
#[derive(Debug, Clone, Default)]
pub struct RouteGuard {
    paths: GuardPaths,
}

impl RouteGuard {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            paths: GuardPaths::from(config),
        }
    }

    pub fn paths(&self) -> &GuardPaths {
        &self.paths
    }

    /// Apply `guards` in order; the first decision other than
    /// [`GuardDecision::Render`] wins.
    pub fn evaluate(&self, guards: &[Guard], session: &Session, location: &Location) -> GuardDecision {
        guards
            .iter()
            .map(|guard| guard.evaluate(session, location, &self.paths))
            .find(|decision| *decision != GuardDecision::Render)
            .unwrap_or(GuardDecision::Render)
    }
}
