// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP API served under `/api`.
//!
//! Route groups are declared once in [`ROUTE_GROUPS`] and mounted in order.
//! Overlapping routes panic while the router is built, so a bad table stops
//! the server at startup instead of shadowing endpoints.

use axum::{routing::get, Router};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

pub mod admin;
pub mod auth;
pub mod health;
pub mod resources;
pub mod users;

/// A set of routes mounted below a common prefix.
pub struct RouteGroup {
    pub name: &'static str,
    pub prefix: &'static str,
    pub routes: fn() -> Router<AppState>,
}

pub const API_PREFIX: &str = "/api";

pub static ROUTE_GROUPS: &[RouteGroup] = &[
    RouteGroup {
        name: "auth",
        prefix: "/auth",
        routes: auth::routes,
    },
    RouteGroup {
        name: "users",
        prefix: "/users",
        routes: users::routes,
    },
    RouteGroup {
        name: "resources",
        prefix: "/resources",
        routes: resources::routes,
    },
    RouteGroup {
        name: "admin",
        prefix: "/admin",
        routes: admin::routes,
    },
];

pub fn router(state: AppState) -> Router {
    let api_routes = ROUTE_GROUPS
        .iter()
        .fold(Router::new(), |api, group| {
            tracing::debug!(group = group.name, prefix = group.prefix, "Mounting route group");
            api.nest(group.prefix, (group.routes)())
        })
        .route("/health", get(health::health));

    Router::new()
        .nest(API_PREFIX, api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}
