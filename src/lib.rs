// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Academic Hub - academic resource sharing service and auth session client
//!
//! The crate ships two halves that speak the same JSON API:
//!
//! - the **client** session lifecycle (token storage, HTTP client with a
//!   single silent refresh, API facade, session state machine, auth
//!   controller, route guards), and
//! - the **backend** serving the endpoints the client consumes.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Password hashing, access/refresh tokens, extractors
//! - `client` - Auth session client
//! - `config` - Environment-driven client and server configuration
//! - `store` - In-memory accounts, tokens and resources

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod state;
pub mod store;
