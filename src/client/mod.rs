// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Auth Session Client
//!
//! Client-side session lifecycle for the Academic Hub API, layered leaves
//! first:
//!
//! | Layer | Module |
//! |-------|--------|
//! | Persisted tokens and user | [`token_store`] |
//! | Transport | [`transport`] |
//! | Bearer auth and single refresh | [`http`] |
//! | One method per endpoint | [`api`] |
//! | Session state machine | [`session`] |
//! | Auth flows | [`controller`] |
//! | Navigation gating | [`guard`] |
//!
//! A UI action goes to the [`AuthController`], which calls the
//! [`ApiFacade`] over the [`HttpClient`]. The controller then updates the
//! [`SessionStore`], which persists to the [`TokenStore`] and is read by
//! the [`RouteGuard`].

pub mod api;
pub mod controller;
pub mod error;
pub mod guard;
pub mod http;
pub mod session;
pub mod token_store;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use api::{ApiFacade, ApiResponse};
pub use controller::{AuthController, History, Navigator};
pub use error::{ClientError, StorageError};
pub use guard::{Guard, GuardDecision, Location, ProtectedRoute, PublicRoute, RouteGuard};
pub use http::{ClientEvent, HttpClient};
pub use session::{Session, SessionAction, SessionStatus, SessionStore};
pub use token_store::{FileStore, KeyValueStore, MemoryStore, TokenStore};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
