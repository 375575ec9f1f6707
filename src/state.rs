// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::auth::password::{hash_password, normalize_email, validate_password};
use crate::auth::{Role, TokenIssuer};
use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::models::User;
use crate::store::InMemoryStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<InMemoryStore>>,
    pub tokens: Arc<TokenIssuer>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(store: InMemoryStore, config: ServerConfig) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
            tokens: Arc::new(TokenIssuer::new(&config.jwt_secret, config.access_token_ttl)),
            config: Arc::new(config),
        }
    }

    /// Create the bootstrap admin account.
    pub async fn seed_admin(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let email = normalize_email(email).map_err(ApiError::bad_request)?;
        validate_password(password).map_err(ApiError::bad_request)?;
        let password_hash = hash_password(password)?;

        self.store
            .write()
            .await
            .create_user("Administrator", email, password_hash, Role::Admin)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(InMemoryStore::new(), ServerConfig::default())
    }
}
