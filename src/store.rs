// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory store backing the API.
//!
//! Holds accounts (with password hashes), refresh and reset token digests,
//! and shared resources. Opaque tokens are digested on the way in; the
//! store never sees them in clear after insertion.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::auth::tokens::token_digest;
use crate::auth::Role;
use crate::error::ApiError;
use crate::models::{
    AdminStats, NewResource, ProfileUpdate, Resource, ResourceQuery, ResourceUpdate, User,
};

/// Account record with its credential.
#[derive(Debug, Clone)]
pub struct StoredUser {
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
struct TokenRecord {
    user_id: i64,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct InMemoryStore {
    users: BTreeMap<i64, StoredUser>,
    emails: HashMap<String, i64>,
    refresh_tokens: HashMap<String, TokenRecord>,
    reset_tokens: HashMap<String, TokenRecord>,
    resources: BTreeMap<i64, Resource>,
    next_user_id: i64,
    next_resource_id: i64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Accounts ==========

    /// Create an account. `email` must already be normalized.
    pub fn create_user(
        &mut self,
        name: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
        role: Role,
    ) -> Result<User, ApiError> {
        let email = email.into();
        if self.emails.contains_key(&email) {
            return Err(ApiError::conflict("An account with this email already exists"));
        }

        self.next_user_id += 1;
        let user = User {
            id: self.next_user_id,
            name: name.into(),
            email: email.clone(),
            role,
            permissions: role.default_permissions(),
            avatar: None,
        };
        self.emails.insert(email, user.id);
        self.users.insert(
            user.id,
            StoredUser {
                user: user.clone(),
                password_hash: password_hash.into(),
            },
        );
        Ok(user)
    }

    pub fn find_by_email(&self, email: &str) -> Option<&StoredUser> {
        self.emails.get(email).and_then(|id| self.users.get(id))
    }

    pub fn user(&self, user_id: i64) -> Result<User, ApiError> {
        self.users
            .get(&user_id)
            .map(|stored| stored.user.clone())
            .ok_or_else(|| ApiError::not_found("User not found"))
    }

    pub fn list_users(&self) -> Vec<User> {
        self.users.values().map(|stored| stored.user.clone()).collect()
    }

    pub fn update_profile(&mut self, user_id: i64, update: ProfileUpdate) -> Result<User, ApiError> {
        let stored = self
            .users
            .get_mut(&user_id)
            .ok_or_else(|| ApiError::not_found("User not found"))?;

        if let Some(name) = update.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ApiError::bad_request("Name cannot be empty"));
            }
            stored.user.name = name;
        }
        if let Some(avatar) = update.avatar {
            stored.user.avatar = Some(avatar).filter(|a| !a.trim().is_empty());
        }
        Ok(stored.user.clone())
    }

    /// Change a user's role; permissions are recomputed from the new role.
    pub fn set_role(&mut self, user_id: i64, role: Role) -> Result<User, ApiError> {
        let stored = self
            .users
            .get_mut(&user_id)
            .ok_or_else(|| ApiError::not_found("User not found"))?;
        stored.user.role = role;
        stored.user.permissions = role.default_permissions();
        Ok(stored.user.clone())
    }

    pub fn set_password_hash(&mut self, user_id: i64, password_hash: String) -> Result<(), ApiError> {
        let stored = self
            .users
            .get_mut(&user_id)
            .ok_or_else(|| ApiError::not_found("User not found"))?;
        stored.password_hash = password_hash;
        Ok(())
    }

    /// Remove an account together with its outstanding tokens.
    pub fn delete_user(&mut self, user_id: i64) -> Result<(), ApiError> {
        let stored = self
            .users
            .remove(&user_id)
            .ok_or_else(|| ApiError::not_found("User not found"))?;
        self.emails.remove(&stored.user.email);
        self.revoke_refresh_tokens(user_id);
        self.reset_tokens.retain(|_, record| record.user_id != user_id);
        Ok(())
    }

    // ========== Refresh Tokens ==========

    /// Store a refresh token, dropping any that have already expired.
    pub fn insert_refresh_token(&mut self, user_id: i64, token: &str, expires_at: DateTime<Utc>) {
        let now = Utc::now();
        self.refresh_tokens.retain(|_, record| record.expires_at > now);
        self.refresh_tokens
            .insert(token_digest(token), TokenRecord { user_id, expires_at });
    }

    /// Owner of a live refresh token. Expired tokens are dropped on lookup.
    pub fn refresh_token_owner(&mut self, token: &str, now: DateTime<Utc>) -> Option<i64> {
        let digest = token_digest(token);
        match self.refresh_tokens.get(&digest) {
            Some(record) if record.expires_at > now => Some(record.user_id),
            Some(_) => {
                self.refresh_tokens.remove(&digest);
                None
            }
            None => None,
        }
    }

    pub fn revoke_refresh_tokens(&mut self, user_id: i64) -> usize {
        let before = self.refresh_tokens.len();
        self.refresh_tokens.retain(|_, record| record.user_id != user_id);
        before - self.refresh_tokens.len()
    }

    // ========== Password Reset Tokens ==========

    /// Store a reset token. It replaces the user's previous one, and
    /// expired tokens of other users are dropped.
    pub fn insert_reset_token(&mut self, user_id: i64, token: &str, expires_at: DateTime<Utc>) {
        let now = Utc::now();
        self.reset_tokens
            .retain(|_, record| record.user_id != user_id && record.expires_at > now);
        self.reset_tokens
            .insert(token_digest(token), TokenRecord { user_id, expires_at });
    }

    /// Consume a reset token. Each token can be used once.
    pub fn take_reset_token(&mut self, token: &str, now: DateTime<Utc>) -> Option<i64> {
        self.reset_tokens
            .remove(&token_digest(token))
            .filter(|record| record.expires_at > now)
            .map(|record| record.user_id)
    }

    // ========== Resources ==========

    pub fn list_resources(&self, query: &ResourceQuery) -> Vec<Resource> {
        self.resources
            .values()
            .filter(|r| {
                query
                    .subject
                    .as_ref()
                    .map_or(true, |s| r.subject.eq_ignore_ascii_case(s))
            })
            .filter(|r| query.kind.map_or(true, |k| r.kind == k))
            .filter(|r| query.owner_id.map_or(true, |o| r.owner_id == o))
            .cloned()
            .collect()
    }

    /// Case-insensitive substring search over title, description, subject and tags.
    pub fn search_resources(&self, needle: &str) -> Vec<Resource> {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.resources
            .values()
            .filter(|r| {
                r.title.to_lowercase().contains(&needle)
                    || r.description.to_lowercase().contains(&needle)
                    || r.subject.to_lowercase().contains(&needle)
                    || r.tags.iter().any(|t| t.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect()
    }

    pub fn resource(&self, resource_id: i64) -> Result<Resource, ApiError> {
        self.resources
            .get(&resource_id)
            .cloned()
            .ok_or_else(|| ApiError::not_found("Resource not found"))
    }

    pub fn create_resource(&mut self, owner_id: i64, request: NewResource) -> Result<Resource, ApiError> {
        let title = request.title.trim().to_string();
        if title.is_empty() {
            return Err(ApiError::bad_request("Title is required"));
        }

        self.next_resource_id += 1;
        let now = Utc::now();
        let resource = Resource {
            id: self.next_resource_id,
            title,
            description: request.description,
            subject: request.subject,
            kind: request.kind,
            url: request.url,
            tags: request.tags,
            owner_id,
            created_at: now,
            updated_at: now,
        };
        self.resources.insert(resource.id, resource.clone());
        Ok(resource)
    }

    pub fn update_resource(
        &mut self,
        resource_id: i64,
        update: ResourceUpdate,
    ) -> Result<Resource, ApiError> {
        let resource = self
            .resources
            .get_mut(&resource_id)
            .ok_or_else(|| ApiError::not_found("Resource not found"))?;

        if let Some(title) = update.title {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(ApiError::bad_request("Title cannot be empty"));
            }
            resource.title = title;
        }
        if let Some(description) = update.description {
            resource.description = description;
        }
        if let Some(subject) = update.subject {
            resource.subject = subject;
        }
        if let Some(kind) = update.kind {
            resource.kind = kind;
        }
        if let Some(url) = update.url {
            resource.url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Some(tags) = update.tags {
            resource.tags = tags;
        }
        resource.updated_at = Utc::now();
        Ok(resource.clone())
    }

    pub fn delete_resource(&mut self, resource_id: i64) -> Result<(), ApiError> {
        self.resources
            .remove(&resource_id)
            .map(|_| ())
            .ok_or_else(|| ApiError::not_found("Resource not found"))
    }

    // ========== Admin ==========

    pub fn stats(&self) -> AdminStats {
        let mut stats = AdminStats {
            total_users: self.users.len(),
            total_resources: self.resources.len(),
            ..AdminStats::default()
        };
        for stored in self.users.values() {
            match stored.user.role {
                Role::User => stats.students += 1,
                Role::Teacher => stats.teachers += 1,
                Role::Admin => stats.admins += 1,
            }
        }
        stats
    }
}
