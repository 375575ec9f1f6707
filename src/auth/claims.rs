// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims and authenticated user representation.

use serde::{Deserialize, Serialize};

use super::roles::Role;
use super::AuthError;

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (numeric user ID, as a string per RFC 7519)
    pub sub: String,

    /// Email at the time of issuance
    pub email: String,

    /// Role at the time of issuance
    #[serde(default)]
    pub role: Role,

    /// Issued at timestamp
    pub iat: i64,

    /// Expiration timestamp
    pub exp: i64,
}

/// Authenticated user information extracted from an access token.
///
/// This is the primary type used by handlers to represent the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub email: String,
    pub role: Role,
    /// Token expiration (Unix timestamp)
    pub expires_at: i64,
}

impl AuthenticatedUser {
    /// Create from verified claims.
    pub fn from_claims(claims: AccessClaims) -> Result<Self, AuthError> {
        let user_id = claims
            .sub
            .parse::<i64>()
            .map_err(|_| AuthError::MalformedToken)?;

        Ok(Self {
            user_id,
            email: claims.email,
            role: claims.role,
            expires_at: claims.exp,
        })
    }

    /// Check if the user holds exactly the given role.
    pub fn has_role(&self, required: Role) -> bool {
        self.role == required
    }

    /// Check if this user is an admin.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
