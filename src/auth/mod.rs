// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Server-side authentication for the Academic Hub API.
//!
//! ## Auth Flow
//!
//! 1. Client posts credentials to `/api/auth/login` (or registers)
//! 2. Server verifies the Argon2id hash and returns:
//!    - a short-lived HS256 access token
//!    - an opaque refresh token (stored server-side as a SHA-256 digest)
//! 3. Client sends `Authorization: Bearer <access token>`
//! 4. On 401 the client exchanges its refresh token at `/api/auth/refresh`
//!
//! ## Security
//!
//! - Refresh and reset tokens are never stored in clear
//! - Logout and password reset revoke every refresh token of the account
//! - Clock skew tolerance is 60 seconds

pub mod claims;
pub mod error;
pub mod extractor;
pub mod password;
pub mod roles;
pub mod tokens;

pub use claims::AuthenticatedUser;
pub use error::AuthError;
pub use extractor::{AdminOnly, Auth};
pub use roles::Role;
pub use tokens::TokenIssuer;
