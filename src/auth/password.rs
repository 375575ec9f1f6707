// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Password hashing (Argon2id, PHC string format) and email normalization.

use std::sync::OnceLock;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use unicode_normalization::UnicodeNormalization;

use super::tokens::new_opaque_token;
use super::AuthError;

pub const MIN_PASSWORD_LEN: usize = 6;

static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();

/// Check the password policy, returning a user-facing message on failure.
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.trim().is_empty() {
        return Err("Password is required".to_string());
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        ));
    }
    Ok(())
}

/// Hash a password with a random salt.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::InternalError(format!("Failed to hash password: {e}")))
}

/// Verify a password against a stored PHC hash. Malformed hashes never match.
pub fn verify_password(password: &str, phc: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(phc) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Run a full verification against a hash of a random secret, so a login
/// for an unknown account costs the same as one with a wrong password.
/// Never matches in practice.
pub fn verify_against_dummy(password: &str) -> bool {
    let hash = DUMMY_HASH.get_or_init(|| hash_password(&new_opaque_token()).ok());
    hash.as_deref()
        .is_some_and(|phc| verify_password(password, phc))
}

/// Canonical form of an email address used for lookups.
pub fn normalize_email(email: &str) -> Result<String, String> {
    let normalized: String = email.trim().nfkc().collect::<String>().to_lowercase();
    match normalized.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(normalized),
        _ => Err("A valid email address is required".to_string()),
    }
}
