// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User roles and the permissions they grant.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

pub const PERMISSION_READ: &str = "read";
pub const PERMISSION_UPLOAD: &str = "upload";
pub const PERMISSION_REVIEW: &str = "review";
pub const PERMISSION_MANAGE_USERS: &str = "manage_users";

/// User roles for authorization.
///
/// ## Role Hierarchy
///
/// - `Admin` - Full access, including user management
/// - `Teacher` - Can review shared material
/// - `User` - Student account, can read and upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Student account (least privilege)
    #[default]
    User,
    /// Teaching staff
    Teacher,
    /// Platform administrator
    Admin,
}

impl Role {
    /// Permissions granted to a freshly created or re-roled account.
    pub fn default_permissions(self) -> BTreeSet<String> {
        let mut granted = vec![PERMISSION_READ, PERMISSION_UPLOAD];
        if self >= Role::Teacher {
            granted.push(PERMISSION_REVIEW);
        }
        if self == Role::Admin {
            granted.push(PERMISSION_MANAGE_USERS);
        }
        granted.into_iter().map(str::to_string).collect()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Teacher => write!(f, "teacher"),
            Role::Admin => write!(f, "admin"),
        }
    }
}
