// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error types for the client library.

use thiserror::Error;

/// Failure of the persisted key/value storage behind the token store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored value is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced by the HTTP client and the controller.
///
/// The API facade converts every variant into a failure message; nothing
/// of this type escapes past it.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No response reached the client.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a failure status.
    #[error("request failed with status {status}")]
    Http { status: u16, body: String },

    /// A success response without the fields the caller needs.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Rejected locally before any request was made.
    #[error("{0}")]
    Validation(String),

    #[error("no refresh token available")]
    NoRefreshToken,

    /// Superseded by a newer request under the same key.
    #[error("request cancelled")]
    Cancelled,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Message suitable for showing to the user.
    ///
    /// For HTTP failures the server's JSON `error` (or `message`) field is
    /// preferred over the bare status line.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Http { status, body } => serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|value| {
                    ["error", "message"]
                        .iter()
                        .find_map(|key| value.get(*key).and_then(|v| v.as_str()).map(str::to_string))
                })
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| format!("Request failed with status {status}")),
            ClientError::Network(_) => "Unable to reach the server".to_string(),
            other => other.to_string(),
        }
    }
}
