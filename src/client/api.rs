// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Facade
//!
//! One method per backend endpoint. Every method returns an
//! [`ApiResponse`]; transport failures, HTTP errors and undecodable bodies
//! all become [`ApiResponse::Failure`] with a user-facing message.

use std::sync::Arc;

use reqwest::Method;
use serde::{de::DeserializeOwned, ser::SerializeStruct, Serialize, Serializer};
use serde_json::{json, Value};
use url::form_urlencoded;

use super::error::ClientError;
use super::http::{HttpClient, LOGIN_PATH, REFRESH_PATH, REGISTER_PATH};
use super::transport::Transport;
use crate::auth::Role;
use crate::models::{
    AdminStats, AuthPayload, Credentials, MessageResponse, NewResource, ProfileUpdate,
    RefreshResponse, RegisterRequest, Resource, ResourceQuery, ResourceUpdate, User,
};

/// Request key shared by resource searches; a new search supersedes the
/// previous one.
pub const SEARCH_REQUEST_KEY: &str = "search";

/// Outcome of a facade call.
///
/// Serializes as `{"success": true, "data": ...}` or
/// `{"success": false, "error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiResponse<T> {
    Success(T),
    Failure(String),
}

impl<T> ApiResponse<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, ApiResponse::Success(_))
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            ApiResponse::Success(data) => Some(data),
            ApiResponse::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ApiResponse::Success(_) => None,
            ApiResponse::Failure(error) => Some(error),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        match self {
            ApiResponse::Success(data) => ApiResponse::Success(f(data)),
            ApiResponse::Failure(error) => ApiResponse::Failure(error),
        }
    }

    pub fn into_result(self) -> Result<T, String> {
        match self {
            ApiResponse::Success(data) => Ok(data),
            ApiResponse::Failure(error) => Err(error),
        }
    }
}

impl<T> From<Result<T, ClientError>> for ApiResponse<T> {
    fn from(result: Result<T, ClientError>) -> Self {
        match result {
            Ok(data) => ApiResponse::Success(data),
            Err(e) => ApiResponse::Failure(e.user_message()),
        }
    }
}

impl<T: Serialize> Serialize for ApiResponse<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ApiResponse", 2)?;
        match self {
            ApiResponse::Success(data) => {
                state.serialize_field("success", &true)?;
                state.serialize_field("data", data)?;
            }
            ApiResponse::Failure(error) => {
                state.serialize_field("success", &false)?;
                state.serialize_field("error", error)?;
            }
        }
        state.end()
    }
}

fn to_body<B: Serialize>(body: &B) -> Result<Value, ClientError> {
    serde_json::to_value(body).map_err(|e| ClientError::Validation(e.to_string()))
}

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn resources_path(query: &ResourceQuery) -> String {
    let mut pairs = form_urlencoded::Serializer::new(String::new());
    if let Some(subject) = &query.subject {
        pairs.append_pair("subject", subject);
    }
    if let Some(kind) = query.kind {
        pairs.append_pair("kind", kind.as_str());
    }
    if let Some(owner_id) = query.owner_id {
        pairs.append_pair("ownerId", &owner_id.to_string());
    }
    let query = pairs.finish();
    if query.is_empty() {
        "/resources".to_string()
    } else {
        format!("/resources?{query}")
    }
}

pub struct ApiFacade<T> {
    client: Arc<HttpClient<T>>,
}

impl<T> Clone for ApiFacade<T> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
        }
    }
}

impl<T: Transport> ApiFacade<T> {
    pub fn new(client: Arc<HttpClient<T>>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<HttpClient<T>> {
        &self.client
    }

    async fn call<R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> ApiResponse<R> {
        let result = async {
            let response = self.client.request(method, path, body).await?;
            response.json::<R>()
        }
        .await;
        if let Err(e) = &result {
            tracing::debug!(path, error = %e, "API call failed");
        }
        result.into()
    }

    async fn call_with<B: Serialize, R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> ApiResponse<R> {
        match to_body(body) {
            Ok(body) => self.call(method, path, Some(body)).await,
            Err(e) => ApiResponse::Failure(e.user_message()),
        }
    }

    // ========== Auth ==========

    pub async fn login(&self, credentials: &Credentials) -> ApiResponse<AuthPayload> {
        self.call_with(Method::POST, LOGIN_PATH, credentials).await
    }

    pub async fn register(&self, request: &RegisterRequest) -> ApiResponse<AuthPayload> {
        self.call_with(Method::POST, REGISTER_PATH, request).await
    }

    pub async fn logout(&self) -> ApiResponse<MessageResponse> {
        self.call(Method::POST, "/auth/logout", None).await
    }

    /// Exchange a refresh token explicitly. The HTTP client does this on
    /// its own when a request comes back 401.
    pub async fn refresh(&self, refresh_token: &str) -> ApiResponse<RefreshResponse> {
        self.call(
            Method::POST,
            REFRESH_PATH,
            Some(json!({ "refreshToken": refresh_token })),
        )
        .await
    }

    pub async fn forgot_password(&self, email: &str) -> ApiResponse<MessageResponse> {
        self.call(Method::POST, "/auth/forgot-password", Some(json!({ "email": email })))
            .await
    }

    pub async fn reset_password(&self, token: &str, password: &str) -> ApiResponse<MessageResponse> {
        self.call(
            Method::POST,
            "/auth/reset-password",
            Some(json!({ "token": token, "password": password })),
        )
        .await
    }

    // ========== Profile ==========

    pub async fn get_profile(&self) -> ApiResponse<User> {
        self.call(Method::GET, "/users/profile", None).await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> ApiResponse<User> {
        self.call_with(Method::PUT, "/users/profile", update).await
    }

    // ========== Resources ==========

    pub async fn list_resources(&self, query: &ResourceQuery) -> ApiResponse<Vec<Resource>> {
        self.call(Method::GET, &resources_path(query), None).await
    }

    pub async fn get_resource(&self, resource_id: i64) -> ApiResponse<Resource> {
        self.call(Method::GET, &format!("/resources/{resource_id}"), None)
            .await
    }

    pub async fn create_resource(&self, resource: &NewResource) -> ApiResponse<Resource> {
        self.call_with(Method::POST, "/resources", resource).await
    }

    pub async fn update_resource(
        &self,
        resource_id: i64,
        update: &ResourceUpdate,
    ) -> ApiResponse<Resource> {
        self.call_with(Method::PUT, &format!("/resources/{resource_id}"), update)
            .await
    }

    pub async fn delete_resource(&self, resource_id: i64) -> ApiResponse<()> {
        self.call(Method::DELETE, &format!("/resources/{resource_id}"), None)
            .await
    }

    /// Search resources. Starting a new search cancels one still in flight;
    /// the superseded call reports "request cancelled".
    pub async fn search_resources(&self, query: &str) -> ApiResponse<Vec<Resource>> {
        let path = format!("/resources/search?q={}", encode(query));
        let result = async {
            let response = self
                .client
                .request_keyed(SEARCH_REQUEST_KEY, Method::GET, &path, None)
                .await?;
            response.json::<Vec<Resource>>()
        }
        .await;
        result.into()
    }

    // ========== Admin ==========

    pub async fn admin_list_users(&self) -> ApiResponse<Vec<User>> {
        self.call(Method::GET, "/admin/users", None).await
    }

    pub async fn admin_update_role(&self, user_id: i64, role: Role) -> ApiResponse<User> {
        self.call(
            Method::PUT,
            &format!("/admin/users/{user_id}/role"),
            Some(json!({ "role": role })),
        )
        .await
    }

    pub async fn admin_delete_user(&self, user_id: i64) -> ApiResponse<()> {
        self.call(Method::DELETE, &format!("/admin/users/{user_id}"), None)
            .await
    }

    pub async fn admin_stats(&self) -> ApiResponse<AdminStats> {
        self.call(Method::GET, "/admin/stats", None).await
    }
}
