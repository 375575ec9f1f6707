// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # HTTP Client
//!
//! Wraps a [`Transport`] with session handling:
//!
//! 1. The stored access token is attached as a bearer credential.
//! 2. A 401 from any endpoint except login, registration and refresh
//!    triggers one refresh through `POST /auth/refresh`.
//! 3. On a successful refresh the original request is retried once. A 401
//!    from the retry is returned as is.
//! 4. If the refresh fails, stored auth data is cleared, a
//!    [`ClientEvent::SessionExpired`] is broadcast and the original 401 is
//!    returned. Navigation is left to the route guards.
//!
//! Refreshes are serialized by an async mutex. A caller that waited on the
//! mutex and finds a different access token in the store than the one its
//! request carried reuses that token instead of refreshing again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::error::ClientError;
use super::token_store::TokenStore;
use super::transport::{HttpRequest, HttpResponse, Transport};
use crate::config::ClientConfig;
use crate::models::RefreshResponse;

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const REFRESH_PATH: &str = "/auth/refresh";

const EVENT_CAPACITY: usize = 16;

/// Session changes made by the HTTP client on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The access token was replaced after a successful refresh.
    /// `refresh_token` is set when the server rotated it.
    TokenRefreshed {
        access_token: String,
        refresh_token: Option<String>,
    },
    /// Refresh failed and stored auth data was cleared.
    SessionExpired,
}

type InFlight = HashMap<String, (u64, CancellationToken)>;

pub struct HttpClient<T> {
    transport: T,
    config: Arc<ClientConfig>,
    tokens: TokenStore,
    refresh_lock: tokio::sync::Mutex<()>,
    events: broadcast::Sender<ClientEvent>,
    in_flight: Mutex<InFlight>,
    next_generation: AtomicU64,
}

impl<T> std::fmt::Debug for HttpClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.config.api_base_url.as_str())
            .finish_non_exhaustive()
    }
}

/// Login, registration and refresh answer 401 for bad credentials, never
/// for an expired session.
fn skips_refresh(path: &str) -> bool {
    let path = path.split('?').next().unwrap_or_default();
    let path = path.trim_end_matches('/');
    let normalized = format!("/{}", path.trim_start_matches('/'));
    [LOGIN_PATH, REGISTER_PATH, REFRESH_PATH].contains(&normalized.as_str())
}

fn into_result(response: HttpResponse) -> Result<HttpResponse, ClientError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(ClientError::Http {
            status: response.status,
            body: response.body,
        })
    }
}

impl<T: Transport> HttpClient<T> {
    pub fn new(transport: T, config: Arc<ClientConfig>, tokens: TokenStore) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transport,
            config,
            tokens,
            refresh_lock: tokio::sync::Mutex::new(()),
            events,
            in_flight: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn config(&self) -> &Arc<ClientConfig> {
        &self.config
    }

    /// Receive session changes made by this client.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn publish(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<HttpResponse, ClientError> {
        self.request_with_headers(method, path, body, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, ClientError> {
        self.execute(method, path, body, headers, None).await
    }

    /// Like [`HttpClient::request`], but a newer request under the same
    /// `key` cancels this one, which then fails with
    /// [`ClientError::Cancelled`].
    ///
    /// Cancellation only interrupts sends. A token refresh this request
    /// started runs to completion so concurrent callers can reuse it.
    pub async fn request_keyed(
        &self,
        key: &str,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<HttpResponse, ClientError> {
        let cancel = CancellationToken::new();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        {
            let mut in_flight = self.in_flight();
            if let Some((_, previous)) = in_flight.insert(key.to_string(), (generation, cancel.clone())) {
                previous.cancel();
            }
        }

        let result = self.execute(method, path, body, &[], Some(&cancel)).await;
        if matches!(result, Err(ClientError::Cancelled)) {
            tracing::debug!(key, "Request superseded");
        }

        let mut in_flight = self.in_flight();
        if in_flight.get(key).map(|(g, _)| *g) == Some(generation) {
            in_flight.remove(key);
        }
        result
    }

    /// Cancel the in-flight request under `key`, if any.
    pub fn cancel(&self, key: &str) {
        if let Some((_, token)) = self.in_flight().remove(key) {
            token.cancel();
        }
    }

    fn in_flight(&self) -> std::sync::MutexGuard<'_, InFlight> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
        cancel: Option<&CancellationToken>,
    ) -> Result<HttpResponse, ClientError> {
        let url = self
            .config
            .endpoint(path)
            .map_err(|e| ClientError::Validation(format!("invalid request path {path}: {e}")))?;
        let mut request = HttpRequest::new(method, url);
        request.body = body;
        for (name, value) in headers {
            request.set_header(name, *value);
        }

        let sent_token = self.tokens.access_token();
        let response = self
            .send_authorized(request.clone(), sent_token.as_deref(), cancel)
            .await?;

        if response.status != 401 || skips_refresh(path) {
            return into_result(response);
        }

        tracing::debug!(path, "Received 401, attempting token refresh");
        match self.refresh_access_token(sent_token.as_deref()).await {
            Ok(token) => {
                let retried = self.send_authorized(request, Some(&token), cancel).await?;
                if retried.status == 401 {
                    tracing::warn!(path, "Request still unauthorized after token refresh");
                }
                into_result(retried)
            }
            Err(e) => {
                tracing::info!(path, error = %e, "Token refresh failed, session cleared");
                into_result(response)
            }
        }
    }

    async fn send_authorized(
        &self,
        mut request: HttpRequest,
        token: Option<&str>,
        cancel: Option<&CancellationToken>,
    ) -> Result<HttpResponse, ClientError> {
        if let Some(token) = token {
            request.set_header("Authorization", format!("Bearer {token}"));
        }
        let Some(cancel) = cancel else {
            return self.transport.send(request).await;
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            result = self.transport.send(request) => result,
        }
    }

    /// Obtain a fresh access token, refreshing at most once at a time.
    ///
    /// `stale` is the token the failed request carried.
    async fn refresh_access_token(&self, stale: Option<&str>) -> Result<String, ClientError> {
        let _guard = self.refresh_lock.lock().await;

        if let Some(current) = self.tokens.access_token() {
            if Some(current.as_str()) != stale {
                tracing::debug!("Access token already refreshed by a concurrent request");
                return Ok(current);
            }
        }

        match self.exchange_refresh_token().await {
            Ok(token) => Ok(token),
            Err(e) => {
                let had_session =
                    self.tokens.access_token().is_some() || self.tokens.refresh_token().is_some();
                if let Err(clear_err) = self.tokens.clear() {
                    tracing::warn!(error = %clear_err, "Failed to clear stored session");
                }
                if had_session {
                    let _ = self.events.send(ClientEvent::SessionExpired);
                }
                Err(e)
            }
        }
    }

    async fn exchange_refresh_token(&self) -> Result<String, ClientError> {
        let refresh_token = self.tokens.refresh_token().ok_or(ClientError::NoRefreshToken)?;

        let url = self
            .config
            .endpoint(REFRESH_PATH)
            .map_err(|e| ClientError::Validation(e.to_string()))?;
        let mut request = HttpRequest::new(Method::POST, url);
        request.body = Some(json!({ "refreshToken": refresh_token }));

        let response = into_result(self.transport.send(request).await?)?;
        let refreshed: RefreshResponse = response.json()?;
        let token = refreshed
            .access_token()
            .ok_or_else(|| ClientError::InvalidResponse("refresh response without a token".into()))?
            .to_string();

        let rotated = refreshed.refresh_token.filter(|t| !t.is_empty());

        self.tokens.set_access_token(&token)?;
        if let Some(rotated) = &rotated {
            self.tokens.set_refresh_token(rotated)?;
        }
        tracing::info!(rotated = rotated.is_some(), "Access token refreshed");
        let _ = self.events.send(ClientEvent::TokenRefreshed {
            access_token: token.clone(),
            refresh_token: rotated,
        });
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::client::mock::{bearer, MockTransport};

    fn client(transport: MockTransport) -> (Arc<HttpClient<MockTransport>>, TokenStore) {
        let tokens = TokenStore::in_memory();
        let client = HttpClient::new(
            transport,
            Arc::new(ClientConfig::default()),
            tokens.clone(),
        );
        (Arc::new(client), tokens)
    }

    fn unauthorized() -> Result<HttpResponse, ClientError> {
        Ok(HttpResponse::new(401, r#"{"error":"Token expired"}"#))
    }

    #[test]
    fn auth_endpoints_skip_refresh() {
        assert!(skips_refresh("/auth/login"));
        assert!(skips_refresh("auth/register"));
        assert!(skips_refresh("/auth/refresh/"));
        assert!(!skips_refresh("/auth/logout"));
        assert!(!skips_refresh("/users/profile"));
    }

    #[tokio::test]
    async fn attaches_bearer_token() {
        let (client, tokens) = client(MockTransport::new(|_| Ok(HttpResponse::new(200, "{}"))));
        tokens.set_access_token("T1").unwrap();

        client.request(Method::GET, "/users/profile", None).await.unwrap();

        let requests = client.transport().requests();
        assert_eq!(requests[0].header("Authorization"), Some("Bearer T1"));
        assert_eq!(requests[0].url.as_str(), "http://localhost:5000/api/users/profile");
    }

    #[tokio::test]
    async fn no_token_means_no_header() {
        let (client, _) = client(MockTransport::new(|_| Ok(HttpResponse::new(200, "{}"))));
        client.request(Method::GET, "/resources", None).await.unwrap();
        assert_eq!(client.transport().requests()[0].header("Authorization"), None);
    }

    #[tokio::test]
    async fn failure_status_is_http_error() {
        let (client, _) = client(MockTransport::new(|_| {
            Ok(HttpResponse::new(404, r#"{"error":"Resource not found"}"#))
        }));
        let err = client.request(Method::GET, "/resources/9", None).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.user_message(), "Resource not found");
    }

    #[tokio::test]
    async fn refreshes_once_and_retries() {
        let (client, tokens) = client(MockTransport::new(|req| match req.url.path() {
            "/api/auth/refresh" => Ok(HttpResponse::new(200, r#"{"token":"T2"}"#)),
            _ if bearer(req) == Some("T2") => Ok(HttpResponse::new(200, r#"{"ok":true}"#)),
            _ => unauthorized(),
        }));
        tokens.set_access_token("T1").unwrap();
        tokens.set_refresh_token("R1").unwrap();
        let mut events = client.subscribe();

        let response = client.request(Method::GET, "/users/profile", None).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(tokens.access_token().as_deref(), Some("T2"));
        assert_eq!(client.transport().count("/auth/refresh"), 1);
        assert_eq!(client.transport().count("/users/profile"), 2);

        let refresh = &client.transport().requests()[1];
        assert_eq!(refresh.body, Some(json!({"refreshToken": "R1"})));
        assert_eq!(refresh.header("Authorization"), None);
        assert_eq!(
            events.try_recv().unwrap(),
            ClientEvent::TokenRefreshed {
                access_token: "T2".into(),
                refresh_token: None,
            }
        );
    }

    #[tokio::test]
    async fn second_401_after_retry_is_terminal() {
        let (client, tokens) = client(MockTransport::new(|req| match req.url.path() {
            "/api/auth/refresh" => Ok(HttpResponse::new(200, r#"{"token":"T2"}"#)),
            _ => unauthorized(),
        }));
        tokens.set_access_token("T1").unwrap();
        tokens.set_refresh_token("R1").unwrap();

        let err = client.request(Method::GET, "/users/profile", None).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(client.transport().count("/auth/refresh"), 1);
        assert_eq!(client.transport().count("/users/profile"), 2);
    }

    #[tokio::test]
    async fn login_401_never_refreshes() {
        let (client, tokens) = client(MockTransport::new(|_| {
            Ok(HttpResponse::new(401, r#"{"error":"Invalid email or password"}"#))
        }));
        tokens.set_refresh_token("R1").unwrap();

        let err = client
            .request(Method::POST, LOGIN_PATH, Some(json!({"email": "a@test.com", "password": "bad"})))
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(client.transport().count("/auth/refresh"), 0);
        assert_eq!(tokens.refresh_token().as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn failed_refresh_clears_store_and_returns_original_error() {
        let (client, tokens) = client(MockTransport::new(|req| match req.url.path() {
            "/api/auth/refresh" => Ok(HttpResponse::new(401, r#"{"error":"Refresh token revoked"}"#)),
            _ => unauthorized(),
        }));
        tokens.set_access_token("T1").unwrap();
        tokens.set_refresh_token("R1").unwrap();
        let mut events = client.subscribe();

        let err = client.request(Method::GET, "/users/profile", None).await.unwrap_err();
        assert_eq!(err.user_message(), "Token expired");
        assert!(tokens.access_token().is_none());
        assert!(tokens.refresh_token().is_none());
        assert_eq!(client.transport().count("/users/profile"), 1);
        assert_eq!(events.try_recv().unwrap(), ClientEvent::SessionExpired);
    }

    #[tokio::test]
    async fn missing_refresh_token_clears_without_calling_refresh() {
        let (client, tokens) = client(MockTransport::new(|_| unauthorized()));
        tokens.set_access_token("T1").unwrap();

        let err = client.request(Method::GET, "/users/profile", None).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(client.transport().count("/auth/refresh"), 0);
        assert!(tokens.access_token().is_none());
    }

    #[tokio::test]
    async fn rotated_refresh_token_is_stored() {
        let (client, tokens) = client(MockTransport::new(|req| match req.url.path() {
            "/api/auth/refresh" => Ok(HttpResponse::new(
                200,
                r#"{"accessToken":"T2","refreshToken":"R2"}"#,
            )),
            _ if bearer(req) == Some("T2") => Ok(HttpResponse::new(200, "{}")),
            _ => unauthorized(),
        }));
        tokens.set_access_token("T1").unwrap();
        tokens.set_refresh_token("R1").unwrap();

        client.request(Method::GET, "/resources", None).await.unwrap();
        assert_eq!(tokens.refresh_token().as_deref(), Some("R2"));
    }

    #[tokio::test]
    async fn concurrent_401s_share_one_refresh() {
        let transport = MockTransport::new(|req| match req.url.path() {
            "/api/auth/refresh" => Ok(HttpResponse::new(200, r#"{"token":"T2"}"#)),
            _ if bearer(req) == Some("T2") => Ok(HttpResponse::new(200, "{}")),
            _ => unauthorized(),
        })
        .with_delay(Duration::from_millis(20));
        let (client, tokens) = client(transport);
        tokens.set_access_token("T1").unwrap();
        tokens.set_refresh_token("R1").unwrap();

        let (a, b, c) = tokio::join!(
            client.request(Method::GET, "/users/profile", None),
            client.request(Method::GET, "/resources", None),
            client.request(Method::GET, "/admin/stats", None),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(client.transport().count("/auth/refresh"), 1);
    }

    #[tokio::test]
    async fn keyed_request_cancels_predecessor() {
        let transport = MockTransport::new(|_| Ok(HttpResponse::new(200, "[]")))
            .with_delay(Duration::from_millis(50));
        let (client, _) = client(transport);

        let first = client.request_keyed("search", Method::GET, "/resources/search?q=a", None);
        let second = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            client
                .request_keyed("search", Method::GET, "/resources/search?q=al", None)
                .await
        };
        let (first, second) = tokio::join!(first, second);

        assert!(matches!(first, Err(ClientError::Cancelled)));
        assert!(second.is_ok());
        assert!(client.in_flight().is_empty());
    }

    #[tokio::test]
    async fn superseded_request_does_not_abandon_its_refresh() {
        let transport = MockTransport::new(|req| match req.url.path() {
            "/api/auth/refresh" => Ok(HttpResponse::new(
                200,
                r#"{"token":"T2","refreshToken":"R2"}"#,
            )),
            _ if bearer(req) == Some("T2") => Ok(HttpResponse::new(200, "[]")),
            _ => unauthorized(),
        })
        .with_delay(Duration::from_millis(30));
        let (client, tokens) = client(transport);
        tokens.set_access_token("T1").unwrap();
        tokens.set_refresh_token("R1").unwrap();

        // The second search starts while the first one's refresh is on the wire.
        let first = client.request_keyed("search", Method::GET, "/resources/search?q=a", None);
        let second = async {
            tokio::time::sleep(Duration::from_millis(45)).await;
            client
                .request_keyed("search", Method::GET, "/resources/search?q=al", None)
                .await
        };
        let (first, second) = tokio::join!(first, second);

        assert!(matches!(first, Err(ClientError::Cancelled)));
        assert_eq!(second.unwrap().status, 200);
        assert_eq!(client.transport().count("/auth/refresh"), 1);
        assert_eq!(tokens.access_token().as_deref(), Some("T2"));
        assert_eq!(tokens.refresh_token().as_deref(), Some("R2"));
    }

    #[tokio::test]
    async fn network_failure_is_propagated() {
        let (client, _) = client(MockTransport::new(|_| {
            Err(ClientError::Network("connection refused".into()))
        }));
        let err = client.request(Method::GET, "/resources", None).await.unwrap_err();
        assert!(matches!(err, ClientError::Network(_)));
    }
}
