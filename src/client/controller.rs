// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Auth Controller
//!
//! Drives the auth flows against the [`ApiFacade`] and keeps the
//! [`SessionStore`] in step.
//!
//! ## Policies
//!
//! - **Login / registration**: the response must carry a user with an
//!   email and an access token. The pair is written to the token store
//!   before `LoginSuccess` is dispatched. Navigation only follows success.
//! - **Logout**: the server call is best effort. Local state is always
//!   cleared, even when the server cannot be reached.
//! - **Client events**: token refreshes and expired sessions reported by
//!   the HTTP client are applied before and after every API call, so the
//!   session never persists an access token the client already replaced.
//!
//! Only login and registration failures are recorded in the session's
//! `error` field; other operations report failures through their return
//! value and leave the session untouched.

use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, watch};

use super::api::{ApiFacade, ApiResponse};
use super::error::ClientError;
use super::http::{ClientEvent, HttpClient};
use super::session::{Session, SessionAction, SessionStore};
use super::token_store::{FileStore, TokenStore};
use super::transport::{ReqwestTransport, Transport};
use crate::auth::Role;
use crate::config::ClientConfig;
use crate::models::{AuthPayload, Credentials, MessageResponse, ProfileUpdate, RegisterRequest, TokenPair, User};

/// Moves the UI to another path.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

impl<N: Navigator + ?Sized> Navigator for Arc<N> {
    fn navigate(&self, path: &str) {
        (**self).navigate(path)
    }
}

/// Navigator that records visited paths.
#[derive(Debug, Default)]
pub struct History {
    entries: Mutex<Vec<String>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<String> {
        self.entries().last().cloned()
    }

    pub fn visited(&self) -> Vec<String> {
        self.entries().clone()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Navigator for History {
    fn navigate(&self, path: &str) {
        tracing::debug!(path, "Navigating");
        self.entries().push(path.to_string());
    }
}

/// Split a login/registration payload into the user and token pair.
fn session_from_payload(payload: AuthPayload) -> Result<(User, TokenPair), ClientError> {
    let access_token = payload
        .access_token()
        .ok_or_else(|| ClientError::InvalidResponse("response did not include an access token".into()))?
        .to_string();
    let user = payload
        .user
        .filter(|user| !user.email.trim().is_empty())
        .ok_or_else(|| ClientError::InvalidResponse("response did not include a user with an email".into()))?;
    Ok((
        user,
        TokenPair {
            access_token,
            refresh_token: payload.refresh_token.filter(|t| !t.is_empty()),
        },
    ))
}

fn require(value: &str, message: &str) -> Result<(), ClientError> {
    if value.trim().is_empty() {
        Err(ClientError::Validation(message.to_string()))
    } else {
        Ok(())
    }
}

pub struct AuthController<T, N> {
    api: ApiFacade<T>,
    session: SessionStore,
    tokens: TokenStore,
    navigator: N,
    config: Arc<ClientConfig>,
    events: Mutex<broadcast::Receiver<ClientEvent>>,
}

impl<N: Navigator> AuthController<ReqwestTransport, N> {
    /// Build a controller talking to the configured backend. The token
    /// store is file-backed when a session directory is configured.
    pub fn from_config(config: Arc<ClientConfig>, navigator: N) -> Result<Self, ClientError> {
        let tokens = match &config.session_dir {
            Some(dir) => TokenStore::new(FileStore::new(dir)),
            None => TokenStore::in_memory(),
        };
        let transport = ReqwestTransport::new(&config)?;
        let client = HttpClient::new(transport, config, tokens);
        Ok(Self::new(ApiFacade::new(Arc::new(client)), navigator))
    }

    /// Build a controller from the process-wide [`ClientConfig::shared`].
    pub fn from_env(navigator: N) -> Result<Self, ClientError> {
        Self::from_config(ClientConfig::shared(), navigator)
    }
}

impl<T: Transport, N: Navigator> AuthController<T, N> {
    pub fn new(api: ApiFacade<T>, navigator: N) -> Self {
        let client = api.client();
        let tokens = client.tokens().clone();
        let config = Arc::clone(client.config());
        let events = Mutex::new(client.subscribe());
        Self {
            session: SessionStore::new(tokens.clone()),
            api,
            tokens,
            navigator,
            config,
            events,
        }
    }

    pub fn api(&self) -> &ApiFacade<T> {
        &self.api
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    pub fn session(&self) -> Session {
        self.sync_client_events();
        self.session.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    /// Check the persisted session once at startup.
    pub fn restore(&self) -> Session {
        self.drain_stale_events();
        self.session.restore()
    }

    pub async fn login(&self, credentials: Credentials, redirect: Option<&str>) -> ApiResponse<User> {
        self.sync_client_events();
        self.session.dispatch(SessionAction::LoginStart);

        if let Err(e) = require(&credentials.email, "Email is required")
            .and_then(|()| require(&credentials.password, "Password is required"))
        {
            return self.fail_login(e);
        }

        #[cfg(feature = "dev")]
        {
            if let Some(account) = self.dev_account(&credentials) {
                tracing::warn!(email = %account.email, "Signing in with a development bypass account");
                let pair = TokenPair {
                    access_token: format!("dev-{}", uuid::Uuid::new_v4().simple()),
                    refresh_token: None,
                };
                return self.complete_login(account.user.clone(), pair, redirect);
            }
        }

        let response = self.api.login(&credentials).await;
        self.sync_client_events();
        self.finish_login(response, redirect)
    }

    pub async fn register(&self, request: RegisterRequest, redirect: Option<&str>) -> ApiResponse<User> {
        self.sync_client_events();
        self.session.dispatch(SessionAction::LoginStart);

        if let Err(e) = require(&request.name, "Name is required")
            .and_then(|()| require(&request.email, "Email is required"))
            .and_then(|()| require(&request.password, "Password is required"))
        {
            return self.fail_login(e);
        }

        let response = self.api.register(&request).await;
        self.sync_client_events();
        self.finish_login(response, redirect)
    }

    /// Sign out. The server is told when reachable; the local session is
    /// cleared regardless.
    pub async fn logout(&self, redirect: Option<&str>) {
        self.sync_client_events();

        if let ApiResponse::Failure(error) = self.api.logout().await {
            tracing::warn!(%error, "Server logout failed, clearing local session anyway");
        }

        if let Err(e) = self.tokens.clear() {
            tracing::warn!(error = %e, "Failed to clear stored session on logout");
        }
        self.drain_stale_events();
        self.session.dispatch(SessionAction::Logout);
        tracing::info!("Signed out");

        self.navigator
            .navigate(redirect.unwrap_or(&self.config.login_path));
    }

    pub async fn forgot_password(&self, email: &str) -> ApiResponse<MessageResponse> {
        if let Err(e) = require(email, "Email is required") {
            return ApiResponse::Failure(e.user_message());
        }
        let response = self.api.forgot_password(email.trim()).await;
        self.sync_client_events();
        response
    }

    pub async fn reset_password(&self, token: &str, password: &str) -> ApiResponse<MessageResponse> {
        if let Err(e) = require(token, "Reset token is required")
            .and_then(|()| require(password, "Password is required"))
        {
            return ApiResponse::Failure(e.user_message());
        }
        let response = self.api.reset_password(token, password).await;
        self.sync_client_events();
        response
    }

    pub async fn update_profile(&self, update: ProfileUpdate) -> ApiResponse<User> {
        self.sync_client_events();
        let response = self.api.update_profile(&update).await;
        self.sync_client_events();
        if let ApiResponse::Success(user) = &response {
            self.session.dispatch(SessionAction::SetUser { user: user.clone() });
        }
        response
    }

    /// Re-read the profile from the backend, picking up role or permission
    /// changes.
    pub async fn reload_profile(&self) -> ApiResponse<User> {
        self.sync_client_events();
        let response = self.api.get_profile().await;
        self.sync_client_events();
        if let ApiResponse::Success(user) = &response {
            if self.session.snapshot().is_authenticated {
                self.session.dispatch(SessionAction::SetUser { user: user.clone() });
            }
        }
        response
    }

    pub fn clear_error(&self) {
        self.session.dispatch(SessionAction::ClearError);
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.session.snapshot().has_permission(permission)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.session.snapshot().has_role(role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    fn finish_login(&self, response: ApiResponse<AuthPayload>, redirect: Option<&str>) -> ApiResponse<User> {
        let payload = match response {
            ApiResponse::Success(payload) => payload,
            ApiResponse::Failure(error) => {
                tracing::info!(%error, "Sign-in rejected");
                self.session.dispatch(SessionAction::LoginFailure { error: error.clone() });
                return ApiResponse::Failure(error);
            }
        };

        match session_from_payload(payload) {
            Ok((user, pair)) => self.complete_login(user, pair, redirect),
            Err(e) => self.fail_login(e),
        }
    }

    fn complete_login(&self, user: User, pair: TokenPair, redirect: Option<&str>) -> ApiResponse<User> {
        if let Err(e) = self.tokens.save(&pair, &user) {
            tracing::warn!(error = %e, "Failed to persist session after sign-in");
        }
        self.session.dispatch(SessionAction::LoginSuccess {
            user: user.clone(),
            token: pair.access_token,
            refresh_token: pair.refresh_token,
        });
        tracing::info!(user_id = user.id, role = %user.role, "Signed in");

        self.navigator
            .navigate(redirect.unwrap_or(&self.config.default_path));
        ApiResponse::Success(user)
    }

    fn fail_login(&self, error: ClientError) -> ApiResponse<User> {
        let message = error.user_message();
        tracing::info!(error = %error, "Sign-in failed");
        self.session.dispatch(SessionAction::LoginFailure { error: message.clone() });
        ApiResponse::Failure(message)
    }

    #[cfg(feature = "dev")]
    fn dev_account(&self, credentials: &Credentials) -> Option<&crate::config::DevAccount> {
        self.config.dev_accounts.iter().find(|account| {
            account.email.eq_ignore_ascii_case(credentials.email.trim())
                && account.password == credentials.password
        })
    }

    /// Apply session changes the HTTP client made on its own.
    fn sync_client_events(&self) {
        let mut events = self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        loop {
            match events.try_recv() {
                Ok(ClientEvent::TokenRefreshed {
                    access_token,
                    refresh_token,
                }) => {
                    self.session.dispatch(SessionAction::TokenRefreshed {
                        token: access_token,
                        refresh_token,
                    });
                }
                Ok(ClientEvent::SessionExpired) => {
                    tracing::info!("Session expired, signing out");
                    self.session.dispatch(SessionAction::Logout);
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    // Storage is newer than anything still buffered.
                    tracing::warn!(skipped, "Missed client events, resynchronizing from storage");
                    while !matches!(
                        events.try_recv(),
                        Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed)
                    ) {}
                    self.resync_from_storage();
                    break;
                }
                Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed) => break,
            }
        }
    }

    /// Discard pending events that a following dispatch supersedes.
    fn drain_stale_events(&self) {
        let mut events = self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        while !matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed)
        ) {}
    }

    fn resync_from_storage(&self) {
        let session = self.session.snapshot();
        if !session.is_authenticated {
            return;
        }
        match self.tokens.access_token() {
            Some(token) if Some(&token) != session.token.as_ref() => {
                self.session.dispatch(SessionAction::TokenRefreshed {
                    token,
                    refresh_token: self.tokens.refresh_token(),
                });
            }
            Some(_) => {}
            None => {
                self.session.dispatch(SessionAction::Logout);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::client::mock::{bearer, MockTransport};
    use crate::client::session::SessionStatus;
    use crate::client::token_store::{AUTH_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_DATA_KEY};
    use crate::client::transport::HttpResponse;

    const LOGIN_BODY: &str = r#"{"user":{"id":1,"email":"a@test.com","role":"user","permissions":["read"]},"token":"T1","refreshToken":"R1"}"#;

    type TestController = AuthController<MockTransport, Arc<History>>;

    fn controller(transport: MockTransport) -> (TestController, Arc<History>) {
        controller_with_config(transport, ClientConfig::default())
    }

    fn controller_with_config(
        transport: MockTransport,
        config: ClientConfig,
    ) -> (TestController, Arc<History>) {
        let client = HttpClient::new(transport, Arc::new(config), TokenStore::in_memory());
        let history = Arc::new(History::new());
        let controller = AuthController::new(ApiFacade::new(Arc::new(client)), Arc::clone(&history));
        controller.restore();
        (controller, history)
    }

    fn backend() -> MockTransport {
        MockTransport::new(|req| match req.url.path() {
            "/api/auth/login" => {
                let body = req.body.clone().unwrap_or_default();
                if body["password"] == "secret1" {
                    Ok(HttpResponse::new(200, LOGIN_BODY))
                } else {
                    Ok(HttpResponse::new(401, r#"{"error":"Invalid email or password"}"#))
                }
            }
            "/api/auth/register" => Ok(HttpResponse::new(201, LOGIN_BODY)),
            "/api/auth/logout" => Ok(HttpResponse::new(200, r#"{"message":"Logged out"}"#)),
            "/api/auth/refresh" => Ok(HttpResponse::new(200, r#"{"token":"T2","refreshToken":"R2"}"#)),
            "/api/auth/forgot-password" => Ok(HttpResponse::new(200, r#"{"message":"sent"}"#)),
            "/api/users/profile" if bearer(req) == Some("T1") => {
                Ok(HttpResponse::new(401, r#"{"error":"Token expired"}"#))
            }
            "/api/users/profile" => Ok(HttpResponse::new(
                200,
                r#"{"id":1,"name":"Ada L.","email":"a@test.com","role":"user","permissions":["read","upload"]}"#,
            )),
            _ => Ok(HttpResponse::new(404, r#"{"error":"Not found"}"#)),
        })
    }

    #[tokio::test]
    async fn login_scenario_populates_session_and_store() {
        let (controller, history) = controller(backend());

        let response = controller
            .login(Credentials::new("a@test.com", "secret1"), Some("/resources"))
            .await;
        assert!(response.is_success());

        let session = controller.session();
        assert!(session.is_authenticated);
        assert_eq!(session.role, Some(Role::User));
        assert_eq!(session.permissions, BTreeSet::from(["read".to_string()]));
        assert_eq!(session.token.as_deref(), Some("T1"));

        let tokens = controller.api().client().tokens();
        assert_eq!(tokens.raw(AUTH_TOKEN_KEY).as_deref(), Some("T1"));
        assert_eq!(tokens.raw(REFRESH_TOKEN_KEY).as_deref(), Some("R1"));
        let stored: User = serde_json::from_str(&tokens.raw(USER_DATA_KEY).unwrap()).unwrap();
        assert_eq!(stored.email, "a@test.com");

        assert_eq!(history.current().as_deref(), Some("/resources"));
    }

    #[tokio::test]
    async fn bad_credentials_fail_without_refresh_or_navigation() {
        let (controller, history) = controller(backend());

        let response = controller
            .login(Credentials::new("a@test.com", "wrong"), Some("/resources"))
            .await;
        assert_eq!(response.error(), Some("Invalid email or password"));

        let session = controller.session();
        assert_eq!(session.status(), SessionStatus::Unauthenticated);
        assert_eq!(session.error.as_deref(), Some("Invalid email or password"));
        assert_eq!(controller.api().client().transport().count("/auth/refresh"), 0);
        assert!(history.visited().is_empty());
    }

    #[tokio::test]
    async fn response_without_email_is_invalid() {
        let (controller, _) = controller(MockTransport::new(|_| {
            Ok(HttpResponse::new(200, r#"{"user":{"id":1},"token":"T1"}"#))
        }));

        let response = controller.login(Credentials::new("a@test.com", "secret1"), None).await;
        assert!(response.error().unwrap().contains("email"));
        assert!(!controller.session().is_authenticated);
        assert!(controller.api().client().tokens().load().is_none());
    }

    #[tokio::test]
    async fn response_without_token_is_invalid() {
        let (controller, _) = controller(MockTransport::new(|_| {
            Ok(HttpResponse::new(200, r#"{"user":{"id":1,"email":"a@test.com"}}"#))
        }));

        let response = controller.login(Credentials::new("a@test.com", "secret1"), None).await;
        assert!(!response.is_success());
        assert!(!controller.session().is_authenticated);
    }

    #[test]
    fn from_env_uses_the_shared_config() {
        let controller = AuthController::from_env(Arc::new(History::new())).unwrap();
        assert!(Arc::ptr_eq(controller.api().client().config(), &ClientConfig::shared()));
    }

    #[tokio::test]
    async fn lagged_events_resync_token_from_storage() {
        let (controller, _) = controller(backend());
        controller.login(Credentials::new("a@test.com", "secret1"), None).await;

        let client = controller.api().client();
        client.tokens().set_access_token("T9").unwrap();
        for i in 0..40 {
            client.publish(ClientEvent::TokenRefreshed {
                access_token: format!("X{i}"),
                refresh_token: None,
            });
        }

        let session = controller.session();
        assert!(session.is_authenticated);
        assert_eq!(session.token.as_deref(), Some("T9"));
        assert_eq!(session.refresh_token.as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn lagged_events_with_empty_storage_sign_out() {
        let (controller, _) = controller(backend());
        controller.login(Credentials::new("a@test.com", "secret1"), None).await;

        let client = controller.api().client();
        client.tokens().clear().unwrap();
        for _ in 0..40 {
            client.publish(ClientEvent::TokenRefreshed {
                access_token: "X".into(),
                refresh_token: None,
            });
        }

        assert_eq!(controller.session().status(), SessionStatus::Unauthenticated);
    }

    #[tokio::test]
    async fn empty_credentials_never_reach_the_server() {
        let (controller, _) = controller(backend());
        let response = controller.login(Credentials::new(" ", "secret1"), None).await;
        assert_eq!(response.error(), Some("Email is required"));
        assert!(controller.api().client().transport().requests().is_empty());
    }

    #[tokio::test]
    async fn register_signs_in_and_defaults_navigation() {
        let (controller, history) = controller(backend());
        let response = controller
            .register(
                RegisterRequest {
                    name: "Ada".into(),
                    email: "a@test.com".into(),
                    password: "secret1".into(),
                },
                None,
            )
            .await;
        assert!(response.is_success());
        assert!(controller.session().is_authenticated);
        assert_eq!(history.current().as_deref(), Some("/dashboard"));
    }

    #[tokio::test]
    async fn logout_clears_locally_when_server_is_unreachable() {
        let transport = MockTransport::new(|req| match req.url.path() {
            "/api/auth/login" => Ok(HttpResponse::new(200, LOGIN_BODY)),
            _ => Err(ClientError::Network("connection refused".into())),
        });
        let (controller, history) = controller(transport);
        controller.login(Credentials::new("a@test.com", "secret1"), None).await;

        controller.logout(None).await;

        assert_eq!(controller.session(), Session::signed_out());
        assert!(controller.api().client().tokens().load().is_none());
        assert!(controller.api().client().tokens().refresh_token().is_none());
        assert_eq!(history.current().as_deref(), Some("/login"));
        assert_eq!(controller.api().client().transport().count("/auth/logout"), 1);
    }

    #[tokio::test]
    async fn refreshed_token_reaches_the_session() {
        let (controller, _) = controller(backend());
        controller.login(Credentials::new("a@test.com", "secret1"), None).await;

        let response = controller
            .update_profile(ProfileUpdate {
                name: Some("Ada L.".into()),
                avatar: None,
            })
            .await;
        assert_eq!(response.data().unwrap().name, "Ada L.");

        let session = controller.session();
        assert_eq!(session.token.as_deref(), Some("T2"));
        assert_eq!(session.refresh_token.as_deref(), Some("R2"));
        assert!(session.has_permission("upload"));

        let tokens = controller.api().client().tokens();
        assert_eq!(tokens.access_token().as_deref(), Some("T2"));
        assert_eq!(tokens.refresh_token().as_deref(), Some("R2"));
    }

    #[tokio::test]
    async fn expired_session_signs_out() {
        let transport = MockTransport::new(|req| match req.url.path() {
            "/api/auth/login" => Ok(HttpResponse::new(200, LOGIN_BODY)),
            _ => Ok(HttpResponse::new(401, r#"{"error":"Token expired"}"#)),
        });
        let (controller, _) = controller(transport);
        controller.login(Credentials::new("a@test.com", "secret1"), None).await;

        let response = controller.reload_profile().await;
        assert_eq!(response.error(), Some("Token expired"));
        assert_eq!(controller.session().status(), SessionStatus::Unauthenticated);
        assert!(controller.api().client().tokens().load().is_none());
    }

    #[tokio::test]
    async fn forgot_password_does_not_touch_session() {
        let (controller, _) = controller(backend());
        let response = controller.forgot_password("a@test.com").await;
        assert!(response.is_success());

        let response = controller.forgot_password("").await;
        assert_eq!(response.error(), Some("Email is required"));
        assert!(controller.session().error.is_none());
    }

    #[tokio::test]
    async fn role_queries_read_the_session() {
        let (controller, _) = controller(backend());
        assert!(!controller.has_permission("read"));

        controller.login(Credentials::new("a@test.com", "secret1"), None).await;
        let requests_before = controller.api().client().transport().requests().len();

        assert!(controller.has_permission("read"));
        assert!(!controller.has_permission("manage_users"));
        assert!(controller.has_role(Role::User));
        assert!(!controller.is_admin());
        assert_eq!(controller.api().client().transport().requests().len(), requests_before);
    }

    #[tokio::test]
    async fn restore_picks_up_previous_session() {
        let tokens = TokenStore::in_memory();
        let user: User = serde_json::from_str(r#"{"id":1,"email":"a@test.com","role":"admin"}"#).unwrap();
        tokens
            .save(
                &TokenPair {
                    access_token: "T1".into(),
                    refresh_token: None,
                },
                &user,
            )
            .unwrap();

        let client = HttpClient::new(backend(), Arc::new(ClientConfig::default()), tokens);
        let controller = AuthController::new(ApiFacade::new(Arc::new(client)), History::new());
        assert_eq!(controller.session().status(), SessionStatus::Loading);

        let session = controller.restore();
        assert_eq!(session.status(), SessionStatus::Authenticated);
        assert!(controller.is_admin());
    }

    #[cfg(feature = "dev")]
    #[tokio::test]
    async fn dev_account_signs_in_without_network() {
        let user: User =
            serde_json::from_str(r#"{"id":99,"email":"dev@local","role":"admin","permissions":["manage_users"]}"#)
                .unwrap();
        let config = ClientConfig::default().with_dev_account(crate::config::DevAccount {
            email: "dev@local".into(),
            password: "dev".into(),
            user,
        });
        let (controller, _) = controller_with_config(backend(), config);

        let response = controller.login(Credentials::new("DEV@local", "dev"), None).await;
        assert!(response.is_success());
        assert!(controller.is_admin());
        assert!(controller.api().client().transport().requests().is_empty());
    }
}
