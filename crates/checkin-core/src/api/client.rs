//! JSON client for the check-in REST API.
//!
//! Every request goes through the [`RequestGate`]: public endpoints are sent
//! as-is, everything else waits for a valid (possibly refreshed) session and
//! carries its access token. The endpoints' business semantics (events,
//! tickets, news) live with the callers; this client only moves JSON.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::{Client, Method, Response};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{endpoints, ApiError, RequestGate};
use crate::auth::SessionState;
use crate::config::Config;
use crate::models::UserProfile;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// A request before it passes the gate.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<Value>,
    public: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            public: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to encode body for {}: {}", self.path, e)))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Send without a bearer token even if the path is not on the public list.
    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Check if response is successful, returning an error with body if not.
pub(crate) async fn check_response(response: Response) -> Result<Response, ApiError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body))
    }
}

/// API client for the check-in backend.
/// Clone is cheap - reqwest::Client and the gate are both behind Arcs.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    gate: Arc<RequestGate>,
    session: Arc<SessionState>,
    initial_backoff: Duration,
}

impl ApiClient {
    pub fn new(config: &Config, gate: Arc<RequestGate>, session: Arc<SessionState>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self::with_client(client, &config.api_base_url, gate, session))
    }

    /// Build on an existing client, sharing its connection pool.
    pub fn with_client(
        client: Client,
        base_url: &str,
        gate: Arc<RequestGate>,
        session: Arc<SessionState>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            gate,
            session,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }

    /// First delay before retrying a rate-limited request; doubles per retry.
    pub fn with_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    /// Send a request and parse its JSON response.
    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let path = request.path.clone();
        let response = self.execute(request).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", path, e)))
    }

    /// Send a request whose response body is not needed.
    pub async fn send_empty(&self, request: ApiRequest) -> Result<(), ApiError> {
        self.execute(request).await.map(|_| ())
    }

    async fn execute(&self, request: ApiRequest) -> Result<Response, ApiError> {
        let url = endpoints::join(&self.base_url, &request.path);

        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            // Every attempt passes the gate; the session may have changed during a backoff
            let authorization = self.gate.authorize(&request.path, request.public).await?;

            let mut builder = self.client.request(request.method.clone(), &url);
            if let Some(token) = authorization.bearer() {
                builder = builder.bearer_auth(token);
            }
            if let Some(ref body) = request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await.map_err(|e| {
                debug!(url = %url, error = %e, "Request failed before a response arrived");
                ApiError::from(e)
            })?;

            let status = response.status().as_u16();
            self.gate.observe(&authorization, status);

            if status == 429 {
                retries += 1;
                if retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(ApiError::RateLimited);
                }
                warn!(url = %url, retry = retries, backoff_ms = backoff.as_millis() as u64, "Rate limited, backing off");
                tokio::time::sleep(backoff).await;
                backoff *= 2; // Exponential backoff
                continue;
            }

            return check_response(response).await;
        }
    }

    // ===== Convenience methods =====

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.send(ApiRequest::post(path).json(body)?).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.send(ApiRequest::patch(path).json(body)?).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send_empty(ApiRequest::delete(path)).await
    }

    // ===== Account endpoints =====

    /// Start the password reset flow (public endpoint)
    pub async fn request_password_reset(&self, email: &str) -> Result<(), ApiError> {
        let request = ApiRequest::post(endpoints::PASSWORD_FORGOT)
            .json(&serde_json::json!({ "email": email }))?;
        self.send_empty(request).await
    }

    /// Finish the password reset flow with the emailed token (public endpoint)
    pub async fn complete_password_reset(&self, token: &str, new_password: &str) -> Result<(), ApiError> {
        let request = ApiRequest::post(endpoints::PASSWORD_RESET)
            .json(&serde_json::json!({ "token": token, "password": new_password }))?;
        self.send_empty(request).await
    }

    /// Push profile edits to the server, then merge the server's copy locally.
    pub async fn update_profile(&self, partial: Map<String, Value>) -> Result<UserProfile, ApiError> {
        let updated: UserProfile = self.patch(endpoints::PROFILE, &partial).await?;
        self.session.update_user_fields(updated.fields().clone());
        self.session.current_user().ok_or(ApiError::NotAuthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::MemorySessionStore;
    use crate::auth::RefreshCoordinator;
    use crate::test_support::{grant, MockTransport, StubServer};
    use chrono::Duration as ChronoDuration;

    fn client_without_session() -> (ApiClient, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let state = Arc::new(SessionState::new(Arc::new(MemorySessionStore::new()), transport.clone()));
        let coordinator = Arc::new(RefreshCoordinator::new(
            state.clone(),
            transport.clone(),
            ChronoDuration::minutes(5),
        ));
        let gate = Arc::new(RequestGate::new(state.clone(), coordinator, ChronoDuration::minutes(2)));
        // Discard port: any request that actually leaves would fail with a network error
        let client = ApiClient::with_client(Client::new(), "http://127.0.0.1:9", gate, state);
        (client, transport)
    }

    /// Client against a stub server, signed in with access token `a1`.
    fn signed_in_client(server: &StubServer, backoff: Duration) -> (ApiClient, Arc<SessionState>) {
        let transport = Arc::new(MockTransport::new());
        let state = Arc::new(SessionState::new(Arc::new(MemorySessionStore::new()), transport.clone()));
        state.apply_login_result(grant("a1", 3600, 86400));
        let coordinator = Arc::new(RefreshCoordinator::new(
            state.clone(),
            transport,
            ChronoDuration::minutes(5),
        ));
        let gate = Arc::new(RequestGate::new(state.clone(), coordinator, ChronoDuration::minutes(2)));
        let client = ApiClient::with_client(Client::new(), server.base_url(), gate, state.clone())
            .with_backoff(backoff);
        (client, state)
    }

    #[tokio::test]
    async fn test_unauthorized_response_ends_session() {
        let server = StubServer::start(&[(401, r#"{"code":"token_invalid"}"#)]).await;
        let (client, state) = signed_in_client(&server, Duration::from_millis(10));

        let err = client.get::<Value>("/events").await.unwrap_err();
        match err {
            ApiError::Unauthorized(body) => assert_eq!(body.code.as_deref(), Some("token_invalid")),
            other => panic!("expected Unauthorized, got {:?}", other),
        }
        assert!(!state.is_authenticated());

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].path, "/events");
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer a1"));
    }

    #[tokio::test]
    async fn test_rate_limited_request_is_retried() {
        let server = StubServer::start(&[
            (429, r#"{"message":"slow down"}"#),
            (200, r#"{"events":[{"id":"e1"}]}"#),
        ])
        .await;
        let (client, state) = signed_in_client(&server, Duration::from_millis(10));

        let body: Value = client.get("/events").await.unwrap();
        assert_eq!(body["events"][0]["id"], "e1");
        assert!(state.is_authenticated());

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests
            .iter()
            .all(|r| r.authorization.as_deref() == Some("Bearer a1")));
    }

    #[tokio::test]
    async fn test_rate_limit_gives_up_after_max_retries() {
        let server = StubServer::start(&[(429, "")]).await;
        let (client, _) = signed_in_client(&server, Duration::from_millis(1));

        let err = client.get::<Value>("/events").await.unwrap_err();
        assert!(matches!(err, ApiError::RateLimited));
        assert_eq!(server.request_count(), MAX_RATE_LIMIT_RETRIES as usize + 1);
    }

    #[tokio::test]
    async fn test_logout_during_backoff_stops_retry() {
        let server = StubServer::start(&[(429, ""), (200, "{}")]).await;
        let (client, state) = signed_in_client(&server, Duration::from_millis(500));

        let pending = tokio::spawn({
            let client = client.clone();
            async move { client.get::<Value>("/events").await }
        });
        server.wait_for_requests(1).await;
        state.clear();

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, ApiError::NotAuthenticated));
        assert_eq!(server.request_count(), 1);
    }

    #[tokio::test]
    async fn test_retry_carries_token_of_new_session() {
        let server = StubServer::start(&[(429, ""), (200, "{}")]).await;
        let (client, state) = signed_in_client(&server, Duration::from_millis(500));

        let pending = tokio::spawn({
            let client = client.clone();
            async move { client.get::<Value>("/events").await }
        });
        server.wait_for_requests(1).await;
        state.apply_login_result(grant("a2", 3600, 86400));

        pending.await.unwrap().unwrap();
        let requests = server.requests();
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer a1"));
        assert_eq!(requests[1].authorization.as_deref(), Some("Bearer a2"));
    }

    #[tokio::test]
    async fn test_public_request_sent_without_bearer() {
        let server = StubServer::start(&[(200, "{}")]).await;
        let (client, state) = signed_in_client(&server, Duration::from_millis(10));

        client.request_password_reset("a@example.com").await.unwrap();
        let requests = server.requests();
        assert_eq!(requests[0].path, "/auth/password/forgot");
        assert_eq!(requests[0].authorization, None);
        assert_eq!(requests[0].json()["email"], "a@example.com");
        assert!(state.is_authenticated());
    }

    #[tokio::test]
    async fn test_private_call_aborts_before_network() {
        let (client, transport) = client_without_session();
        let err = client.get::<Value>("/events").await.unwrap_err();
        assert!(matches!(err, ApiError::NotAuthenticated));
        assert_eq!(transport.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_update_profile_requires_session() {
        let (client, _) = client_without_session();
        let err = client.update_profile(Map::new()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotAuthenticated));
    }

    #[test]
    fn test_request_builder() {
        let request = ApiRequest::post("/tickets/scan")
            .json(&serde_json::json!({"code": "T-1"}))
            .unwrap()
            .public();
        assert_eq!(request.path(), "/tickets/scan");
        assert_eq!(request.method, Method::POST);
        assert!(request.public);
        assert_eq!(request.body, Some(serde_json::json!({"code": "T-1"})));
    }
}
