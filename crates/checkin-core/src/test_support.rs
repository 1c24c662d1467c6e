//! Scriptable transport and fixtures shared by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::api::{ApiError, AuthTransport};
use crate::models::{Credentials, TokenGrant, UserProfile};

/// Grant whose refresh token is `refresh-<access>`.
pub fn grant(access: &str, expires_in: i64, refresh_expires_in: i64) -> TokenGrant {
    TokenGrant {
        access_token: access.to_string(),
        refresh_token: format!("refresh-{}", access),
        expires_in,
        refresh_expires_in,
        user: None,
    }
}

pub fn grant_with_user(
    access: &str,
    expires_in: i64,
    refresh_expires_in: i64,
    user: UserProfile,
) -> TokenGrant {
    TokenGrant {
        user: Some(user),
        ..grant(access, expires_in, refresh_expires_in)
    }
}

pub fn user(id: &str, role: &str) -> UserProfile {
    serde_json::from_value(json!({
        "id": id,
        "email": format!("{}@example.com", id),
        "role": role,
        "status": "active",
    }))
    .expect("Failed to build test profile")
}

#[derive(Clone)]
pub enum MockReply {
    Grant(TokenGrant),
    /// HTTP status with a raw response body
    Status(u16, String),
    Network,
}

impl MockReply {
    fn into_result(self) -> Result<TokenGrant, ApiError> {
        match self {
            MockReply::Grant(grant) => Ok(grant),
            MockReply::Status(status, body) => Err(ApiError::from_status(
                StatusCode::from_u16(status).expect("invalid test status"),
                &body,
            )),
            MockReply::Network => Err(ApiError::NetworkError("connection refused".to_string())),
        }
    }
}

#[derive(Clone)]
pub enum LogoutBehavior {
    Succeed,
    Fail,
    Hang,
}

pub struct MockTransport {
    bearer: Mutex<Option<String>>,
    login_reply: Mutex<MockReply>,
    refresh_reply: Mutex<MockReply>,
    refresh_delay: Mutex<Duration>,
    logout_behavior: Mutex<LogoutBehavior>,
    last_refresh_token: Mutex<Option<String>>,
    login_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    logout_calls: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            bearer: Mutex::new(None),
            login_reply: Mutex::new(MockReply::Network),
            refresh_reply: Mutex::new(MockReply::Network),
            refresh_delay: Mutex::new(Duration::ZERO),
            logout_behavior: Mutex::new(LogoutBehavior::Succeed),
            last_refresh_token: Mutex::new(None),
            login_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_login_reply(&self, reply: MockReply) {
        *self.login_reply.lock().unwrap() = reply;
    }

    pub fn set_refresh_reply(&self, reply: MockReply) {
        *self.refresh_reply.lock().unwrap() = reply;
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = delay;
    }

    pub fn set_logout_behavior(&self, behavior: LogoutBehavior) {
        *self.logout_behavior.lock().unwrap() = behavior;
    }

    pub fn bearer(&self) -> Option<String> {
        self.bearer.lock().unwrap().clone()
    }

    pub fn last_refresh_token(&self) -> Option<String> {
        self.last_refresh_token.lock().unwrap().clone()
    }

    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthTransport for MockTransport {
    fn set_bearer(&self, token: Option<&str>) {
        *self.bearer.lock().unwrap() = token.map(str::to_string);
    }

    async fn login(&self, _credentials: &Credentials) -> Result<TokenGrant, ApiError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.login_reply.lock().unwrap().clone();
        reply.into_result()
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ApiError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_refresh_token.lock().unwrap() = Some(refresh_token.to_string());
        let delay = *self.refresh_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let reply = self.refresh_reply.lock().unwrap().clone();
        reply.into_result()
    }

    async fn logout(&self) -> Result<(), ApiError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.logout_behavior.lock().unwrap().clone();
        match behavior {
            LogoutBehavior::Succeed => Ok(()),
            LogoutBehavior::Fail => Err(ApiError::ServerError {
                status: 500,
                message: "logout failed".to_string(),
            }),
            LogoutBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }
}

/// A request as the stub server received it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body is not JSON")
    }
}

/// Minimal HTTP/1.1 server on a loopback port.
///
/// Answers with the scripted replies in order and repeats the last one once
/// the script runs out. Every connection is closed after one response.
pub struct StubServer {
    base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubServer {
    pub async fn start(replies: &[(u16, &str)]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind stub server");
        let addr = listener.local_addr().expect("stub server has no address");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let mut script: VecDeque<(u16, String)> = replies
            .iter()
            .map(|(status, body)| (*status, body.to_string()))
            .collect();

        let recorded = requests.clone();
        tokio::spawn(async move {
            let mut last = (200, "{}".to_string());
            while let Ok((mut stream, _)) = listener.accept().await {
                let Some(request) = read_request(&mut stream).await else {
                    continue;
                };
                recorded.lock().unwrap().push(request);
                if let Some(next) = script.pop_front() {
                    last = next;
                }
                let (status, body) = &last;
                let response = format!(
                    "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            requests,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Wait until at least `count` requests have arrived.
    pub async fn wait_for_requests(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.request_count() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("stub server never saw the expected requests");
    }
}

async fn read_request(stream: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();

    let mut content_length = 0;
    let mut authorization = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse().unwrap_or(0);
        } else if name.eq_ignore_ascii_case("authorization") {
            authorization = Some(value.to_string());
        }
    }

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let end = buf.len().min(header_end + content_length);
    let body = String::from_utf8_lossy(&buf[header_end..end]).to_string();

    Some(RecordedRequest {
        method,
        path,
        authorization,
        body,
    })
}
