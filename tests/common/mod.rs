#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use gradebook::{
    ServerConfig,
    auth::{
        ClientIpHeader, CredentialVerifier, MailError, ResetEmail, ResetMailer, SessionPolicy,
    },
    create_app,
    db::Database,
    jwt::TokenCodec,
    rate_limit::RateLimitSettings,
};
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;

pub const TEST_IP: &str = "127.0.0.1";
pub const TEST_SECRET: &[u8] = b"test-jwt-secret-that-is-at-least-32-bytes";
pub const TEST_PASSWORD: &str = "password123";

/// Mailer that keeps every message for inspection.
#[derive(Default)]
pub struct CapturingMailer {
    pub sent: Mutex<Vec<ResetEmail>>,
}

impl CapturingMailer {
    pub fn last_token(&self) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        let link = Url::parse(&sent.last()?.link).ok()?;
        link.query_pairs()
            .find(|(k, _)| k == "token")
            .map(|(_, v)| v.into_owned())
    }
}

impl ResetMailer for CapturingMailer {
    fn send(&self, message: &ResetEmail) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub codec: TokenCodec,
    pub mailer: Arc<CapturingMailer>,
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }
}

pub async fn test_app() -> TestApp {
    test_app_with(SessionPolicy::default(), RateLimitSettings::relaxed()).await
}

/// Create a test app with custom lifetimes and rate limits.
pub async fn test_app_with(policy: SessionPolicy, rate_limits: RateLimitSettings) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let mailer = Arc::new(CapturingMailer::default());
    // Minimal Argon2 cost keeps the suite fast
    let params = argon2::Params::new(8, 1, 1, None).unwrap();
    let config = ServerConfig {
        db: db.clone(),
        jwt_secret: TEST_SECRET.to_vec(),
        public_url: Url::parse("http://localhost:3000").unwrap(),
        secure_cookies: false,
        session_policy: policy,
        rate_limits,
        ip_header: Some(ClientIpHeader::XForwardedFor),
        verifier: CredentialVerifier::new(params).unwrap(),
        mailer: mailer.clone(),
    };
    TestApp {
        app: create_app(&config),
        db,
        codec: TokenCodec::new(TEST_SECRET),
        mailer,
    }
}

/// Build a request with an optional JSON body and cookie header.
pub fn request(method: &str, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", TEST_IP);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    request("GET", uri, cookie, None)
}

pub async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(Value::Null)
}

pub async fn body_text(response: Response<Body>) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8_lossy(&body).into_owned()
}

/// Extract Set-Cookie headers from response
pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Value of a non-clearing Set-Cookie for `name`.
pub fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    cookies
        .iter()
        .filter(|c| !c.contains("Max-Age=0"))
        .find_map(|c| c.strip_prefix(&format!("{}=", name)))
        .and_then(|rest| rest.split(';').next())
        .map(|v| v.to_string())
}

/// Check if cookies contain a token being cleared (Max-Age=0)
pub fn has_cleared_cookie(cookies: &[String], name: &str) -> bool {
    cookies
        .iter()
        .any(|c| c.starts_with(&format!("{}=;", name)) && c.contains("Max-Age=0"))
}

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Session cookies held by a test client.
#[derive(Clone, Debug)]
pub struct Cookies {
    pub access: String,
    pub refresh: String,
}

impl Cookies {
    pub fn header(&self) -> String {
        format!("access_token={}; refresh_token={}", self.access, self.refresh)
    }

    pub fn refresh_only(&self) -> String {
        format!("refresh_token={}", self.refresh)
    }

    pub fn from_response(response: &Response<Body>) -> Option<Self> {
        let cookies = set_cookies(response);
        Some(Self {
            access: cookie_value(&cookies, "access_token")?,
            refresh: cookie_value(&cookies, "refresh_token")?,
        })
    }
}

pub async fn register(app: &TestApp, email: &str, password: &str) -> Response<Body> {
    app.send(request(
        "POST",
        "/api/register",
        None,
        Some(json!({ "name": "Test User", "email": email, "password": password })),
    ))
    .await
}

pub async fn login(app: &TestApp, email: &str, password: &str, remember_me: bool) -> Response<Body> {
    app.send(request(
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": email, "password": password, "rememberMe": remember_me })),
    ))
    .await
}

/// Register a user and log in, returning the session cookies.
pub async fn register_and_login(app: &TestApp, email: &str) -> Cookies {
    let response = register(app, email, TEST_PASSWORD).await;
    assert_eq!(response.status(), 201, "registration failed");
    let response = login(app, email, TEST_PASSWORD, false).await;
    assert_eq!(response.status(), 200, "login failed");
    Cookies::from_response(&response).expect("login did not set both cookies")
}
