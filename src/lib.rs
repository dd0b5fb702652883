pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod pages;
pub mod rate_limit;

use api::{AccountState, ApiState, create_api_router};
use auth::{
    ClientIpHeader, CredentialVerifier, PageGuardState, ResetMailer, SessionPolicy,
    add_session_cookies, page_guard,
};
use axum::{Router, middleware};
use db::Database;
use jwt::TokenCodec;
use rate_limit::{RateLimitConfig, RateLimitSettings};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use url::Url;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// JWT secret for signing tokens
    pub jwt_secret: Vec<u8>,
    /// Externally visible base URL, used for links in emails
    pub public_url: Url,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Token and session lifetimes
    pub session_policy: SessionPolicy,
    pub rate_limits: RateLimitSettings,
    /// Proxy header carrying the client IP; `None` uses the peer address
    pub ip_header: Option<ClientIpHeader>,
    pub verifier: CredentialVerifier,
    pub mailer: Arc<dyn ResetMailer>,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let codec = Arc::new(TokenCodec::new(&config.jwt_secret));
    let rate_limit_config = Arc::new(RateLimitConfig::new(config.rate_limits, config.ip_header));

    let api_state = ApiState {
        db: config.db.clone(),
        codec: codec.clone(),
        policy: config.session_policy,
        secure_cookies: config.secure_cookies,
    };

    let account_state = AccountState {
        db: config.db.clone(),
        codec: codec.clone(),
        policy: config.session_policy,
        secure_cookies: config.secure_cookies,
        verifier: config.verifier.clone(),
        mailer: config.mailer.clone(),
        public_url: config.public_url.clone(),
        rate_limit_config,
    };

    let guard_state = PageGuardState {
        db: config.db.clone(),
        codec,
        policy: config.session_policy,
        secure_cookies: config.secure_cookies,
    };

    let api_router = create_api_router(api_state, account_state)
        .layer(middleware::from_fn(add_session_cookies));

    let page_router =
        pages::router().layer(middleware::from_fn_with_state(guard_state, page_guard));

    Router::new()
        .nest("/api", api_router)
        .merge(page_router)
        .layer(TraceLayer::new_for_http())
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Runs the startup cleanup sweep first.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    cleanup::run_cleanup(&config.db).await;
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
