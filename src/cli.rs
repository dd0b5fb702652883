//! CLI argument parsing, validation, and startup helpers.

use std::sync::Arc;

use crate::ServerConfig;
use crate::auth::{ClientIpHeader, CredentialVerifier, LogMailer, PasswordError, SessionPolicy};
use crate::db::{Database, UserRole};
use crate::rate_limit::RateLimitSettings;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use url::Url;

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Gradebook",
    about = "Grades, timetable and appointments behind session authentication"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE_PATH", default_value = "gradebook.db")]
    pub database: String,

    /// Externally visible URL, used for password reset links and the cookie Secure flag
    #[arg(long, env = "PUBLIC_URL", default_value = "http://localhost:3000")]
    pub public_url: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Read the client IP from this proxy header instead of the peer address
    #[arg(long, value_enum)]
    pub ip_header: Option<ClientIpHeader>,

    /// Give the user with this email the ADMIN role on startup
    #[arg(long, value_name = "EMAIL")]
    pub grant_admin: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format. `RUST_LOG` overrides the default `info` level.
pub fn init_logging(format: &LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Parse and validate the public URL.
/// Returns None and logs an error if validation fails.
pub fn validate_public_url(public_url: &str) -> Option<Url> {
    let url = match Url::parse(public_url) {
        Ok(url) => url,
        Err(e) => {
            error!(url = %public_url, error = %e, "Invalid public URL");
            return None;
        }
    };

    let is_https = url.scheme() == "https";
    let is_local = matches!(url.host_str(), Some("localhost") | Some("127.0.0.1"));

    if !is_https && !is_local {
        error!("public-url must use HTTPS for non-localhost deployments");
        return None;
    }

    Some(url)
}

/// Handle the --grant-admin flag. Returns false if the grant could not be applied.
pub async fn handle_grant_admin(db: &Database, email: &str) -> bool {
    let user = match db.users().get_by_email(email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            error!(email = %email, "Cannot grant admin: no such user");
            return false;
        }
        Err(e) => {
            error!(error = %e, "Failed to look up user");
            return false;
        }
    };

    if user.role == UserRole::Admin {
        info!(user_id = user.id, "User is already an admin");
        return true;
    }

    match db.users().set_role(user.id, UserRole::Admin).await {
        Ok(_) => {
            // Existing sessions keep their role snapshot until they end
            info!(user_id = user.id, "Granted admin role");
            true
        }
        Err(e) => {
            error!(error = %e, "Failed to grant admin role");
            false
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    db: Database,
    public_url: Url,
    jwt_secret: String,
    ip_header: Option<ClientIpHeader>,
) -> Result<ServerConfig, PasswordError> {
    let secure_cookies = public_url.scheme() == "https";
    let verifier = CredentialVerifier::new(argon2::Params::default())?;

    Ok(ServerConfig {
        db,
        jwt_secret: jwt_secret.into_bytes(),
        public_url,
        secure_cookies,
        session_policy: SessionPolicy::default(),
        rate_limits: RateLimitSettings::default(),
        ip_header,
        verifier,
        mailer: Arc::new(LogMailer),
    })
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
