//! Session token minting and verification.
//!
//! Two token kinds share one HS256 key: a short-lived access token that names the
//! session record, and a refresh token that additionally carries the `jti` the
//! record currently accepts. Expiry is checked against the caller's clock so the
//! resolver can be driven with simulated time.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::db::UserRole;

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims of an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Session ID
    pub sid: String,
    /// Subject (user ID)
    pub sub: i64,
    /// Role at issuance. Informational only; the session record is authoritative.
    pub role: UserRole,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
}

/// Claims of a refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Session ID
    pub sid: String,
    /// Refresh token ID, must match the session record's current `refresh_jti`
    pub jti: String,
    /// Subject (user ID)
    pub sub: i64,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
}

/// Only the session ID. The signature is checked, expiry is ignored.
#[derive(Deserialize)]
struct SessionIdClaim {
    sid: String,
}

/// Signs and verifies session tokens.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenCodec {
    /// Create a codec with the given secret.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    pub fn issue_access(
        &self,
        session_id: &str,
        user_id: i64,
        role: UserRole,
        now: i64,
        exp: i64,
    ) -> Result<String, JwtError> {
        let claims = AccessClaims {
            sid: session_id.to_string(),
            sub: user_id,
            role,
            token_type: TokenType::Access,
            iat: now,
            exp,
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)
    }

    pub fn issue_refresh(
        &self,
        session_id: &str,
        jti: &str,
        user_id: i64,
        now: i64,
        exp: i64,
    ) -> Result<String, JwtError> {
        let claims = RefreshClaims {
            sid: session_id.to_string(),
            jti: jti.to_string(),
            sub: user_id,
            token_type: TokenType::Refresh,
            iat: now,
            exp,
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)
    }

    /// Verify an access token. A token is expired once `now >= exp`.
    pub fn verify_access(&self, token: &str, now: i64) -> Result<AccessClaims, JwtError> {
        let claims: AccessClaims = self.decode(token)?;
        if claims.token_type != TokenType::Access {
            return Err(JwtError::WrongTokenType);
        }
        if claims.exp <= now {
            return Err(JwtError::Expired);
        }
        Ok(claims)
    }

    /// Verify a refresh token. A token is expired once `now >= exp`.
    pub fn verify_refresh(&self, token: &str, now: i64) -> Result<RefreshClaims, JwtError> {
        let claims: RefreshClaims = self.decode(token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(JwtError::WrongTokenType);
        }
        if claims.exp <= now {
            return Err(JwtError::Expired);
        }
        Ok(claims)
    }

    /// Read the session ID of a token whose signature is valid, ignoring expiry.
    /// Logout uses this so that a stale cookie still deletes its record.
    pub fn peek_session_id(&self, token: &str) -> Option<String> {
        self.decode::<SessionIdClaim>(token).ok().map(|c| c.sid)
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, token: &str) -> Result<T, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;

        jsonwebtoken::decode::<T>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(JwtError::Decoding)
    }
}

/// Current Unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Bad signature or malformed token
    Decoding(jsonwebtoken::errors::Error),
    Expired,
    /// Wrong token type (e.g., using refresh token as access token)
    WrongTokenType,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Decoding(e) => write!(f, "Failed to decode token: {}", e),
            JwtError::Expired => write!(f, "Token expired"),
            JwtError::WrongTokenType => write!(f, "Wrong token type"),
        }
    }
}

impl std::error::Error for JwtError {}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn codec() -> TokenCodec {
        TokenCodec::new(b"test-secret-key-for-testing")
    }

    #[test]
    fn test_issue_and_verify_access_token() {
        let codec = codec();
        let token = codec
            .issue_access("sid-1", 42, UserRole::Editor, NOW, NOW + 3600)
            .unwrap();

        let claims = codec.verify_access(&token, NOW).unwrap();
        assert_eq!(claims.sid, "sid-1");
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.role, UserRole::Editor);
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.exp, NOW + 3600);
    }

    #[test]
    fn test_issue_and_verify_refresh_token() {
        let codec = codec();
        let token = codec
            .issue_refresh("sid-1", "jti-1", 42, NOW, NOW + 60)
            .unwrap();

        let claims = codec.verify_refresh(&token, NOW).unwrap();
        assert_eq!(claims.sid, "sid-1");
        assert_eq!(claims.jti, "jti-1");
        assert_eq!(claims.sub, 42);
    }

    #[test]
    fn test_wrong_token_type_rejected() {
        let codec = codec();
        let access = codec
            .issue_access("sid", 1, UserRole::User, NOW, NOW + 60)
            .unwrap();
        let refresh = codec.issue_refresh("sid", "jti", 1, NOW, NOW + 60).unwrap();

        assert!(codec.verify_refresh(&access, NOW).is_err());
        assert!(codec.verify_access(&refresh, NOW).is_err());
    }

    #[test]
    fn test_expiry_uses_supplied_clock() {
        let codec = codec();
        let token = codec
            .issue_access("sid", 1, UserRole::User, NOW, NOW + 60)
            .unwrap();

        assert!(codec.verify_access(&token, NOW + 59).is_ok());
        assert!(matches!(
            codec.verify_access(&token, NOW + 60),
            Err(JwtError::Expired)
        ));
    }

    #[test]
    fn test_invalid_token() {
        assert!(codec().verify_access("invalid-token", NOW).is_err());
        assert_eq!(codec().peek_session_id("invalid-token"), None);
    }

    #[test]
    fn test_wrong_secret() {
        let other = TokenCodec::new(b"another-secret");
        let token = other
            .issue_access("sid", 1, UserRole::User, NOW, NOW + 60)
            .unwrap();

        assert!(codec().verify_access(&token, NOW).is_err());
        assert_eq!(codec().peek_session_id(&token), None);
    }

    #[test]
    fn test_peek_ignores_expiry() {
        let codec = codec();
        let token = codec.issue_refresh("sid-9", "jti", 1, NOW, NOW + 1).unwrap();

        assert!(codec.verify_refresh(&token, NOW + 100).is_err());
        assert_eq!(codec.peek_session_id(&token).as_deref(), Some("sid-9"));
    }
}
