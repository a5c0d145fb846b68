//! Token service
//!
//! Mints and verifies the paired session credentials as HMAC-signed
//! tokens. Token format: base64(claims).base64(hmac_sha256(claims))
//!
//! Access tokens are short-lived and stateless. Refresh tokens are
//! long-lived; the currently valid one is persisted verbatim on the
//! user record by the caller, and overwriting it is the revocation
//! mechanism. Minting never touches storage.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// The two credential kinds of a session pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

/// Signed token payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User id the credential is bound to
    pub sub: String,
    pub kind: TokenKind,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiry (unix seconds)
    pub exp: i64,
}

/// Stateless signer/verifier for the session token pair
#[derive(Clone)]
pub struct TokenService {
    secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(config: &crate::config::AuthConfig) -> Self {
        Self {
            secret: config.token_secret.clone(),
            access_ttl: Duration::seconds(config.access_token_ttl),
            refresh_ttl: Duration::seconds(config.refresh_token_ttl),
        }
    }

    /// Mint a short-lived access token for a user
    pub fn issue_access_token(&self, user_id: &str) -> Result<String, AppError> {
        self.issue(user_id, TokenKind::Access, self.access_ttl)
    }

    /// Mint a long-lived refresh token for a user
    ///
    /// Persisting the value onto the user record (and thereby revoking
    /// the previous one) is the caller's responsibility.
    pub fn issue_refresh_token(&self, user_id: &str) -> Result<String, AppError> {
        self.issue(user_id, TokenKind::Refresh, self.refresh_ttl)
    }

    fn issue(&self, user_id: &str, kind: TokenKind, ttl: Duration) -> Result<String, AppError> {
        use base64::{engine::general_purpose, Engine as _};
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        let now = Utc::now();
        let claims = TokenClaims {
            sub: user_id.to_string(),
            kind,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        let payload = serde_json::to_string(&claims)
            .map_err(|e| AppError::Internal(e.into()))?;
        let payload_b64 = general_purpose::URL_SAFE_NO_PAD.encode(payload.as_bytes());

        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
        mac.update(payload_b64.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        crate::metrics::TOKENS_ISSUED_TOTAL
            .with_label_values(&[kind.as_str()])
            .inc();

        Ok(format!("{}.{}", payload_b64, signature_b64))
    }

    /// Verify a token and return the bound user id
    ///
    /// # Errors
    /// `InvalidToken` if the token is malformed, the signature does not
    /// match, or the kind is not the expected one; `ExpiredToken` past
    /// expiry. Byte-matching a refresh token against the persisted value
    /// is the refresh flow's responsibility, not the verifier's.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<String, AppError> {
        use base64::{engine::general_purpose, Engine as _};
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        let (payload_b64, signature_b64) =
            token.split_once('.').ok_or(AppError::InvalidToken)?;
        if signature_b64.contains('.') {
            return Err(AppError::InvalidToken);
        }

        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
        mac.update(payload_b64.as_bytes());

        let expected_signature = general_purpose::URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| AppError::InvalidToken)?;
        mac.verify_slice(&expected_signature)
            .map_err(|_| AppError::InvalidToken)?;

        let payload_bytes = general_purpose::URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| AppError::InvalidToken)?;
        let claims: TokenClaims =
            serde_json::from_slice(&payload_bytes).map_err(|_| AppError::InvalidToken)?;

        if claims.kind != expected {
            return Err(AppError::InvalidToken);
        }
        if claims.exp <= Utc::now().timestamp() {
            return Err(AppError::ExpiredToken);
        }

        Ok(claims.sub)
    }
}
