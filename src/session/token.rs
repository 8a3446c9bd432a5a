// Session token (JWT) issuance and verification
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// The algorithm this service signs and verifies session tokens with.
/// Pinned as configuration; the verifier never reads the algorithm from the
/// token being verified as a trust input (algorithm-confusion defense).
const SESSION_ALGORITHM: &str = "HS256";

/// Identity carried into a freshly issued session token.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub subject: String,
    pub email: String,
    pub role: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// Claims of a verified session token. Immutable once signed; there is no
/// server-side revocation store, so the lifetime stays short.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub email: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    pub iat: i64,
    pub exp: i64,
    /// Fresh per issuance; prevents token fingerprint collisions and leaves
    /// room for a future revocation list.
    pub jti: String,
    /// Key identifier tag for future key-rotation support.
    pub kid: String,
}

/// Issues and verifies this service's own short-lived session JWTs.
///
/// Signing uses a symmetric secret held as process-wide, read-only
/// configuration; issuance has no side effects beyond producing the token.
#[derive(Clone)]
pub struct SessionService {
    secret: Vec<u8>,
    ttl_minutes: i64,
    key_id: String,
}

impl SessionService {
    #[must_use]
    pub fn new(secret: Vec<u8>, ttl_minutes: i64, key_id: String) -> Self {
        Self {
            secret,
            ttl_minutes,
            key_id,
        }
    }

    /// Mint a signed session token for the authenticated identity.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` if serialization or signing fails
    /// (an invalid HMAC key length, in practice never for a loaded secret).
    pub fn issue(&self, identity: &SessionIdentity) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: identity.subject.clone(),
            email: identity.email.clone(),
            role: identity.role.clone(),
            name: identity.name.clone(),
            picture: identity.picture.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(self.ttl_minutes)).timestamp(),
            jti: Uuid::new_v4().to_string(),
            kid: self.key_id.clone(),
        };

        let header = serde_json::json!({ "alg": SESSION_ALGORITHM, "typ": "JWT" });
        let header_b64 = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_json = serde_json::to_string(&claims)
            .map_err(|e| AuthError::InvalidToken(format!("claims serialization failed: {e}")))?;
        let payload_b64 = general_purpose::URL_SAFE_NO_PAD.encode(payload_json);

        let message = format!("{header_b64}.{payload_b64}");
        let signature = self.sign(message.as_bytes())?;
        let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        Ok(format!("{message}.{signature_b64}"))
    }

    /// Verify a presented session token and extract its claims.
    ///
    /// # Errors
    ///
    /// - `AuthError::ExpiredToken` when `exp` is not in the future
    /// - `AuthError::InvalidToken` for any signature, structure or
    ///   algorithm condition
    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(AuthError::InvalidToken("not a JWT".to_string()));
        }

        let header_bytes = general_purpose::URL_SAFE_NO_PAD
            .decode(parts[0])
            .map_err(|e| AuthError::InvalidToken(format!("invalid header encoding: {e}")))?;
        let header: serde_json::Value = serde_json::from_slice(&header_bytes)
            .map_err(|e| AuthError::InvalidToken(format!("invalid header JSON: {e}")))?;
        if header["alg"] != SESSION_ALGORITHM {
            return Err(AuthError::InvalidToken(
                "unsupported signing algorithm".to_string(),
            ));
        }

        let signature = general_purpose::URL_SAFE_NO_PAD
            .decode(parts[2])
            .map_err(|e| AuthError::InvalidToken(format!("invalid signature encoding: {e}")))?;
        let message = format!("{}.{}", parts[0], parts[1]);

        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .map_err(|_| AuthError::InvalidToken("invalid signing key".to_string()))?;
        mac.update(message.as_bytes());
        // Constant-time comparison
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::InvalidToken("signature verification failed".to_string()))?;

        let payload_bytes = general_purpose::URL_SAFE_NO_PAD
            .decode(parts[1])
            .map_err(|e| AuthError::InvalidToken(format!("invalid claims encoding: {e}")))?;
        let claims: SessionClaims = serde_json::from_slice(&payload_bytes)
            .map_err(|e| AuthError::InvalidToken(format!("invalid claims JSON: {e}")))?;

        if claims.exp <= Utc::now().timestamp() {
            return Err(AuthError::ExpiredToken);
        }

        Ok(claims)
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, AuthError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .map_err(|_| AuthError::InvalidToken("invalid signing key".to_string()))?;
        mac.update(message);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}
