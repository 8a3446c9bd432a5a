// ID-token verification against the provider's published signing keys
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use log::debug;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use rsa::{BigUint, RsaPublicKey};
use serde::Deserialize;
use sha2::Sha256;

use crate::error::AuthError;
use crate::oauth::keys::{Jwk, KeyResolver};

/// The only algorithm accepted for provider ID tokens. The signer is an
/// external party, so "none" and symmetric algorithms are rejected outright.
const EXPECTED_ALGORITHM: &str = "RS256";

#[derive(Debug, Deserialize)]
struct TokenHeader {
    alg: String,
    kid: Option<String>,
}

/// Decoded ID-token payload. Untrusted until `verify` has checked signature,
/// issuer, audience, expiry and nonce; only then may the caller use it.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityClaims {
    /// The provider's stable user identifier; the primary join key.
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub nonce: Option<String>,
    pub exp: i64,
    pub iss: String,
    pub aud: serde_json::Value,
}

impl IdentityClaims {
    /// Audience can be a single string or an array of strings.
    fn audiences(&self) -> Vec<&str> {
        match &self.aud {
            serde_json::Value::String(aud) => vec![aud.as_str()],
            serde_json::Value::Array(auds) => {
                auds.iter().filter_map(serde_json::Value::as_str).collect()
            }
            _ => vec![],
        }
    }
}

/// Validates a received ID token and extracts its claims.
///
/// Every step is fail-closed: any failure is terminal and no partial trust
/// is established.
#[derive(Clone)]
pub struct IdTokenVerifier {
    keys: KeyResolver,
    client_id: String,
    issuer: String,
}

impl IdTokenVerifier {
    #[must_use]
    pub fn new(keys: KeyResolver, client_id: String, issuer: String) -> Self {
        Self {
            keys,
            client_id,
            issuer,
        }
    }

    /// Verify an ID token and return its claims.
    ///
    /// `expected_nonce` is the nonce issued for this login attempt. When the
    /// caller's nonce cookie did not survive the provider round trip it is
    /// `None` and the nonce comparison is skipped; the state cookie's
    /// stronger CSRF check still applies.
    ///
    /// # Errors
    ///
    /// `AuthError::InvalidToken` for any structural, signature, claim or
    /// nonce failure, including an unknown key identifier (fail closed).
    pub async fn verify(
        &self,
        id_token: &str,
        expected_nonce: Option<&str>,
    ) -> Result<IdentityClaims, AuthError> {
        let parts: Vec<&str> = id_token.split('.').collect();
        if parts.len() != 3 {
            return Err(AuthError::InvalidToken("not a JWT".to_string()));
        }

        // Unverified header peek; used only to pick the key, never as trust
        let header = decode_header(parts[0])?;
        if header.alg != EXPECTED_ALGORITHM {
            return Err(AuthError::InvalidToken(format!(
                "unexpected algorithm '{}'",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("missing key identifier".to_string()))?;

        let jwk = match self.keys.resolve(&kid).await {
            Ok(jwk) => jwk,
            // An absent key is never "skip verification"
            Err(AuthError::UnknownKey(kid)) => {
                return Err(AuthError::InvalidToken(format!(
                    "no matching signing key for kid '{kid}'"
                )))
            }
            Err(e) => return Err(e),
        };

        verify_rsa_signature(parts[0], parts[1], parts[2], &jwk)?;
        debug!("ID token signature verified with key '{kid}'");

        let claims = decode_claims(parts[1])?;
        self.validate_claims(&claims, expected_nonce)?;

        Ok(claims)
    }

    fn validate_claims(
        &self,
        claims: &IdentityClaims,
        expected_nonce: Option<&str>,
    ) -> Result<(), AuthError> {
        if claims.exp <= Utc::now().timestamp() {
            return Err(AuthError::InvalidToken("ID token has expired".to_string()));
        }

        if !claims.audiences().contains(&self.client_id.as_str()) {
            return Err(AuthError::InvalidToken(
                "audience does not match client id".to_string(),
            ));
        }

        // Google issues both URL and bare forms of its issuer
        let bare_issuer = self
            .issuer
            .strip_prefix("https://")
            .unwrap_or(&self.issuer);
        if claims.iss != self.issuer && claims.iss != bare_issuer {
            return Err(AuthError::InvalidToken("unexpected issuer".to_string()));
        }

        if let Some(expected) = expected_nonce {
            if claims.nonce.as_deref() != Some(expected) {
                return Err(AuthError::InvalidToken(
                    "nonce does not match login attempt".to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn decode_header(header_b64: &str) -> Result<TokenHeader, AuthError> {
    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|e| AuthError::InvalidToken(format!("invalid header encoding: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::InvalidToken(format!("invalid header JSON: {e}")))
}

fn decode_claims(claims_b64: &str) -> Result<IdentityClaims, AuthError> {
    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(claims_b64)
        .map_err(|e| AuthError::InvalidToken(format!("invalid claims encoding: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::InvalidToken(format!("invalid claims JSON: {e}")))
}

/// Verify an RS256 signature over `header.payload` using the JWK's RSA
/// modulus and exponent.
fn verify_rsa_signature(
    header_b64: &str,
    payload_b64: &str,
    signature_b64: &str,
    jwk: &Jwk,
) -> Result<(), AuthError> {
    let n = jwk
        .n
        .as_ref()
        .ok_or_else(|| AuthError::InvalidToken("signing key missing RSA modulus".to_string()))?;
    let e = jwk
        .e
        .as_ref()
        .ok_or_else(|| AuthError::InvalidToken("signing key missing RSA exponent".to_string()))?;

    let n_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(n)
        .map_err(|e| AuthError::InvalidToken(format!("invalid modulus encoding: {e}")))?;
    let e_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(e)
        .map_err(|e| AuthError::InvalidToken(format!("invalid exponent encoding: {e}")))?;
    let signature_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|e| AuthError::InvalidToken(format!("invalid signature encoding: {e}")))?;

    let rsa_key = RsaPublicKey::new(
        BigUint::from_bytes_be(&n_bytes),
        BigUint::from_bytes_be(&e_bytes),
    )
    .map_err(|e| AuthError::InvalidToken(format!("invalid RSA key: {e}")))?;

    let verifying_key = VerifyingKey::<Sha256>::new(rsa_key);
    let signature = Signature::try_from(signature_bytes.as_slice())
        .map_err(|e| AuthError::InvalidToken(format!("invalid signature format: {e}")))?;

    let signing_input = format!("{header_b64}.{payload_b64}");
    verifying_key
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| AuthError::InvalidToken("signature verification failed".to_string()))
}
