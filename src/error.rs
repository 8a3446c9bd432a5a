// Error taxonomy for the authentication flow and its HTTP mapping
use actix_web::http::{header, StatusCode};
use actix_web::HttpResponse;
use serde_json::json;
use thiserror::Error;

/// Errors produced by the authentication core.
///
/// Every variant is terminal for the current request; nothing here is retried
/// automatically. Callers restart the whole flow from the authorize endpoint.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The presented `state` does not match the one issued for this attempt.
    #[error("state parameter mismatch")]
    Csrf,

    /// The provider's token endpoint returned a non-success response.
    /// Carries the provider's error body for operators.
    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// The provider returned a response missing required fields.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    /// Signature, structure, claim or nonce verification failed.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// A session token past its expiry.
    #[error("token expired")]
    ExpiredToken,

    /// The provider's published key set has no key with this identifier.
    #[error("no signing key found for kid '{0}'")]
    UnknownKey(String),

    /// AEAD tag verification failed: tampered ciphertext or wrong key.
    #[error("stored credential failed integrity check")]
    Integrity,

    /// A provider call (token exchange or key fetch) hit the request timeout.
    #[error("upstream request timed out")]
    UpstreamTimeout,

    /// A provider call failed at the network level (connect, DNS, TLS).
    #[error("upstream request failed: {0}")]
    Upstream(String),

    /// No session credential was presented on a protected path.
    #[error("authentication required")]
    Unauthenticated,
}

impl AuthError {
    /// True for failures where the provider could not be reached, as opposed
    /// to cryptographic or validation failures.
    #[must_use]
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::UpstreamTimeout | Self::Upstream(_))
    }
}

impl actix_web::ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated | Self::ExpiredToken => StatusCode::UNAUTHORIZED,
            Self::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status == StatusCode::UNAUTHORIZED {
            // Protected-resource failures carry no detail beyond "unauthenticated"
            return HttpResponse::Unauthorized()
                .insert_header((header::WWW_AUTHENTICATE, "Bearer"))
                .json(json!({ "error": "unauthenticated" }));
        }
        HttpResponse::build(status).json(json!({ "error": self.to_string() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::ResponseError;

    #[test]
    fn test_callback_failures_map_to_400() {
        for err in [
            AuthError::Csrf,
            AuthError::TokenExchange("invalid_grant".into()),
            AuthError::MalformedResponse("missing id_token".into()),
            AuthError::InvalidToken("bad signature".into()),
            AuthError::UnknownKey("kid-1".into()),
            AuthError::Integrity,
        ] {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST, "{err}");
        }
    }

    #[test]
    fn test_session_failures_map_to_401_with_challenge() {
        for err in [AuthError::Unauthenticated, AuthError::ExpiredToken] {
            assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
            let response = err.error_response();
            assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
        }
    }

    #[test]
    fn test_upstream_failures_distinguished_from_validation() {
        assert_eq!(
            AuthError::UpstreamTimeout.status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            AuthError::Upstream("connection refused".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert!(AuthError::UpstreamTimeout.is_upstream());
        assert!(!AuthError::InvalidToken("x".into()).is_upstream());
    }
}
