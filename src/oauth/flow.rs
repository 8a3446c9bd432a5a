// Login flow orchestration: authorization redirect and callback completion
use std::sync::Arc;

use chrono::{Duration, Utc};
use log::{info, warn};
use serde::Deserialize;
use url::Url;

use crate::error::AuthError;
use crate::models::StoredCredential;
use crate::oauth::id_token::IdTokenVerifier;
use crate::oauth::keys::request_error;
use crate::session::token::{SessionIdentity, SessionService};
use crate::settings::ProviderSettings;
use crate::storage::UserStore;
use crate::utils::crypto::{generate_nonce, generate_state, RefreshTokenCipher};

/// How long a stored provider credential is considered usable.
const CREDENTIAL_LIFETIME_DAYS: i64 = 180;

/// Provider response to the authorization-code exchange. Deliberately not
/// `Debug`: it carries raw provider tokens.
#[derive(Deserialize)]
struct TokenResponse {
    id_token: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
}

/// A freshly initiated login attempt: the URL to redirect the browser to,
/// plus the state and nonce values to stash in callback-scoped cookies.
#[derive(Debug)]
pub struct LoginStart {
    pub authorization_url: String,
    pub state: String,
    pub nonce: String,
}

/// The result of a completed login: a session token to hand the browser,
/// and the provider refresh token when one was issued. Not `Debug`; both
/// fields are credentials.
pub struct LoginOutcome {
    pub session_token: String,
    pub refresh_token: Option<String>,
}

/// Orchestrates the authorization-code flow end to end.
///
/// Completion is strictly ordered: the CSRF check runs before any network
/// call, and nothing is persisted until the ID token has fully verified.
#[derive(Clone)]
pub struct LoginFlow {
    provider: ProviderSettings,
    redirect_uri: String,
    http: reqwest::Client,
    verifier: IdTokenVerifier,
    cipher: RefreshTokenCipher,
    store: Arc<dyn UserStore>,
    sessions: SessionService,
}

impl LoginFlow {
    #[must_use]
    pub fn new(
        provider: ProviderSettings,
        redirect_uri: String,
        http: reqwest::Client,
        verifier: IdTokenVerifier,
        cipher: RefreshTokenCipher,
        store: Arc<dyn UserStore>,
        sessions: SessionService,
    ) -> Self {
        Self {
            provider,
            redirect_uri,
            http,
            verifier,
            cipher,
            store,
            sessions,
        }
    }

    /// Start a login attempt: mint fresh state and nonce values and build the
    /// provider authorization URL.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenExchange` if the configured authorization
    /// endpoint is not a valid URL.
    pub fn begin_login(&self) -> Result<LoginStart, AuthError> {
        let state = generate_state();
        let nonce = generate_nonce();

        let mut url = Url::parse(&self.provider.auth_url)
            .map_err(|e| AuthError::TokenExchange(format!("invalid authorization URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.provider.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.provider.scopes)
            // Ask for a refresh token on every consent
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", &state)
            .append_pair("nonce", &nonce);

        Ok(LoginStart {
            authorization_url: url.into(),
            state,
            nonce,
        })
    }

    /// Complete a login attempt from the provider callback.
    ///
    /// `stored_state` and `stored_nonce` come from the login attempt cookies;
    /// a missing or mismatching state is a CSRF failure before anything else
    /// happens. A missing nonce cookie degrades the nonce check to
    /// best-effort rather than failing the login.
    ///
    /// # Errors
    ///
    /// - `AuthError::Csrf` when the state check fails
    /// - `AuthError::TokenExchange` when the provider rejects the code
    /// - `AuthError::MalformedResponse` when the provider response is missing
    ///   required fields
    /// - `AuthError::InvalidToken` when ID-token verification fails
    /// - `AuthError::UpstreamTimeout` / `AuthError::Upstream` for network
    ///   failures
    pub async fn complete_login(
        &self,
        code: &str,
        presented_state: &str,
        stored_state: Option<&str>,
        stored_nonce: Option<&str>,
    ) -> Result<LoginOutcome, AuthError> {
        // CSRF check first: no network traffic on a failed attempt
        match stored_state {
            Some(stored) if stored == presented_state => {}
            _ => return Err(AuthError::Csrf),
        }
        if stored_nonce.is_none() {
            warn!("Nonce cookie absent on callback; replay check degraded to best-effort");
        }

        let tokens = self.exchange_code(code).await?;

        let id_token = tokens
            .id_token
            .as_deref()
            .ok_or_else(|| AuthError::MalformedResponse("missing id_token".to_string()))?;
        if tokens.access_token.is_none() {
            return Err(AuthError::MalformedResponse(
                "missing access_token".to_string(),
            ));
        }

        let claims = self.verifier.verify(id_token, stored_nonce).await?;

        if claims.sub.is_empty() {
            return Err(AuthError::MalformedResponse(
                "ID token missing subject".to_string(),
            ));
        }
        let email = claims
            .email
            .as_deref()
            .ok_or_else(|| AuthError::MalformedResponse("ID token missing email".to_string()))?;

        // Identity is verified; only now touch the store
        let user = self
            .store
            .upsert_profile(
                &claims.sub,
                email,
                claims.name.as_deref(),
                claims.picture.as_deref(),
            )
            .await
            .map_err(|e| AuthError::Upstream(format!("user store failure: {e}")))?;

        if let Some(refresh_token) = tokens.refresh_token.as_deref() {
            let sealed = self.cipher.encrypt(refresh_token)?;
            let credential = StoredCredential {
                ciphertext: sealed.ciphertext,
                iv: sealed.iv,
                tag: sealed.tag,
                expires_at: Utc::now() + Duration::days(CREDENTIAL_LIFETIME_DAYS),
            };
            self.store
                .store_credential(&claims.sub, credential)
                .await
                .map_err(|e| AuthError::Upstream(format!("user store failure: {e}")))?;
        }

        let session_token = self.sessions.issue(&SessionIdentity {
            subject: claims.sub.clone(),
            email: email.to_string(),
            role: "user".to_string(),
            name: claims.name.clone(),
            picture: claims.picture.clone(),
        })?;

        info!("Login completed for user {}", user.id);

        Ok(LoginOutcome {
            session_token,
            refresh_token: tokens.refresh_token,
        })
    }

    /// Exchange the authorization code for tokens at the provider.
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, AuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.provider.client_id.as_str()),
            ("client_secret", self.provider.client_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];

        let response = self
            .http
            .post(&self.provider.token_url)
            .form(&params)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenExchange(format!(
                "provider returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::MalformedResponse(format!("invalid token response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::keys::KeyResolver;
    use crate::storage::MemoryUserStore;

    fn flow(store: Arc<MemoryUserStore>) -> LoginFlow {
        let provider = ProviderSettings {
            client_id: "test-client".to_string(),
            client_secret: "test-secret".to_string(),
            // Dead endpoints: these tests must never get that far
            token_url: "http://127.0.0.1:9/token".to_string(),
            certs_url: "http://127.0.0.1:9/certs".to_string(),
            ..ProviderSettings::default()
        };
        let keys = KeyResolver::new(
            provider.certs_url.clone(),
            reqwest::Client::new(),
            std::time::Duration::from_secs(3600),
        );
        let verifier = IdTokenVerifier::new(
            keys,
            provider.client_id.clone(),
            provider.issuer.clone(),
        );
        LoginFlow::new(
            provider,
            "http://localhost:8080/oauth2/callback".to_string(),
            reqwest::Client::new(),
            verifier,
            RefreshTokenCipher::new([0u8; 32]),
            store,
            SessionService::new(b"flow_test_secret".to_vec(), 15, "auth-server-1".to_string()),
        )
    }

    #[test]
    fn test_begin_login_builds_authorization_url() {
        let start = flow(Arc::new(MemoryUserStore::new())).begin_login().unwrap();
        let url = Url::parse(&start.authorization_url).unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().collect();

        assert_eq!(pairs["client_id"], "test-client");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["scope"], "openid email profile");
        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(pairs["prompt"], "consent");
        assert_eq!(pairs["state"], start.state.as_str());
        assert_eq!(pairs["nonce"], start.nonce.as_str());
        assert_eq!(
            pairs["redirect_uri"],
            "http://localhost:8080/oauth2/callback"
        );
    }

    #[test]
    fn test_each_login_attempt_gets_fresh_state_and_nonce() {
        let flow = flow(Arc::new(MemoryUserStore::new()));
        let first = flow.begin_login().unwrap();
        let second = flow.begin_login().unwrap();
        assert_ne!(first.state, second.state);
        assert_ne!(first.nonce, second.nonce);
    }

    #[tokio::test]
    async fn test_state_mismatch_fails_before_any_network_call() {
        let store = Arc::new(MemoryUserStore::new());
        let flow = flow(Arc::clone(&store));

        // The token endpoint is unreachable, so anything past the CSRF check
        // would surface as Upstream rather than Csrf
        let result = flow
            .complete_login("code", "presented", Some("stored"), None)
            .await;
        assert!(matches!(result, Err(AuthError::Csrf)));
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn test_missing_state_cookie_is_csrf_failure() {
        let flow = flow(Arc::new(MemoryUserStore::new()));
        let result = flow.complete_login("code", "presented", None, None).await;
        assert!(matches!(result, Err(AuthError::Csrf)));
    }
}
