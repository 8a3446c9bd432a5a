// Provider signing-key resolution with JWKS caching
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::error::AuthError;

/// A single key from the provider's published JWKS document (RFC 7517).
/// Google signs ID tokens with RSA keys, so only the RSA members matter here.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub kid: Option<String>,
    pub alg: Option<String>,
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    /// RSA modulus, base64url
    pub n: Option<String>,
    /// RSA exponent, base64url
    pub e: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

struct KeyCache {
    keys: HashMap<String, Jwk>,
    fetched_at: Option<DateTime<Utc>>,
    cache_duration: Duration,
}

impl KeyCache {
    fn new(cache_duration: Duration) -> Self {
        Self {
            keys: HashMap::new(),
            fetched_at: None,
            cache_duration,
        }
    }

    fn is_fresh(&self) -> bool {
        self.fetched_at.is_some_and(|fetched| {
            Utc::now()
                .signed_duration_since(fetched)
                .to_std()
                .unwrap_or(Duration::MAX)
                < self.cache_duration
        })
    }

    fn store(&mut self, keys: Vec<Jwk>) {
        self.keys = keys
            .into_iter()
            .filter_map(|key| key.kid.clone().map(|kid| (kid, key)))
            .collect();
        self.fetched_at = Some(Utc::now());
        debug!("Cached {} provider signing keys", self.keys.len());
    }
}

/// Fetches and caches the identity provider's public signing keys, indexed
/// by key identifier.
///
/// The cache is process-wide with refresh-on-miss semantics: a lookup miss
/// triggers exactly one re-fetch before failing with `UnknownKey`, bounding
/// both staleness and fetch storms. A missing key identifier is never
/// interpreted as "skip verification".
#[derive(Clone)]
pub struct KeyResolver {
    certs_url: String,
    http: reqwest::Client,
    cache: Arc<RwLock<KeyCache>>,
}

impl KeyResolver {
    #[must_use]
    pub fn new(certs_url: String, http: reqwest::Client, cache_duration: Duration) -> Self {
        Self {
            certs_url,
            http,
            cache: Arc::new(RwLock::new(KeyCache::new(cache_duration))),
        }
    }

    /// Resolve the public key with the given identifier.
    ///
    /// # Errors
    ///
    /// - `AuthError::UnknownKey` if the identifier is absent from the fetched
    ///   key set even after a refresh
    /// - `AuthError::UpstreamTimeout` / `AuthError::Upstream` if the key set
    ///   cannot be fetched
    pub async fn resolve(&self, kid: &str) -> Result<Jwk, AuthError> {
        {
            let cache = self.cache.read().await;
            if cache.is_fresh() {
                if let Some(key) = cache.keys.get(kid) {
                    debug!("Signing key '{kid}' served from cache");
                    return Ok(key.clone());
                }
            }
        }

        // Cache miss or stale: one re-fetch, then fail closed
        self.refresh().await?;

        let cache = self.cache.read().await;
        cache
            .keys
            .get(kid)
            .cloned()
            .ok_or_else(|| AuthError::UnknownKey(kid.to_string()))
    }

    /// Fetch the provider's key set and replace the cache contents.
    async fn refresh(&self) -> Result<(), AuthError> {
        debug!("Fetching provider signing keys from {}", self.certs_url);

        // No lock is held across the network call
        let response = self
            .http
            .get(&self.certs_url)
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            return Err(AuthError::Upstream(format!(
                "key set request failed with status {}",
                response.status()
            )));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::Upstream(format!("invalid key set document: {e}")))?;

        self.cache.write().await.store(jwks.keys);
        Ok(())
    }
}

/// Map a reqwest failure onto the error taxonomy: timeouts are retriable
/// `UpstreamTimeout`, everything else is a network-level `Upstream` failure.
pub(crate) fn request_error(e: reqwest::Error) -> AuthError {
    if e.is_timeout() {
        AuthError::UpstreamTimeout
    } else {
        AuthError::Upstream(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rsa_key(kid: &str) -> Jwk {
        Jwk {
            kty: "RSA".to_string(),
            kid: Some(kid.to_string()),
            alg: Some("RS256".to_string()),
            key_use: Some("sig".to_string()),
            n: Some("AQAB-modulus".to_string()),
            e: Some("AQAB".to_string()),
        }
    }

    #[test]
    fn test_cache_starts_stale_and_freshens_on_store() {
        let mut cache = KeyCache::new(Duration::from_secs(3600));
        assert!(!cache.is_fresh());

        cache.store(vec![rsa_key("key-1")]);
        assert!(cache.is_fresh());
        assert!(cache.keys.contains_key("key-1"));
    }

    #[test]
    fn test_cache_drops_keys_without_kid() {
        let mut cache = KeyCache::new(Duration::from_secs(3600));
        let mut anonymous = rsa_key("ignored");
        anonymous.kid = None;
        cache.store(vec![anonymous, rsa_key("key-2")]);
        assert_eq!(cache.keys.len(), 1);
        assert!(cache.keys.contains_key("key-2"));
    }

    #[test]
    fn test_zero_duration_cache_is_never_fresh() {
        let mut cache = KeyCache::new(Duration::ZERO);
        cache.store(vec![rsa_key("key-1")]);
        assert!(!cache.is_fresh());
    }

    #[tokio::test]
    async fn test_resolve_unreachable_certs_url_is_upstream_error() {
        // Nothing listens on this port; the failure must surface as an
        // upstream error, never as a skipped verification
        let resolver = KeyResolver::new(
            "http://127.0.0.1:9/certs".to_string(),
            reqwest::Client::new(),
            Duration::from_secs(3600),
        );
        let result = resolver.resolve("any-kid").await;
        assert!(matches!(result, Err(AuthError::Upstream(_))));
    }
}
