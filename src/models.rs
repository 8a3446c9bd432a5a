// Persisted shapes owned by the user-store collaborator
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An encrypted provider refresh token plus its AEAD parameters.
///
/// Ciphertext, IV and tag are stored together; all three plus the symmetric
/// key held by the service process are required to recover the plaintext.
/// Overwritten wholesale on each login that yields a new refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    pub ciphertext: String,
    pub iv: String,
    pub tag: String,
    pub expires_at: DateTime<Utc>,
}

/// A user record keyed by the provider's stable subject identifier.
///
/// Profile fields are refreshed on every login; the stored credential is
/// replaced only when the provider returns a new refresh token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    /// The provider's stable user identifier (`sub`), the primary join key.
    pub subject: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub credential: Option<StoredCredential>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
