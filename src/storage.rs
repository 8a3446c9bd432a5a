// User-store collaborator interface and an in-memory implementation
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{StoredCredential, UserRecord};

/// The external user store the login flow collaborates with.
///
/// Records are keyed by the provider's subject identifier. Concurrent upserts
/// for the same subject are last-write-wins; the flow controller holds no
/// lock across its network calls.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create or update the user for `subject`, refreshing `email`, `name`
    /// and `picture` regardless of whether the record already existed.
    async fn upsert_profile(
        &self,
        subject: &str,
        email: &str,
        name: Option<&str>,
        picture: Option<&str>,
    ) -> anyhow::Result<UserRecord>;

    /// Replace the stored credential for `subject`. The previous credential,
    /// if any, is overwritten.
    async fn store_credential(
        &self,
        subject: &str,
        credential: StoredCredential,
    ) -> anyhow::Result<()>;

    async fn find_by_subject(&self, subject: &str) -> anyhow::Result<Option<UserRecord>>;

    async fn count(&self) -> usize;
}

/// In-memory user store for development and tests.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Arc<RwLock<HashMap<String, UserRecord>>>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn upsert_profile(
        &self,
        subject: &str,
        email: &str,
        name: Option<&str>,
        picture: Option<&str>,
    ) -> anyhow::Result<UserRecord> {
        let mut users = self.users.write().await;
        let now = Utc::now();
        let record = users
            .entry(subject.to_string())
            .and_modify(|user| {
                user.email = email.to_string();
                user.name = name.map(ToString::to_string);
                user.picture = picture.map(ToString::to_string);
                user.updated_at = now;
            })
            .or_insert_with(|| UserRecord {
                id: Uuid::new_v4().to_string(),
                subject: subject.to_string(),
                email: email.to_string(),
                name: name.map(ToString::to_string),
                picture: picture.map(ToString::to_string),
                credential: None,
                created_at: now,
                updated_at: now,
            });
        Ok(record.clone())
    }

    async fn store_credential(
        &self,
        subject: &str,
        credential: StoredCredential,
    ) -> anyhow::Result<()> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(subject)
            .ok_or_else(|| anyhow::anyhow!("no user record for subject"))?;
        user.credential = Some(credential);
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn find_by_subject(&self, subject: &str) -> anyhow::Result<Option<UserRecord>> {
        Ok(self.users.read().await.get(subject).cloned())
    }

    async fn count(&self) -> usize {
        self.users.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_creates_then_updates() {
        let store = MemoryUserStore::new();

        let created = store
            .upsert_profile("sub-1", "a@example.com", Some("Alice"), None)
            .await
            .unwrap();
        assert_eq!(created.email, "a@example.com");
        assert_eq!(store.count().await, 1);

        let updated = store
            .upsert_profile("sub-1", "b@example.com", None, Some("http://p"))
            .await
            .unwrap();
        assert_eq!(updated.id, created.id, "subject key is stable");
        assert_eq!(updated.email, "b@example.com");
        assert_eq!(updated.name, None, "profile fields refreshed on every login");
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_store_credential_overwrites_previous() {
        let store = MemoryUserStore::new();
        store
            .upsert_profile("sub-1", "a@example.com", None, None)
            .await
            .unwrap();

        let first = StoredCredential {
            ciphertext: "ct1".into(),
            iv: "iv1".into(),
            tag: "tag1".into(),
            expires_at: Utc::now(),
        };
        store.store_credential("sub-1", first).await.unwrap();

        let second = StoredCredential {
            ciphertext: "ct2".into(),
            iv: "iv2".into(),
            tag: "tag2".into(),
            expires_at: Utc::now(),
        };
        store.store_credential("sub-1", second.clone()).await.unwrap();

        let user = store.find_by_subject("sub-1").await.unwrap().unwrap();
        assert_eq!(user.credential, Some(second));
    }

    #[tokio::test]
    async fn test_store_credential_requires_existing_user() {
        let store = MemoryUserStore::new();
        let credential = StoredCredential {
            ciphertext: "ct".into(),
            iv: "iv".into(),
            tag: "tag".into(),
            expires_at: Utc::now(),
        };
        assert!(store.store_credential("ghost", credential).await.is_err());
    }
}
