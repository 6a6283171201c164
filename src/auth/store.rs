//! Durable credential storage
//!
//! The token manager is the only writer. Implementations must make `save` atomic per
//! tenant: a concurrent `load` observes either the old or the new record.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::credential::{Credential, StoredCredential};
use super::error::{AuthError, AuthResult};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `Ok(None)` when nothing is stored for the tenant
    async fn load(&self, tenant_id: &str) -> AuthResult<Option<Credential>>;

    /// Replaces the tenant's record
    async fn save(&self, tenant_id: &str, credential: &Credential) -> AuthResult<()>;

    /// Removes the tenant's record (explicit de-authorization)
    async fn delete(&self, tenant_id: &str) -> AuthResult<()>;
}

/// Process-local store. Loses everything on restart.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    records: DashMap<String, StoredCredential>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn load(&self, tenant_id: &str) -> AuthResult<Option<Credential>> {
        Ok(self
            .records
            .get(tenant_id)
            .map(|record| record.value().clone().into_credential(tenant_id)))
    }

    async fn save(&self, tenant_id: &str, credential: &Credential) -> AuthResult<()> {
        self.records
            .insert(tenant_id.to_string(), StoredCredential::from(credential));
        Ok(())
    }

    async fn delete(&self, tenant_id: &str) -> AuthResult<()> {
        self.records.remove(tenant_id);
        Ok(())
    }
}

/// JSON file holding one record per tenant.
///
/// Writes go to a sibling temp file which is synced and renamed over the target, so
/// the file on disk is always a complete document.
pub struct FileCredentialStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

type CredentialDocument = BTreeMap<String, StoredCredential>;

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> AuthResult<CredentialDocument> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(CredentialDocument::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                AuthError::StorageError(format!(
                    "credential file {} is corrupt: {}",
                    self.path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CredentialDocument::new()),
            Err(e) => Err(AuthError::StorageError(format!(
                "failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn write_document(&self, document: &CredentialDocument) -> AuthResult<()> {
        let bytes = serde_json::to_vec_pretty(document)
            .map_err(|e| AuthError::StorageError(format!("failed to encode credentials: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error("create directory for", &self.path, e))?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| io_error("create", &tmp_path, e))?;

        use tokio::io::AsyncWriteExt;
        file.write_all(&bytes)
            .await
            .map_err(|e| io_error("write", &tmp_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| io_error("sync", &tmp_path, e))?;
        drop(file);

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| io_error("replace", &self.path, e))
    }
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> AuthError {
    AuthError::StorageError(format!("failed to {} {}: {}", action, path.display(), err))
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self, tenant_id: &str) -> AuthResult<Option<Credential>> {
        let mut document = self.read_document().await?;
        Ok(document
            .remove(tenant_id)
            .map(|record| record.into_credential(tenant_id)))
    }

    async fn save(&self, tenant_id: &str, credential: &Credential) -> AuthResult<()> {
        let _guard = self.write_lock.lock().await;

        let mut document = self.read_document().await?;
        document.insert(tenant_id.to_string(), StoredCredential::from(credential));
        self.write_document(&document).await
    }

    async fn delete(&self, tenant_id: &str) -> AuthResult<()> {
        let _guard = self.write_lock.lock().await;

        let mut document = self.read_document().await?;
        if document.remove(tenant_id).is_some() {
            self.write_document(&document).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credential::TokenGrant;
    use chrono::Utc;
    use secrecy::{ExposeSecret, Secret};

    fn credential(tenant: &str, access: &str, refresh: &str) -> Credential {
        let grant = TokenGrant {
            access_token: Secret::new(access.to_string()),
            refresh_token: Some(Secret::new(refresh.to_string())),
            expires_in: 86_399,
            scope: Some("contacts.readonly".to_string()),
            location_id: None,
            user_type: Some("Location".to_string()),
        };
        Credential::from_grant(tenant, grant, Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip_and_delete() {
        let store = InMemoryCredentialStore::new();
        assert!(store.load("loc-a").await.unwrap().is_none());

        store.save("loc-a", &credential("loc-a", "a1", "r1")).await.unwrap();
        let loaded = store.load("loc-a").await.unwrap().unwrap();
        assert_eq!(loaded.access_token.expose_secret(), "a1");

        store.delete("loc-a").await.unwrap();
        assert!(store.load("loc-a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("credentials.json"));
        assert!(store.load("loc-a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("credentials.json");

        let store = FileCredentialStore::new(&path);
        store.save("loc-a", &credential("loc-a", "a1", "r1")).await.unwrap();
        store.save("loc-b", &credential("loc-b", "b1", "rb")).await.unwrap();
        store.save("loc-a", &credential("loc-a", "a2", "r2")).await.unwrap();

        let reopened = FileCredentialStore::new(&path);
        let a = reopened.load("loc-a").await.unwrap().unwrap();
        let b = reopened.load("loc-b").await.unwrap().unwrap();

        assert_eq!(a.access_token.expose_secret(), "a2");
        assert_eq!(a.refresh_token.expose_secret(), "r2");
        assert_eq!(b.access_token.expose_secret(), "b1");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_delete_keeps_other_tenants() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("credentials.json"));

        store.save("loc-a", &credential("loc-a", "a1", "r1")).await.unwrap();
        store.save("loc-b", &credential("loc-b", "b1", "rb")).await.unwrap();
        store.delete("loc-a").await.unwrap();

        assert!(store.load("loc-a").await.unwrap().is_none());
        assert!(store.load("loc-b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = FileCredentialStore::new(&path);
        let err = store.load("loc-a").await.unwrap_err();
        assert!(matches!(err, AuthError::StorageError(_)));
    }
}
