// lib/src/storage_engine/inmemory_storage.rs

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use models::medical::{AccessLogEntry, AccessToken, Identity, MedicalRecord, StoredFile, User};
use tokio::sync::RwLock;

use super::storage_engine::{
    AccessLogStorage, BlobStorage, Datastore, Edit, FileStorage, RecordStorage, TokenStorage, UserStorage,
};
use crate::errors::{Result, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Users {
    by_id: HashMap<String, User>,
    by_identity: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct Tokens {
    by_id: HashMap<String, AccessToken>,
    by_token: HashMap<String, String>,
}

/// Volatile engine for tests and demos. Each collection sits behind its own
/// lock; a write lock is the unit of atomicity.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    users: Arc<RwLock<Users>>,
    records: Arc<RwLock<HashMap<String, MedicalRecord>>>,
    tokens: Arc<RwLock<Tokens>>,
    access_logs: Arc<RwLock<Vec<AccessLogEntry>>>,
    files: Arc<RwLock<HashMap<String, StoredFile>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStorage for InMemoryStorage {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut users = self.users.write().await;
        let key = user.identity.index_key();
        if users.by_identity.contains_key(&key) {
            return Err(StoreError::Conflict(format!("identity {}", key)));
        }
        users.by_identity.insert(key, user.id.clone());
        users.by_id.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> StoreResult<()> {
        let mut users = self.users.write().await;
        match users.by_id.get_mut(&user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("user {}", user.id))),
        }
    }

    async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.by_id.get(id).cloned())
    }

    async fn find_user_by_identity(&self, identity: &Identity) -> StoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .by_identity
            .get(&identity.index_key())
            .and_then(|id| users.by_id.get(id))
            .cloned())
    }
}

#[async_trait]
impl RecordStorage for InMemoryStorage {
    async fn insert_record(&self, record: &MedicalRecord) -> StoreResult<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StoreError::Conflict(format!("record {}", record.id)));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_record(&self, id: &str) -> StoreResult<Option<MedicalRecord>> {
        let records = self.records.read().await;
        Ok(records.get(id).cloned())
    }

    async fn get_records(&self, ids: &[String]) -> StoreResult<Vec<MedicalRecord>> {
        let records = self.records.read().await;
        Ok(ids.iter().filter_map(|id| records.get(id).cloned()).collect())
    }

    async fn update_record_with(&self, id: &str, mut edit: Edit<MedicalRecord>) -> Result<Option<MedicalRecord>> {
        let mut records = self.records.write().await;
        let Some(current) = records.get_mut(id) else {
            return Ok(None);
        };
        let mut draft = current.clone();
        edit(&mut draft)?;
        *current = draft.clone();
        Ok(Some(draft))
    }

    async fn delete_record(&self, id: &str) -> StoreResult<bool> {
        let mut records = self.records.write().await;
        Ok(records.remove(id).is_some())
    }

    async fn records_by_owner(&self, owner: &str) -> StoreResult<Vec<MedicalRecord>> {
        let records = self.records.read().await;
        Ok(records.values().filter(|r| r.owner == owner).cloned().collect())
    }

    async fn records_shared_with(&self, grantee: &str) -> StoreResult<Vec<MedicalRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.shared_with.iter().any(|g| g.grantee == grantee))
            .cloned()
            .collect())
    }

    async fn pending_deletions(&self) -> StoreResult<Vec<MedicalRecord>> {
        let records = self.records.read().await;
        Ok(records.values().filter(|r| r.pending_deletion).cloned().collect())
    }
}

#[async_trait]
impl TokenStorage for InMemoryStorage {
    async fn insert_token(&self, token: &AccessToken) -> StoreResult<()> {
        let mut tokens = self.tokens.write().await;
        if tokens.by_token.contains_key(&token.token) {
            return Err(StoreError::Conflict("token string".to_string()));
        }
        tokens.by_token.insert(token.token.clone(), token.id.clone());
        tokens.by_id.insert(token.id.clone(), token.clone());
        Ok(())
    }

    async fn get_token(&self, id: &str) -> StoreResult<Option<AccessToken>> {
        let tokens = self.tokens.read().await;
        Ok(tokens.by_id.get(id).cloned())
    }

    async fn find_token(&self, token: &str) -> StoreResult<Option<AccessToken>> {
        let tokens = self.tokens.read().await;
        Ok(tokens.by_token.get(token).and_then(|id| tokens.by_id.get(id)).cloned())
    }

    async fn tokens_by_owner(&self, owner: &str) -> StoreResult<Vec<AccessToken>> {
        let tokens = self.tokens.read().await;
        Ok(tokens.by_id.values().filter(|t| t.owner == owner).cloned().collect())
    }

    async fn update_token_with(&self, id: &str, mut edit: Edit<AccessToken>) -> Result<Option<AccessToken>> {
        let mut tokens = self.tokens.write().await;
        let Some(current) = tokens.by_id.get_mut(id) else {
            return Ok(None);
        };
        let mut draft = current.clone();
        edit(&mut draft)?;
        *current = draft.clone();
        Ok(Some(draft))
    }
}

#[async_trait]
impl AccessLogStorage for InMemoryStorage {
    async fn append_entry(&self, entry: &AccessLogEntry) -> StoreResult<()> {
        let mut logs = self.access_logs.write().await;
        logs.push(entry.clone());
        Ok(())
    }

    async fn entries_for_owner(&self, owner: &str) -> StoreResult<Vec<AccessLogEntry>> {
        let logs = self.access_logs.read().await;
        Ok(logs.iter().rev().filter(|e| e.owner == owner).cloned().collect())
    }
}

#[async_trait]
impl FileStorage for InMemoryStorage {
    async fn insert_file(&self, file: &StoredFile) -> StoreResult<()> {
        let mut files = self.files.write().await;
        files.insert(file.id.clone(), file.clone());
        Ok(())
    }

    async fn get_file(&self, id: &str) -> StoreResult<Option<StoredFile>> {
        let files = self.files.read().await;
        Ok(files.get(id).cloned())
    }

    async fn delete_file(&self, id: &str) -> StoreResult<bool> {
        let mut files = self.files.write().await;
        Ok(files.remove(id).is_some())
    }
}

impl Datastore for InMemoryStorage {
    fn engine_name(&self) -> &'static str {
        "InMemory"
    }
}

/// Blob store kept in a map keyed by `(owner, filename)`.
#[derive(Debug, Default)]
pub struct InMemoryBlobStorage {
    blobs: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl InMemoryBlobStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStorage for InMemoryBlobStorage {
    async fn put_blob(&self, owner: &str, filename: &str, bytes: &[u8]) -> StoreResult<()> {
        let mut blobs = self.blobs.write().await;
        blobs.insert((owner.to_string(), filename.to_string()), bytes.to_vec());
        Ok(())
    }

    async fn get_blob(&self, owner: &str, filename: &str) -> StoreResult<Option<Vec<u8>>> {
        let blobs = self.blobs.read().await;
        Ok(blobs.get(&(owner.to_string(), filename.to_string())).cloned())
    }

    async fn delete_blob(&self, owner: &str, filename: &str) -> StoreResult<()> {
        let mut blobs = self.blobs.write().await;
        blobs.remove(&(owner.to_string(), filename.to_string()));
        Ok(())
    }
}
