// lib/src/storage_engine/storage_engine.rs

use async_trait::async_trait;
use models::medical::{AccessLogEntry, AccessToken, Identity, MedicalRecord, StoredFile, User};

use crate::errors::{Result, StoreResult};

/// Read-modify-write step applied under the engine's per-document
/// atomicity. Returning an error leaves the document untouched. The
/// closure may run more than once when the engine retries.
pub type Edit<T> = Box<dyn FnMut(&mut T) -> Result<()> + Send>;

/// Boxes a closure as an [`Edit`].
pub fn edit<T, F>(f: F) -> Edit<T>
where
    F: FnMut(&mut T) -> Result<()> + Send + 'static,
{
    Box::new(f)
}

#[async_trait]
pub trait UserStorage: Send + Sync + 'static {
    /// Fails with `Conflict` when the identity is already bound to a user.
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    async fn update_user(&self, user: &User) -> StoreResult<()>;
    async fn get_user(&self, id: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_identity(&self, identity: &Identity) -> StoreResult<Option<User>>;
}

#[async_trait]
pub trait RecordStorage: Send + Sync + 'static {
    async fn insert_record(&self, record: &MedicalRecord) -> StoreResult<()>;
    async fn get_record(&self, id: &str) -> StoreResult<Option<MedicalRecord>>;
    /// Fetches `ids` in order, silently skipping the ones that do not exist.
    async fn get_records(&self, ids: &[String]) -> StoreResult<Vec<MedicalRecord>>;
    /// Atomically applies `edit`. `Ok(None)` when the record does not exist.
    async fn update_record_with(&self, id: &str, edit: Edit<MedicalRecord>) -> Result<Option<MedicalRecord>>;
    /// Removes the row. Returns whether it existed.
    async fn delete_record(&self, id: &str) -> StoreResult<bool>;
    /// Every record of `owner`, tombstoned ones included.
    async fn records_by_owner(&self, owner: &str) -> StoreResult<Vec<MedicalRecord>>;
    /// Records carrying a grant for `grantee`, live or lapsed.
    async fn records_shared_with(&self, grantee: &str) -> StoreResult<Vec<MedicalRecord>>;
    async fn pending_deletions(&self) -> StoreResult<Vec<MedicalRecord>>;
}

#[async_trait]
pub trait TokenStorage: Send + Sync + 'static {
    /// Fails with `Conflict` when the token string is already taken.
    async fn insert_token(&self, token: &AccessToken) -> StoreResult<()>;
    async fn get_token(&self, id: &str) -> StoreResult<Option<AccessToken>>;
    async fn find_token(&self, token: &str) -> StoreResult<Option<AccessToken>>;
    async fn tokens_by_owner(&self, owner: &str) -> StoreResult<Vec<AccessToken>>;
    /// Atomically applies `edit`. `Ok(None)` when the token does not exist.
    async fn update_token_with(&self, id: &str, edit: Edit<AccessToken>) -> Result<Option<AccessToken>>;
}

#[async_trait]
pub trait AccessLogStorage: Send + Sync + 'static {
    async fn append_entry(&self, entry: &AccessLogEntry) -> StoreResult<()>;
    /// Entries about `owner`'s data, newest first.
    async fn entries_for_owner(&self, owner: &str) -> StoreResult<Vec<AccessLogEntry>>;
}

#[async_trait]
pub trait FileStorage: Send + Sync + 'static {
    async fn insert_file(&self, file: &StoredFile) -> StoreResult<()>;
    async fn get_file(&self, id: &str) -> StoreResult<Option<StoredFile>>;
    async fn delete_file(&self, id: &str) -> StoreResult<bool>;
}

/// File bytes, addressed by owner and stored filename.
#[async_trait]
pub trait BlobStorage: Send + Sync + 'static {
    async fn put_blob(&self, owner: &str, filename: &str, bytes: &[u8]) -> StoreResult<()>;
    async fn get_blob(&self, owner: &str, filename: &str) -> StoreResult<Option<Vec<u8>>>;
    /// Deleting a missing blob is not an error.
    async fn delete_blob(&self, owner: &str, filename: &str) -> StoreResult<()>;
}

/// Everything the services need from one engine.
pub trait Datastore: UserStorage + RecordStorage + TokenStorage + AccessLogStorage + FileStorage {
    fn engine_name(&self) -> &'static str;
}
