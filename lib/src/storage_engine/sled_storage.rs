// lib/src/storage_engine/sled_storage.rs

use std::path::Path;

use async_trait::async_trait;
use bincode::{
    config::{self, BigEndian, Configuration, Fixint},
    serde::{decode_from_slice, encode_to_vec},
};
use log::{debug, info};
use models::medical::{AccessLogEntry, AccessToken, Identity, MedicalRecord, StoredFile, User};
use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};

use super::storage_engine::{
    AccessLogStorage, Datastore, Edit, FileStorage, RecordStorage, TokenStorage, UserStorage,
};
use crate::errors::{Result, ServiceError, StoreError, StoreResult};

const KEY_SEPARATOR: u8 = 0;

/// Provides a standard bincode configuration.
fn bincode_config() -> Configuration<BigEndian, Fixint> {
    config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    Ok(encode_to_vec(value, bincode_config())?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    let (value, _): (T, usize) = decode_from_slice(bytes, bincode_config())?;
    Ok(value)
}

/// `prefix \0 suffix`, used for the per-owner index trees.
fn compound_key(prefix: &str, suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 1 + suffix.len());
    key.extend_from_slice(prefix.as_bytes());
    key.push(KEY_SEPARATOR);
    key.extend_from_slice(suffix);
    key
}

fn owner_prefix(owner: &str) -> Vec<u8> {
    compound_key(owner, &[])
}

pub fn open_sled_db(path: &Path) -> StoreResult<Db> {
    std::fs::create_dir_all(path)?;
    info!("Opening Sled database at {:?}", path);
    Ok(sled::open(path)?)
}

/// Sled-backed engine. Documents are bincode-encoded and keyed by id; the
/// secondary trees map lookup keys back onto ids.
pub struct SledStorage {
    db: Db,
    users: Tree,
    user_identities: Tree,
    records: Tree,
    owner_records: Tree,
    tokens: Tree,
    token_strings: Tree,
    access_logs: Tree,
    files: Tree,
}

impl SledStorage {
    pub fn new(db: Db) -> StoreResult<Self> {
        Ok(SledStorage {
            users: db.open_tree("users")?,
            user_identities: db.open_tree("user_identities")?,
            records: db.open_tree("records")?,
            owner_records: db.open_tree("owner_records")?,
            tokens: db.open_tree("access_tokens")?,
            token_strings: db.open_tree("access_token_strings")?,
            access_logs: db.open_tree("access_logs")?,
            files: db.open_tree("files")?,
            db,
        })
    }

    fn get_decoded<T: DeserializeOwned>(tree: &Tree, key: &[u8]) -> StoreResult<Option<T>> {
        match tree.get(key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan_decoded<T: DeserializeOwned>(tree: &Tree) -> StoreResult<Vec<T>> {
        tree.iter()
            .map(|item| {
                let (_, bytes) = item?;
                decode(&bytes)
            })
            .collect()
    }

    /// Runs `edit` inside `update_and_fetch`. Sled may call the closure again
    /// on a CAS retry, so the captured outcome is reset on every pass.
    fn update_with<T>(tree: &Tree, id: &str, mut edit: Edit<T>) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut outcome: Option<ServiceError> = None;
        let updated = tree
            .update_and_fetch(id.as_bytes(), |old| {
                let bytes = old?;
                outcome = None;
                let mut doc: T = match decode(bytes) {
                    Ok(doc) => doc,
                    Err(e) => {
                        outcome = Some(e.into());
                        return Some(bytes.to_vec());
                    }
                };
                if let Err(e) = edit(&mut doc) {
                    outcome = Some(e);
                    return Some(bytes.to_vec());
                }
                match encode(&doc) {
                    Ok(encoded) => Some(encoded),
                    Err(e) => {
                        outcome = Some(e.into());
                        Some(bytes.to_vec())
                    }
                }
            })
            .map_err(StoreError::from)?;

        if let Some(err) = outcome {
            return Err(err);
        }
        match updated {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }
}

fn transaction_error(err: TransactionError<StoreError>) -> StoreError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => e.into(),
    }
}

#[async_trait]
impl UserStorage for SledStorage {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let bytes = encode(user)?;
        let index_key = user.identity.index_key();
        (&self.users, &self.user_identities)
            .transaction(|(users, identities)| {
                if identities.get(index_key.as_bytes())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(StoreError::Conflict(format!(
                        "identity {}",
                        index_key
                    ))));
                }
                identities.insert(index_key.as_bytes(), user.id.as_bytes())?;
                users.insert(user.id.as_bytes(), bytes.as_slice())?;
                Ok(())
            })
            .map_err(transaction_error)?;
        debug!("Stored user {}", user.id);
        Ok(())
    }

    async fn update_user(&self, user: &User) -> StoreResult<()> {
        if !self.users.contains_key(user.id.as_bytes())? {
            return Err(StoreError::NotFound(format!("user {}", user.id)));
        }
        self.users.insert(user.id.as_bytes(), encode(user)?)?;
        Ok(())
    }

    async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        Self::get_decoded(&self.users, id.as_bytes())
    }

    async fn find_user_by_identity(&self, identity: &Identity) -> StoreResult<Option<User>> {
        match self.user_identities.get(identity.index_key().as_bytes())? {
            Some(id) => Self::get_decoded(&self.users, &id),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl RecordStorage for SledStorage {
    async fn insert_record(&self, record: &MedicalRecord) -> StoreResult<()> {
        let bytes = encode(record)?;
        let owner_key = compound_key(&record.owner, record.id.as_bytes());
        (&self.records, &self.owner_records)
            .transaction(|(records, owner_records)| {
                if records.get(record.id.as_bytes())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(StoreError::Conflict(format!(
                        "record {}",
                        record.id
                    ))));
                }
                records.insert(record.id.as_bytes(), bytes.as_slice())?;
                owner_records.insert(owner_key.as_slice(), record.id.as_bytes())?;
                Ok(())
            })
            .map_err(transaction_error)
    }

    async fn get_record(&self, id: &str) -> StoreResult<Option<MedicalRecord>> {
        Self::get_decoded(&self.records, id.as_bytes())
    }

    async fn get_records(&self, ids: &[String]) -> StoreResult<Vec<MedicalRecord>> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = Self::get_decoded(&self.records, id.as_bytes())? {
                found.push(record);
            }
        }
        Ok(found)
    }

    async fn update_record_with(&self, id: &str, edit: Edit<MedicalRecord>) -> Result<Option<MedicalRecord>> {
        Self::update_with(&self.records, id, edit)
    }

    async fn delete_record(&self, id: &str) -> StoreResult<bool> {
        let Some(record) = Self::get_decoded::<MedicalRecord>(&self.records, id.as_bytes())? else {
            return Ok(false);
        };
        let owner_key = compound_key(&record.owner, record.id.as_bytes());
        (&self.records, &self.owner_records)
            .transaction(|(records, owner_records)| {
                records.remove(record.id.as_bytes())?;
                owner_records.remove(owner_key.as_slice())?;
                Ok::<_, ConflictableTransactionError<StoreError>>(())
            })
            .map_err(transaction_error)?;
        Ok(true)
    }

    async fn records_by_owner(&self, owner: &str) -> StoreResult<Vec<MedicalRecord>> {
        let mut owned = Vec::new();
        for item in self.owner_records.scan_prefix(owner_prefix(owner)) {
            let (_, id) = item?;
            if let Some(record) = Self::get_decoded(&self.records, &id)? {
                owned.push(record);
            }
        }
        Ok(owned)
    }

    async fn records_shared_with(&self, grantee: &str) -> StoreResult<Vec<MedicalRecord>> {
        let all: Vec<MedicalRecord> = Self::scan_decoded(&self.records)?;
        Ok(all
            .into_iter()
            .filter(|r| r.shared_with.iter().any(|g| g.grantee == grantee))
            .collect())
    }

    async fn pending_deletions(&self) -> StoreResult<Vec<MedicalRecord>> {
        let all: Vec<MedicalRecord> = Self::scan_decoded(&self.records)?;
        Ok(all.into_iter().filter(|r| r.pending_deletion).collect())
    }
}

#[async_trait]
impl TokenStorage for SledStorage {
    async fn insert_token(&self, token: &AccessToken) -> StoreResult<()> {
        let bytes = encode(token)?;
        (&self.tokens, &self.token_strings)
            .transaction(|(tokens, strings)| {
                if strings.get(token.token.as_bytes())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(StoreError::Conflict(
                        "token string".to_string(),
                    )));
                }
                strings.insert(token.token.as_bytes(), token.id.as_bytes())?;
                tokens.insert(token.id.as_bytes(), bytes.as_slice())?;
                Ok(())
            })
            .map_err(transaction_error)
    }

    async fn get_token(&self, id: &str) -> StoreResult<Option<AccessToken>> {
        Self::get_decoded(&self.tokens, id.as_bytes())
    }

    async fn find_token(&self, token: &str) -> StoreResult<Option<AccessToken>> {
        match self.token_strings.get(token.as_bytes())? {
            Some(id) => Self::get_decoded(&self.tokens, &id),
            None => Ok(None),
        }
    }

    async fn tokens_by_owner(&self, owner: &str) -> StoreResult<Vec<AccessToken>> {
        let all: Vec<AccessToken> = Self::scan_decoded(&self.tokens)?;
        Ok(all.into_iter().filter(|t| t.owner == owner).collect())
    }

    async fn update_token_with(&self, id: &str, edit: Edit<AccessToken>) -> Result<Option<AccessToken>> {
        Self::update_with(&self.tokens, id, edit)
    }
}

#[async_trait]
impl AccessLogStorage for SledStorage {
    async fn append_entry(&self, entry: &AccessLogEntry) -> StoreResult<()> {
        let seq = self.db.generate_id()?;
        let key = compound_key(&entry.owner, &seq.to_be_bytes());
        self.access_logs.insert(key, encode(entry)?)?;
        Ok(())
    }

    async fn entries_for_owner(&self, owner: &str) -> StoreResult<Vec<AccessLogEntry>> {
        self.access_logs
            .scan_prefix(owner_prefix(owner))
            .rev()
            .map(|item| {
                let (_, bytes) = item?;
                decode(&bytes)
            })
            .collect()
    }
}

#[async_trait]
impl FileStorage for SledStorage {
    async fn insert_file(&self, file: &StoredFile) -> StoreResult<()> {
        self.files.insert(file.id.as_bytes(), encode(file)?)?;
        Ok(())
    }

    async fn get_file(&self, id: &str) -> StoreResult<Option<StoredFile>> {
        Self::get_decoded(&self.files, id.as_bytes())
    }

    async fn delete_file(&self, id: &str) -> StoreResult<bool> {
        Ok(self.files.remove(id.as_bytes())?.is_some())
    }
}

impl Datastore for SledStorage {
    fn engine_name(&self) -> &'static str {
        "Sled"
    }
}
