// lib/src/storage_engine/mod.rs

pub mod blob_storage;
pub mod inmemory_storage;
pub mod sled_storage;
pub mod storage_engine;

pub use blob_storage::DiskBlobStorage;
pub use inmemory_storage::{InMemoryBlobStorage, InMemoryStorage};
pub use sled_storage::{open_sled_db, SledStorage};
pub use storage_engine::{
    edit, AccessLogStorage, BlobStorage, Datastore, Edit, FileStorage, RecordStorage, TokenStorage, UserStorage,
};

use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;

use crate::config::{StorageConfig, StorageEngineType};

/// The document store plus the blob store it pairs with.
#[derive(Clone)]
pub struct Storage {
    pub data: Arc<dyn Datastore>,
    pub blobs: Arc<dyn BlobStorage>,
}

impl Storage {
    pub fn in_memory() -> Self {
        Storage {
            data: Arc::new(InMemoryStorage::new()),
            blobs: Arc::new(InMemoryBlobStorage::new()),
        }
    }
}

/// Creates a storage engine instance based on the provided configuration.
///
/// Sled stores its blobs on disk under `uploads_directory`; the in-memory
/// engine keeps both documents and blobs in process.
pub fn create_storage(config: &StorageConfig) -> Result<Storage> {
    let storage = match config.engine {
        StorageEngineType::Sled => {
            let db = open_sled_db(&config.data_directory)
                .with_context(|| format!("failed to open sled at {:?}", config.data_directory))?;
            Storage {
                data: Arc::new(SledStorage::new(db)?),
                blobs: Arc::new(DiskBlobStorage::new(config.uploads_directory.clone())),
            }
        }
        StorageEngineType::Memory => Storage::in_memory(),
    };
    info!("Using {} storage engine", storage.data.engine_name());
    Ok(storage)
}
