// lib/src/services/mod.rs

pub mod access_log;
pub mod access_tokens;
pub mod records;
pub mod seed;

pub use access_log::AccessLogRecorder;
pub use access_tokens::{
    holder_channel, AccessTokenManager, EmergencyAccessEvent, IssuedToken, ResolvedAccess, TokenPolicy, TokenSummary,
};
pub use records::{FileDownload, RecordService};

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::storage_engine::{BlobStorage, Datastore, Storage};

/// Every service wired against one storage backend and one clock.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn Datastore>,
    pub blobs: Arc<dyn BlobStorage>,
    pub clock: Arc<dyn Clock>,
    pub log: AccessLogRecorder,
    pub records: RecordService,
    pub tokens: AccessTokenManager,
}

impl Services {
    pub fn new(storage: Storage, config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let Storage { data, blobs } = storage;
        let log = AccessLogRecorder::new(data.clone());
        let records = RecordService::new(
            data.clone(),
            blobs.clone(),
            log.clone(),
            clock.clone(),
            config.uploads.max_file_size,
        );
        let tokens = AccessTokenManager::new(
            data.clone(),
            records.clone(),
            log.clone(),
            clock.clone(),
            TokenPolicy::from_config(config),
        );
        Services { store: data, blobs, clock, log, records, tokens }
    }
}
