// lib/src/services/access_log.rs

use std::sync::Arc;

use log::{debug, error};
use models::medical::AccessLogEntry;

use crate::errors::Result;
use crate::storage_engine::Datastore;

/// Append-only front of the access log.
#[derive(Clone)]
pub struct AccessLogRecorder {
    store: Arc<dyn Datastore>,
}

impl AccessLogRecorder {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        AccessLogRecorder { store }
    }

    /// A failed append fails the surrounding operation; an audit gap is
    /// never silent.
    pub async fn record(&self, entry: AccessLogEntry) -> Result<()> {
        debug!(
            "access-log {:?} owner={} record={:?} actor={:?}",
            entry.action, entry.owner, entry.record, entry.actor
        );
        self.store.append_entry(&entry).await.map_err(|e| {
            error!("Failed to append access log entry {:?}: {}", entry.action, e);
            e.into()
        })
    }

    pub async fn entries_for(&self, owner: &str) -> Result<Vec<AccessLogEntry>> {
        Ok(self.store.entries_for_owner(owner).await?)
    }
}
