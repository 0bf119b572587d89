// lib/src/lib.rs

//! Storage engines, configuration and the services behind the records API:
//! record management, per-user grants, share and emergency tokens, and the
//! access log they all write to.

pub mod clock;
pub mod config;
pub mod errors;
pub mod services;
pub mod storage_engine;

pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::AppConfig;
pub use crate::errors::{Result, ServiceError, StoreError, StoreResult};
pub use crate::services::Services;
pub use crate::storage_engine::{create_storage, Storage};
