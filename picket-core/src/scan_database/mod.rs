//! Persistence for scan summaries.
//!
//! The Task Engine keeps running scans in memory and only consults the
//! database for scans it no longer holds, so implementations see whole-record
//! reads and writes keyed by scan id and nothing else.

mod files;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use picket_config::{DatabaseConfig, DatabaseKind};
use picket_model::{ScanId, ScanSummary};
use thiserror::Error;

pub use files::FileScanDatabase;
pub use memory::MemoryScanDatabase;

#[derive(Debug, Error)]
pub enum ScanDatabaseError {
    #[error("scan storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored scan is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("scan storage worker failed: {0}")]
    Worker(String),

    #[error("the files scan database needs a location")]
    MissingLocation,
}

pub type Result<T> = std::result::Result<T, ScanDatabaseError>;

#[async_trait]
pub trait ScanDatabase: Send + Sync + std::fmt::Debug {
    async fn load(&self, id: ScanId) -> Result<Option<ScanSummary>>;

    /// Insert or replace the record for `summary.id`.
    async fn store(&self, summary: &ScanSummary) -> Result<()>;

    /// Returns whether a record existed.
    async fn delete(&self, id: ScanId) -> Result<bool>;
}

/// Build the backend named by `config`.
pub fn from_config(config: &DatabaseConfig) -> Result<Arc<dyn ScanDatabase>> {
    match config.kind {
        DatabaseKind::Memory => Ok(Arc::new(MemoryScanDatabase::new())),
        DatabaseKind::Files => {
            let location = config
                .location
                .as_ref()
                .ok_or(ScanDatabaseError::MissingLocation)?;
            Ok(Arc::new(FileScanDatabase::open(location)?))
        }
    }
}
