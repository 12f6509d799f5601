use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use picket_model::{ScanId, ScanSummary};

use super::{Result, ScanDatabase};

/// Process-lifetime storage; contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryScanDatabase {
    scans: RwLock<HashMap<ScanId, ScanSummary>>,
}

impl MemoryScanDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.scans.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.read().is_empty()
    }
}

#[async_trait]
impl ScanDatabase for MemoryScanDatabase {
    async fn load(&self, id: ScanId) -> Result<Option<ScanSummary>> {
        Ok(self.scans.read().get(&id).cloned())
    }

    async fn store(&self, summary: &ScanSummary) -> Result<()> {
        self.scans.write().insert(summary.id, summary.clone());
        Ok(())
    }

    async fn delete(&self, id: ScanId) -> Result<bool> {
        Ok(self.scans.write().remove(&id).is_some())
    }
}
