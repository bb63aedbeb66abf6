//! In-memory record store
//!
//! Backs tests and single-process deployments. Transactions stage writes in
//! an overlay map and apply them under one write lock on commit, which gives
//! the same per-document atomicity and at-most-one-winner guarantees the
//! production document store provides.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::record::{RecordPatch, ServiceRecord};
use crate::{Error, Result};

use super::{RecordStore, RecordTransaction};

type Collection = Arc<RwLock<BTreeMap<String, ServiceRecord>>>;

/// In-memory implementation of [`RecordStore`]
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Collection,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing records (test fixtures, migrations)
    pub async fn seed(&self, records: impl IntoIterator<Item = ServiceRecord>) {
        let mut map = self.records.write().await;
        for record in records {
            map.insert(record.service_name.clone(), record);
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_one(&self, service_name: &str) -> Result<Option<ServiceRecord>> {
        Ok(self.records.read().await.get(service_name).cloned())
    }

    async fn list(&self) -> Result<Vec<ServiceRecord>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn begin(&self) -> Result<Box<dyn RecordTransaction>> {
        Ok(Box::new(MemoryTransaction {
            records: self.records.clone(),
            // None marks a staged delete
            pending: BTreeMap::new(),
            inserted: Vec::new(),
            finished: false,
        }))
    }
}

struct MemoryTransaction {
    records: Collection,
    pending: BTreeMap<String, Option<ServiceRecord>>,
    inserted: Vec<String>,
    finished: bool,
}

impl MemoryTransaction {
    fn check_open(&self) -> Result<()> {
        if self.finished {
            return Err(Error::store("transaction already finished"));
        }
        Ok(())
    }

    /// Current view of one record: staged overlay first, committed map second
    async fn effective(&self, service_name: &str) -> Option<ServiceRecord> {
        match self.pending.get(service_name) {
            Some(staged) => staged.clone(),
            None => self.records.read().await.get(service_name).cloned(),
        }
    }
}

#[async_trait]
impl RecordTransaction for MemoryTransaction {
    async fn find_one(&mut self, service_name: &str) -> Result<Option<ServiceRecord>> {
        self.check_open()?;
        Ok(self.effective(service_name).await)
    }

    async fn insert_one(&mut self, record: &ServiceRecord) -> Result<()> {
        self.check_open()?;
        if self.effective(&record.service_name).await.is_some() {
            return Err(Error::DuplicateService(record.service_name.clone()));
        }
        self.inserted.push(record.service_name.clone());
        self.pending
            .insert(record.service_name.clone(), Some(record.clone()));
        Ok(())
    }

    async fn update_one(&mut self, service_name: &str, patch: &RecordPatch) -> Result<u64> {
        self.check_open()?;
        let Some(mut record) = self.effective(service_name).await else {
            return Ok(0);
        };
        if !patch.apply(&mut record) {
            return Ok(0);
        }
        self.pending.insert(service_name.to_string(), Some(record));
        Ok(1)
    }

    async fn delete_one(&mut self, service_name: &str) -> Result<bool> {
        self.check_open()?;
        let existed = self.effective(service_name).await.is_some();
        if existed {
            self.pending.insert(service_name.to_string(), None);
        }
        Ok(existed)
    }

    async fn commit(&mut self) -> Result<()> {
        self.check_open()?;
        self.finished = true;
        let mut map = self.records.write().await;
        // Re-check the unique constraint under the write lock: a concurrent
        // transaction may have committed the same name first.
        for name in &self.inserted {
            if map.contains_key(name) {
                return Err(Error::DuplicateService(name.clone()));
            }
        }
        for (name, staged) in std::mem::take(&mut self.pending) {
            match staged {
                Some(record) => {
                    map.insert(name, record);
                }
                None => {
                    map.remove(&name);
                }
            }
        }
        Ok(())
    }

    async fn abort(&mut self) -> Result<()> {
        self.check_open()?;
        self.finished = true;
        self.pending.clear();
        self.inserted.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::sample_record;

    /// Story: a committed insert is visible; an aborted one is not.
    #[tokio::test]
    async fn story_commit_publishes_abort_discards() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_one(&sample_record("svc-a")).await.unwrap();
        tx.commit().await.unwrap();
        assert!(store.find_one("svc-a").await.unwrap().is_some());

        let mut tx = store.begin().await.unwrap();
        tx.insert_one(&sample_record("svc-b")).await.unwrap();
        tx.abort().await.unwrap();
        assert!(store.find_one("svc-b").await.unwrap().is_none());
    }

    /// Story: reads inside a transaction observe earlier staged writes,
    /// the way session-scoped reads do in the document store.
    #[tokio::test]
    async fn story_transaction_reads_own_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        tx.insert_one(&sample_record("svc")).await.unwrap();
        assert!(tx.find_one("svc").await.unwrap().is_some());

        assert!(tx.delete_one("svc").await.unwrap());
        assert!(tx.find_one("svc").await.unwrap().is_none());
    }

    /// Story: two transactions insert the same name; the second committer
    /// loses with DuplicateService.
    #[tokio::test]
    async fn story_concurrent_insert_has_one_winner() {
        let store = MemoryStore::new();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.insert_one(&sample_record("svc")).await.unwrap();
        second.insert_one(&sample_record("svc")).await.unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(matches!(err, Error::DuplicateService(_)));
    }

    /// Story: patching a record to its current values reports zero modified,
    /// which the orchestrator uses as its no-op short-circuit.
    #[tokio::test]
    async fn story_identical_patch_reports_zero_modified() {
        let store = MemoryStore::new();
        store.seed([sample_record("svc")]).await;

        let record = store.find_one("svc").await.unwrap().unwrap();
        let mut tx = store.begin().await.unwrap();
        let patch = RecordPatch {
            image_uri: Some(record.image_uri.clone()),
            ..Default::default()
        };
        assert_eq!(tx.update_one("svc", &patch).await.unwrap(), 0);

        let patch = RecordPatch {
            image_uri: Some("registry.local/mnist:v2".to_string()),
            ..Default::default()
        };
        assert_eq!(tx.update_one("svc", &patch).await.unwrap(), 1);
        tx.commit().await.unwrap();

        let updated = store.find_one("svc").await.unwrap().unwrap();
        assert_eq!(updated.image_uri, "registry.local/mnist:v2");
    }

    /// Story: deleting an absent record reports false rather than erroring,
    /// keeping the delete path idempotent end to end.
    #[tokio::test]
    async fn story_delete_absent_record_is_false_not_error() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        assert!(!tx.delete_one("ghost").await.unwrap());
        tx.commit().await.unwrap();
    }
}
