//! Record store abstraction
//!
//! The orchestrator talks to the persistent document store through the
//! narrow [`RecordStore`] / [`RecordTransaction`] contract only. The
//! production driver lives with the embedding service; this crate ships
//! [`MemoryStore`] for tests and single-process deployments.

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::record::{RecordPatch, ServiceRecord};
use crate::Result;

mod memory;

pub use memory::MemoryStore;

/// Handle to the persistent record collection
///
/// Implementations must provide per-document atomicity: the transaction
/// returned by [`begin`](RecordStore::begin) is the commit point of every
/// lifecycle saga, so a commit must be all-or-nothing.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Look up a record by service name
    async fn find_one(&self, service_name: &str) -> Result<Option<ServiceRecord>>;

    /// List every record in the collection
    async fn list(&self) -> Result<Vec<ServiceRecord>>;

    /// Start a scoped transaction
    ///
    /// Dropping the transaction without committing aborts it.
    async fn begin(&self) -> Result<Box<dyn RecordTransaction>>;
}

/// A scoped multi-step transaction against the record collection
///
/// Reads observe writes staged earlier in the same transaction.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RecordTransaction: Send {
    /// Look up a record by service name
    async fn find_one(&mut self, service_name: &str) -> Result<Option<ServiceRecord>>;

    /// Insert a new record
    ///
    /// Fails with [`Error::DuplicateService`](crate::Error::DuplicateService)
    /// when the unique service-name constraint is violated, either at staging
    /// time or by a concurrent writer at commit time.
    async fn insert_one(&mut self, record: &ServiceRecord) -> Result<()>;

    /// Apply a partial update to a record, returning the modified count
    ///
    /// Zero means the record was absent or every patched field already held
    /// its new value.
    async fn update_one(&mut self, service_name: &str, patch: &RecordPatch) -> Result<u64>;

    /// Delete a record, returning true if it existed
    async fn delete_one(&mut self, service_name: &str) -> Result<bool>;

    /// Commit every staged operation atomically
    async fn commit(&mut self) -> Result<()>;

    /// Discard every staged operation
    async fn abort(&mut self) -> Result<()>;
}
