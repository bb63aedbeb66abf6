//! Orphan reconciliation
//!
//! The record store is the source of truth: any managed-labeled cluster
//! resource whose derived service name has no record is an orphan (the
//! residue of a failed create, a tolerated delete failure, or an out-of-band
//! record removal) and gets deleted. The sweep runs in the background after
//! updates and on demand for privileged callers.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::gateway::ClusterGateway;
use crate::manifest::{service_name_of, ResourceKind};
use crate::store::RecordStore;
use crate::Result;

/// Kinds swept, routing layers before workloads so traffic stops first.
const SWEPT_KINDS: [ResourceKind; 4] = [
    ResourceKind::ServingService,
    ResourceKind::Mapping,
    ResourceKind::Service,
    ResourceKind::Deployment,
];

/// Deletes managed cluster resources that have no backing record
pub struct OrphanReconciler {
    store: Arc<dyn RecordStore>,
    gateway: Arc<dyn ClusterGateway>,
}

impl OrphanReconciler {
    /// Create a reconciler over the given store and gateway
    pub fn new(store: Arc<dyn RecordStore>, gateway: Arc<dyn ClusterGateway>) -> Self {
        Self { store, gateway }
    }

    /// Run one sweep, returning the number of resources deleted
    ///
    /// A failure on one resource or kind never aborts the rest of the
    /// sweep; every remnant is retried on the next pass. The record set is
    /// snapshotted before listing resources, so a create racing this sweep
    /// can only lose its resources if its record never commits, which is
    /// exactly the failed-create case the sweep exists to clean up.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<u64> {
        let known: BTreeSet<String> = self
            .store
            .list()
            .await?
            .into_iter()
            .map(|record| record.service_name)
            .collect();

        let mut removed = 0u64;
        for kind in SWEPT_KINDS {
            let names = match self.gateway.list_managed(kind).await {
                Ok(names) => names,
                Err(err) => {
                    warn!(kind = %kind, error = %err, "listing managed resources failed");
                    continue;
                }
            };
            for name in names {
                if known.contains(&service_name_of(kind, &name)) {
                    continue;
                }
                match self.gateway.delete(kind, &name).await {
                    Ok(()) => {
                        info!(kind = %kind, name = %name, "deleted orphan resource");
                        removed += 1;
                    }
                    Err(err) if err.is_not_found() => {
                        debug!(kind = %kind, name = %name, "orphan already gone");
                    }
                    Err(err) => {
                        warn!(kind = %kind, name = %name, error = %err,
                            "deleting orphan resource failed");
                    }
                }
            }
        }

        if removed > 0 {
            info!(removed, "orphan sweep finished");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockClusterGateway;
    use crate::record::tests::sample_record;
    use crate::store::MemoryStore;
    use crate::Error;

    fn reconciler(store: MemoryStore, gateway: MockClusterGateway) -> OrphanReconciler {
        OrphanReconciler::new(Arc::new(store), Arc::new(gateway))
    }

    /// Story: a half-created triplet with no record is swept; the recorded
    /// service's resources survive, including its suffixed sub-resources.
    #[tokio::test]
    async fn story_sweep_deletes_only_unrecorded_resources() {
        let store = MemoryStore::new();
        store.seed([sample_record("kept")]).await;

        let mut gateway = MockClusterGateway::new();
        gateway
            .expect_list_managed()
            .returning(|kind| match kind {
                ResourceKind::Deployment => Ok(vec![
                    "kept-deployment".to_string(),
                    "orphan-deployment".to_string(),
                ]),
                ResourceKind::Service => Ok(vec!["kept".to_string(), "orphan".to_string()]),
                ResourceKind::Mapping => Ok(vec!["orphan-ingress".to_string()]),
                ResourceKind::ServingService => Ok(Vec::new()),
            });
        gateway
            .expect_delete()
            .withf(|_, name| name.starts_with("orphan"))
            .times(3)
            .returning(|_, _| Ok(()));

        let removed = reconciler(store, gateway).run().await.unwrap();
        assert_eq!(removed, 3);
    }

    /// Story: one kind failing to list does not stop the sweep of the
    /// others, and 404s on delete are not failures.
    #[tokio::test]
    async fn story_sweep_survives_partial_failures() {
        let mut gateway = MockClusterGateway::new();
        gateway.expect_list_managed().returning(|kind| match kind {
            ResourceKind::ServingService => {
                Err(Error::ClusterUnavailable("apiserver timeout".to_string()))
            }
            ResourceKind::Deployment => Ok(vec![
                "gone-deployment".to_string(),
                "orphan-deployment".to_string(),
            ]),
            _ => Ok(Vec::new()),
        });
        gateway
            .expect_delete()
            .withf(|_, name| name == "gone-deployment")
            .returning(|_, name| Err(Error::not_found(format!("{name} not found"))));
        gateway
            .expect_delete()
            .withf(|_, name| name == "orphan-deployment")
            .returning(|_, _| Ok(()));

        let removed = reconciler(MemoryStore::new(), gateway)
            .run()
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }

    /// Story: an empty cluster sweeps to zero without a single delete.
    #[tokio::test]
    async fn story_sweep_of_clean_cluster_deletes_nothing() {
        let mut gateway = MockClusterGateway::new();
        gateway.expect_list_managed().returning(|_| Ok(Vec::new()));

        let removed = reconciler(MemoryStore::new(), gateway)
            .run()
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }
}
