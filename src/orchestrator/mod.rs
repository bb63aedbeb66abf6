//! Lifecycle orchestration
//!
//! [`LifecycleOrchestrator`] is the backend-agnostic entry point for every
//! lifecycle operation. It owns the link between the record store and the
//! per-variant [`BackendStrategy`]: the record-store transaction is the
//! commit point of each operation, cluster mutations are compensable side
//! effects, and the orphan sweep is the compensating pass.
//!
//! Concurrent calls against independent service names are safe. Calls
//! against the same name are not mutually excluded here: the store gives
//! at-most-one-winner semantics for the record write, and cluster-side
//! races are accepted (no per-name lock, matching the record-store-first
//! consistency model).

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::backend::{self, ApplyMode, BackendStrategy};
use crate::config::OrchestratorConfig;
use crate::gateway::ClusterGateway;
use crate::identity::{Identity, UserRole};
use crate::manifest::{generate_service_name, uncased_to_snake_case};
use crate::orphan::OrphanReconciler;
use crate::record::{RecordPatch, ServiceBackend, ServiceRecord, ServiceSpec, ServiceUpdate};
use crate::status::ServiceStatus;
use crate::store::RecordStore;
use crate::{Error, Result, MAX_SCALE_REPLICAS};

/// Backend-agnostic lifecycle operations over managed services
pub struct LifecycleOrchestrator {
    store: Arc<dyn RecordStore>,
    gateway: Arc<dyn ClusterGateway>,
    config: Arc<OrchestratorConfig>,
}

impl LifecycleOrchestrator {
    /// Create an orchestrator over the given store, gateway, and config
    pub fn new(
        store: Arc<dyn RecordStore>,
        gateway: Arc<dyn ClusterGateway>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            config: Arc::new(config),
        }
    }

    fn strategy(&self, backend: ServiceBackend) -> Box<dyn BackendStrategy> {
        backend::strategy_for(backend, self.gateway.clone(), self.config.clone())
    }

    /// Variant for a record, falling back to the configured default when the
    /// record predates the backend field
    fn backend_of(&self, record: &ServiceRecord) -> ServiceBackend {
        record.backend.unwrap_or(self.config.default_backend)
    }

    /// Create a service: cluster resources first, then the record
    ///
    /// On any cluster-side failure no record is written and no compensating
    /// cluster cleanup is attempted; stranded sub-resources are reclaimed by
    /// the orphan sweep.
    #[instrument(skip(self, identity, spec), fields(owner = %identity.user_id))]
    pub async fn create(&self, identity: &Identity, spec: &ServiceSpec) -> Result<ServiceRecord> {
        if identity.user_id.is_empty() {
            return Err(Error::forbidden("authentication required"));
        }
        if self.config.namespace.is_empty() {
            return Err(Error::NamespaceRequired);
        }

        let service_name = generate_service_name(&identity.user_id, &spec.model_id);
        let backend = self.config.default_backend;
        let strategy = self.strategy(backend);

        let endpoint = strategy.resolve_endpoint(&service_name).await?;
        let now = Utc::now();
        let record = ServiceRecord {
            service_name: service_name.clone(),
            owner_id: identity.user_id.clone(),
            model_id: uncased_to_snake_case(&spec.model_id),
            image_uri: spec.image_uri.clone(),
            container_port: spec.container_port,
            env: spec.env.clone(),
            num_gpus: spec.num_gpus,
            backend: Some(backend),
            protocol: endpoint.protocol,
            host: endpoint.host,
            path: endpoint.path,
            inference_url: endpoint.inference_url,
            created: now,
            last_modified: now,
        };

        strategy.apply(&record, ApplyMode::Create).await?;

        let mut tx = self.store.begin().await?;
        tx.insert_one(&record).await?;
        tx.commit().await?;

        info!(service = %service_name, backend = %backend, "created service");
        Ok(record)
    }

    /// Fetch a record, refreshing its inference URL from live ingress state
    ///
    /// URL recomputation is best-effort: on a cluster failure the stored
    /// URL is returned unchanged.
    pub async fn get(&self, service_name: &str) -> Result<ServiceRecord> {
        let mut record = self
            .store
            .find_one(service_name)
            .await?
            .ok_or_else(|| Error::not_found(format!("service {service_name} not found")))?;

        let backend = self.config.default_backend;
        let protocol = if record.protocol.is_empty() {
            self.config.default_protocol.clone()
        } else {
            record.protocol.clone()
        };
        match backend::resolve_host(self.gateway.as_ref(), &self.config, backend).await {
            Ok(host) => {
                record.inference_url = backend::inference_url(
                    backend,
                    &protocol,
                    &host,
                    &record.service_name,
                    &self.config.namespace,
                    self.config.domain.is_some(),
                );
            }
            Err(err) => {
                warn!(service = %service_name, error = %err,
                    "ingress lookup failed, returning stored inference url");
            }
        }
        Ok(record)
    }

    /// List every managed service record
    pub async fn list(&self) -> Result<Vec<ServiceRecord>> {
        self.store.list().await
    }

    /// Aggregate the live status of a service
    pub async fn get_status(&self, service_name: &str) -> Result<ServiceStatus> {
        let record = self
            .store
            .find_one(service_name)
            .await?
            .ok_or_else(|| Error::not_found(format!("service {service_name} not found")))?;
        self.strategy(self.backend_of(&record))
            .status(service_name)
            .await
    }

    /// Update a service from a partial descriptor
    ///
    /// The configured default backend always overrides the record's stored
    /// backend, so a record's topology can change on any update after the
    /// process-wide configuration changes; a backend change forces replace
    /// semantics for every sub-resource. An empty descriptor, or one that
    /// changes nothing, returns the record untouched without any cluster
    /// call.
    #[instrument(skip(self, identity, update), fields(caller = %identity.user_id))]
    pub async fn update(
        &self,
        identity: &Identity,
        service_name: &str,
        update: &ServiceUpdate,
    ) -> Result<ServiceRecord> {
        let existing = self
            .store
            .find_one(service_name)
            .await?
            .ok_or_else(|| Error::not_found(format!("service {service_name} not found")))?;
        if !identity.may_access(&existing.owner_id) {
            return Err(Error::forbidden(
                "user does not have owner access to service",
            ));
        }
        if update.is_empty() {
            return Ok(existing);
        }

        let backend = self.config.default_backend;
        let recreate = backend != self.backend_of(&existing);
        let strategy = self.strategy(backend);
        let endpoint = strategy.resolve_endpoint(service_name).await?;

        let mut tx = self.store.begin().await?;
        if tx.find_one(service_name).await?.is_none() {
            return Err(Error::not_found(format!("service {service_name} not found")));
        }

        let patch = RecordPatch {
            image_uri: update.image_uri.clone(),
            container_port: update.container_port,
            env: update.env.clone(),
            num_gpus: update.num_gpus,
            backend: Some(backend),
            protocol: Some(endpoint.protocol),
            host: Some(endpoint.host),
            inference_url: Some(endpoint.inference_url),
            last_modified: None,
        };
        let modified = tx.update_one(service_name, &patch).await?;
        if modified == 0 {
            // Nothing would change; leave last_modified alone and skip the
            // cluster entirely.
            tx.commit().await?;
            return Ok(existing);
        }
        tx.update_one(
            service_name,
            &RecordPatch {
                last_modified: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await?;

        let updated = tx
            .find_one(service_name)
            .await?
            .ok_or_else(|| Error::store("updated record vanished mid-transaction"))?;

        let mode = if recreate {
            ApplyMode::Replace
        } else {
            ApplyMode::Patch
        };
        if let Err(err) = strategy.apply(&updated, mode).await {
            // Surface the cluster error; a failed abort is secondary.
            if let Err(abort_err) = tx.abort().await {
                warn!(service = %service_name, error = %abort_err, "transaction abort failed");
            }
            return Err(err);
        }
        tx.commit().await?;

        info!(service = %service_name, backend = %backend, recreate, "updated service");
        self.spawn_orphan_sweep();
        Ok(updated)
    }

    /// Delete a service record and its cluster resources
    ///
    /// The record delete is the commit point: once it commits, cluster-side
    /// deletion failures are tolerated and logged, and any remnants are
    /// reclaimed by the orphan sweep. Deleting an absent or half-created
    /// service is safe.
    #[instrument(skip(self, identity), fields(caller = %identity.user_id))]
    pub async fn delete(&self, identity: &Identity, service_name: &str) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let existing = tx.find_one(service_name).await?;
        if let Some(record) = &existing {
            if !identity.may_access(&record.owner_id) {
                return Err(Error::forbidden(
                    "user does not have owner access to service",
                ));
            }
        }
        let backend = existing
            .as_ref()
            .and_then(|r| r.backend)
            .unwrap_or(self.config.default_backend);

        tx.delete_one(service_name).await?;
        tx.commit().await?;

        if let Err(err) = self.strategy(backend).delete(service_name).await {
            warn!(service = %service_name, error = %err,
                "cluster cleanup failed after record delete, leaving remnants to the orphan sweep");
        }
        info!(service = %service_name, "deleted service");
        Ok(())
    }

    /// Re-create the cluster resources for an existing record
    ///
    /// Uses the variant stored on the record and tolerates sub-resources
    /// that still exist, so restoring a partially-deleted service is safe.
    #[instrument(skip(self))]
    pub async fn restore(&self, service_name: &str) -> Result<ServiceRecord> {
        let record = self
            .store
            .find_one(service_name)
            .await?
            .ok_or_else(|| Error::not_found(format!("service {service_name} not found")))?;

        let backend = self.backend_of(&record);
        self.strategy(backend)
            .apply(&record, ApplyMode::Restore)
            .await?;

        info!(service = %service_name, backend = %backend, "restored service");
        Ok(record)
    }

    /// Scale a service's workload within the allowed replica range
    pub async fn scale(&self, service_name: &str, replicas: i32) -> Result<()> {
        if !(0..=MAX_SCALE_REPLICAS).contains(&replicas) {
            return Err(Error::ClusterRequestInvalid(format!(
                "replicas must be between 0 and {MAX_SCALE_REPLICAS}"
            )));
        }
        let record = self
            .store
            .find_one(service_name)
            .await?
            .ok_or_else(|| Error::not_found(format!("service {service_name} not found")))?;
        self.strategy(self.backend_of(&record))
            .scale(service_name, replicas)
            .await
    }

    /// Admin-only sweep of cluster resources with no record-store entry
    pub async fn sweep_orphans(&self, identity: &Identity) -> Result<u64> {
        if identity.role != UserRole::Admin {
            return Err(Error::forbidden(
                "user does not have sufficient privilege to clear orphan services",
            ));
        }
        self.reconciler().run().await
    }

    fn reconciler(&self) -> OrphanReconciler {
        OrphanReconciler::new(self.store.clone(), self.gateway.clone())
    }

    /// Fire-and-forget orphan sweep; never blocks or fails the caller
    fn spawn_orphan_sweep(&self) {
        let reconciler = self.reconciler();
        tokio::spawn(async move {
            if let Err(err) = reconciler.run().await {
                warn!(error = %err, "background orphan sweep failed");
            }
        });
    }
}
