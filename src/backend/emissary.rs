//! Emissary backend
//!
//! Exposes a service as a Deployment + Service + Mapping triplet. Resources
//! are written in creation order (deployment, service, mapping) and deleted
//! in reverse; status aggregates deployment conditions and pod signals.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::OrchestratorConfig;
use crate::gateway::ClusterGateway;
use crate::manifest::{deployment_name, mapping_name, render, RenderInput, ResourceKind};
use crate::record::{ServiceBackend, ServiceRecord};
use crate::status::ServiceStatus;
use crate::Result;

use super::{apply_set, delete_set, ApplyMode, BackendStrategy, Endpoint};

/// Strategy for the deployment/service/mapping triplet topology
pub struct EmissaryBackend {
    gateway: Arc<dyn ClusterGateway>,
    config: Arc<OrchestratorConfig>,
}

impl EmissaryBackend {
    /// Create an Emissary strategy
    pub fn new(gateway: Arc<dyn ClusterGateway>, config: Arc<OrchestratorConfig>) -> Self {
        Self { gateway, config }
    }
}

#[async_trait]
impl BackendStrategy for EmissaryBackend {
    fn backend(&self) -> ServiceBackend {
        ServiceBackend::Emissary
    }

    async fn resolve_endpoint(&self, service_name: &str) -> Result<Endpoint> {
        super::resolve_endpoint(
            self.gateway.as_ref(),
            &self.config,
            ServiceBackend::Emissary,
            service_name,
        )
        .await
    }

    async fn apply(&self, record: &ServiceRecord, mode: ApplyMode) -> Result<()> {
        let input = RenderInput::from_record(&self.config.namespace, record);
        let set = render(&input, ServiceBackend::Emissary)?;
        apply_set(self.gateway.as_ref(), &set, mode).await?;
        info!(
            service = %record.service_name,
            mode = ?mode,
            resources = set.len(),
            "applied service triplet"
        );
        Ok(())
    }

    async fn delete(&self, service_name: &str) -> Result<()> {
        delete_set(
            self.gateway.as_ref(),
            &[
                (ResourceKind::Mapping, mapping_name(service_name)),
                (ResourceKind::Service, service_name.to_string()),
                (ResourceKind::Deployment, deployment_name(service_name)),
            ],
        )
        .await
    }

    async fn status(&self, service_name: &str) -> Result<ServiceStatus> {
        // Existence check first: a missing Service means the whole triplet
        // is gone and the caller gets a plain not-found.
        self.gateway.read_service(service_name).await?;

        let mut status = ServiceStatus::new(service_name);
        let deployment = self
            .gateway
            .deployment_status(&deployment_name(service_name))
            .await?;
        status.fold_deployment(&deployment);

        let pods = self
            .gateway
            .list_pods(&format!("app={service_name}"))
            .await?;
        for pod in &pods {
            status.fold_pod(pod);
        }
        Ok(status)
    }

    async fn scale(&self, service_name: &str, replicas: i32) -> Result<()> {
        self.gateway
            .scale_deployment(&deployment_name(service_name), replicas)
            .await?;
        info!(service = %service_name, replicas, "scaled deployment");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockClusterGateway;
    use crate::record::tests::sample_record;
    use crate::status::{DeploymentStatusView, PodView, StatusCondition};
    use crate::Error;
    use mockall::Sequence;

    fn backend_with(gateway: MockClusterGateway) -> EmissaryBackend {
        EmissaryBackend::new(
            Arc::new(gateway),
            Arc::new(OrchestratorConfig::new("inference")),
        )
    }

    /// Story: create writes deployment, then service, then mapping, the
    /// fixed order that keeps partial failures diagnosable.
    #[tokio::test]
    async fn story_create_applies_triplet_in_order() {
        let mut gateway = MockClusterGateway::new();
        let mut seq = Sequence::new();
        for kind in [
            ResourceKind::Deployment,
            ResourceKind::Service,
            ResourceKind::Mapping,
        ] {
            gateway
                .expect_create()
                .withf(move |m| m.resource == kind)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(()));
        }

        let backend = backend_with(gateway);
        backend
            .apply(&sample_record("svc"), ApplyMode::Create)
            .await
            .unwrap();
    }

    /// Story: a failed service create surfaces immediately; the mapping is
    /// never attempted and nothing is rolled back here.
    #[tokio::test]
    async fn story_partial_create_failure_surfaces_without_rollback() {
        let mut gateway = MockClusterGateway::new();
        gateway
            .expect_create()
            .withf(|m| m.resource == ResourceKind::Deployment)
            .times(1)
            .returning(|_| Ok(()));
        gateway
            .expect_create()
            .withf(|m| m.resource == ResourceKind::Service)
            .times(1)
            .returning(|_| Err(Error::ClusterUnavailable("apiserver timeout".to_string())));
        // No expectation for the mapping: it must not be created.

        let backend = backend_with(gateway);
        let err = backend
            .apply(&sample_record("svc"), ApplyMode::Create)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ClusterUnavailable(_)));
    }

    /// Story: update with recreate uses replace for every sub-resource.
    #[tokio::test]
    async fn story_recreate_replaces_every_resource() {
        let mut gateway = MockClusterGateway::new();
        gateway.expect_replace().times(3).returning(|_| Ok(()));

        let backend = backend_with(gateway);
        backend
            .apply(&sample_record("svc"), ApplyMode::Replace)
            .await
            .unwrap();
    }

    /// Story: deleting twice is safe; every 404 is swallowed.
    #[tokio::test]
    async fn story_double_delete_is_idempotent() {
        let mut gateway = MockClusterGateway::new();
        gateway.expect_delete().times(6).returning(|kind, name| {
            Err(Error::not_found(format!("{kind} \"{name}\" not found")))
        });

        let backend = backend_with(gateway);
        backend.delete("svc").await.unwrap();
        backend.delete("svc").await.unwrap();
    }

    /// Story: a non-404 delete failure aborts the remaining deletes.
    #[tokio::test]
    async fn story_delete_aborts_on_real_failure() {
        let mut gateway = MockClusterGateway::new();
        gateway
            .expect_delete()
            .withf(|kind, _| *kind == ResourceKind::Mapping)
            .times(1)
            .returning(|_, _| Err(Error::ClusterUnavailable("connection refused".to_string())));
        // Service and deployment deletes must not run.

        let backend = backend_with(gateway);
        let err = backend.delete("svc").await.unwrap_err();
        assert!(matches!(err, Error::ClusterUnavailable(_)));
    }

    /// Story: status checks the service exists, folds deployment
    /// conditions, and folds pod signals with last-pod-wins phase.
    #[tokio::test]
    async fn story_status_aggregates_deployment_and_pods() {
        let mut gateway = MockClusterGateway::new();
        gateway.expect_read_service().returning(|_| Ok(()));
        gateway.expect_deployment_status().returning(|_| {
            Ok(DeploymentStatusView {
                replicas: 2,
                conditions: vec![StatusCondition::new("Available", "True")],
            })
        });
        gateway.expect_list_pods().returning(|_| {
            Ok(vec![
                PodView {
                    name: "svc-1".to_string(),
                    phase: Some("Running".to_string()),
                    conditions: vec![StatusCondition::new("PodScheduled", "True")],
                },
                PodView {
                    name: "svc-2".to_string(),
                    phase: Some("Pending".to_string()),
                    conditions: vec![StatusCondition::new("PodScheduled", "False")
                        .with_detail("insufficient nvidia.com/gpu", "Unschedulable")],
                },
            ])
        });

        let backend = backend_with(gateway);
        let status = backend.status("svc").await.unwrap();
        assert!(status.ready);
        assert!(!status.schedulable);
        assert_eq!(status.expected_replicas, Some(2));
        assert_eq!(status.status.as_deref(), Some("Pending"));
        assert!(status.message.contains("Unschedulable"));
    }

    /// Story: a missing Service fails status with not-found before any
    /// deployment or pod read.
    #[tokio::test]
    async fn story_status_requires_service_to_exist() {
        let mut gateway = MockClusterGateway::new();
        gateway
            .expect_read_service()
            .returning(|_| Err(Error::not_found("services \"svc\" not found")));

        let backend = backend_with(gateway);
        let err = backend.status("svc").await.unwrap_err();
        assert!(err.is_not_found());
    }

    /// Story: scale patches the deployment's scale subresource.
    #[tokio::test]
    async fn story_scale_targets_the_deployment() {
        let mut gateway = MockClusterGateway::new();
        gateway
            .expect_scale_deployment()
            .withf(|name, replicas| name == "svc-deployment" && *replicas == 2)
            .times(1)
            .returning(|_, _| Ok(()));

        let backend = backend_with(gateway);
        backend.scale("svc", 2).await.unwrap();
    }
}
