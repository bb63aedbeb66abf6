//! Knative backend
//!
//! Exposes a service as a single `serving.knative.dev/v1` Service. The
//! serving controller owns workload and routing, so lifecycle operations
//! touch exactly one resource and status comes from its condition list.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::OrchestratorConfig;
use crate::gateway::ClusterGateway;
use crate::manifest::{render, RenderInput, ResourceKind};
use crate::record::{ServiceBackend, ServiceRecord};
use crate::status::ServiceStatus;
use crate::Result;

use super::{apply_set, delete_set, ApplyMode, BackendStrategy, Endpoint};

/// Strategy for the declarative serving topology
pub struct KnativeBackend {
    gateway: Arc<dyn ClusterGateway>,
    config: Arc<OrchestratorConfig>,
}

impl KnativeBackend {
    /// Create a Knative strategy
    pub fn new(gateway: Arc<dyn ClusterGateway>, config: Arc<OrchestratorConfig>) -> Self {
        Self { gateway, config }
    }
}

#[async_trait]
impl BackendStrategy for KnativeBackend {
    fn backend(&self) -> ServiceBackend {
        ServiceBackend::Knative
    }

    async fn resolve_endpoint(&self, service_name: &str) -> Result<Endpoint> {
        super::resolve_endpoint(
            self.gateway.as_ref(),
            &self.config,
            ServiceBackend::Knative,
            service_name,
        )
        .await
    }

    async fn apply(&self, record: &ServiceRecord, mode: ApplyMode) -> Result<()> {
        let input = RenderInput::from_record(&self.config.namespace, record);
        let set = render(&input, ServiceBackend::Knative)?;
        apply_set(self.gateway.as_ref(), &set, mode).await?;
        info!(service = %record.service_name, mode = ?mode, "applied serving service");
        Ok(())
    }

    async fn delete(&self, service_name: &str) -> Result<()> {
        delete_set(
            self.gateway.as_ref(),
            &[(ResourceKind::ServingService, service_name.to_string())],
        )
        .await
    }

    async fn status(&self, service_name: &str) -> Result<ServiceStatus> {
        let conditions = self.gateway.serving_conditions(service_name).await?;
        let mut status = ServiceStatus::new(service_name);
        status.fold_serving_conditions(&conditions);
        Ok(status)
    }

    async fn scale(&self, service_name: &str, _replicas: i32) -> Result<()> {
        // The serving controller owns replica counts; nothing to do here.
        warn!(service = %service_name, "scale is a no-op for knative services");
        Ok(())
    }
}
