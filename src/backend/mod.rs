//! Backend strategies
//!
//! One [`BackendStrategy`] implementation per resource topology hides the
//! structural differences between the Knative single-resource model and the
//! Emissary deployment/service/mapping triplet behind a common contract.
//! The orchestrator selects a strategy per record and never branches on the
//! backend itself.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use crate::config::OrchestratorConfig;
use crate::gateway::ClusterGateway;
use crate::manifest::{Manifest, ResourceKind};
use crate::record::{ServiceBackend, ServiceRecord};
use crate::status::ServiceStatus;
use crate::{
    Result, DEFAULT_EMISSARY_INGRESS, DEFAULT_EMISSARY_INGRESS_NAMESPACE,
    DEFAULT_KNATIVE_INGRESS, DEFAULT_KNATIVE_INGRESS_NAMESPACE, WILDCARD_DNS_SUFFIX,
};

mod emissary;
mod knative;

pub use emissary::EmissaryBackend;
pub use knative::KnativeBackend;

/// How a resource set is written to the cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyMode {
    /// Create fresh resources; any conflict is an error
    Create,
    /// Incremental merge-patch of existing resources
    Patch,
    /// Full replace of existing resources (backend changes require this)
    Replace,
    /// Best-effort re-creation; already-present sub-resources are skipped
    Restore,
}

/// Routing endpoint computed for a service
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    /// URL scheme
    pub protocol: String,
    /// External host
    pub host: String,
    /// Routing path segment (equals the service name)
    pub path: String,
    /// Fully assembled inference URL
    pub inference_url: String,
}

/// Per-variant lifecycle operations
///
/// Implementations own manifest shape, apply order, and status-signal
/// sources for their topology. They do not touch the record store.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BackendStrategy: Send + Sync {
    /// The topology this strategy serves
    fn backend(&self) -> ServiceBackend;

    /// Resolve the external endpoint for a service under this topology
    async fn resolve_endpoint(&self, service_name: &str) -> Result<Endpoint>;

    /// Render and write the resource set for a record
    ///
    /// Resources are written in a fixed variant-defined order. Partial
    /// failure is surfaced, not rolled back; compensating cleanup is the
    /// caller's job via the idempotent [`delete`](Self::delete).
    async fn apply(&self, record: &ServiceRecord, mode: ApplyMode) -> Result<()>;

    /// Delete every resource the variant owns for a service
    ///
    /// Already-absent sub-resources are skipped; any other failure aborts
    /// the remaining deletes for this call (retries are safe).
    async fn delete(&self, service_name: &str) -> Result<()>;

    /// Aggregate the variant's readiness signals into one status
    async fn status(&self, service_name: &str) -> Result<ServiceStatus>;

    /// Scale the service's workload
    async fn scale(&self, service_name: &str, replicas: i32) -> Result<()>;
}

/// Build the strategy for a backend
pub fn strategy_for(
    backend: ServiceBackend,
    gateway: Arc<dyn ClusterGateway>,
    config: Arc<OrchestratorConfig>,
) -> Box<dyn BackendStrategy> {
    match backend {
        ServiceBackend::Knative => Box::new(KnativeBackend::new(gateway, config)),
        ServiceBackend::Emissary => Box::new(EmissaryBackend::new(gateway, config)),
    }
}

/// Resolve the external host for a backend
///
/// An explicit configured domain wins outright. Otherwise the configured
/// ingress override, falling back to the variant's conventional ingress, is
/// queried for its load-balancer address.
pub(crate) async fn resolve_host(
    gateway: &dyn ClusterGateway,
    config: &OrchestratorConfig,
    backend: ServiceBackend,
) -> Result<String> {
    if let Some(domain) = &config.domain {
        return Ok(domain.clone());
    }
    let (name, namespace) = match config.ingress_override() {
        Some(pair) => pair,
        None => match backend {
            ServiceBackend::Knative => (DEFAULT_KNATIVE_INGRESS, DEFAULT_KNATIVE_INGRESS_NAMESPACE),
            ServiceBackend::Emissary => {
                (DEFAULT_EMISSARY_INGRESS, DEFAULT_EMISSARY_INGRESS_NAMESPACE)
            }
        },
    };
    gateway.discover_ingress_host(name, namespace).await
}

/// Assemble the inference URL for a service
///
/// Emissary routes by path and requires the trailing slash (without it the
/// routing layer mis-resolves relative static assets). Knative routes by
/// hostname; when no explicit domain is configured the wildcard-DNS suffix
/// turns the bare ingress IP into a resolvable name.
pub(crate) fn inference_url(
    backend: ServiceBackend,
    protocol: &str,
    host: &str,
    service_name: &str,
    namespace: &str,
    has_domain: bool,
) -> String {
    match backend {
        ServiceBackend::Emissary => format!("{protocol}://{host}/{service_name}/"),
        ServiceBackend::Knative => {
            let mut url = format!("{protocol}://{service_name}.{namespace}.{host}");
            if !has_domain {
                url.push_str(WILDCARD_DNS_SUFFIX);
            }
            url
        }
    }
}

/// Endpoint for a service: host resolution plus URL assembly
pub(crate) async fn resolve_endpoint(
    gateway: &dyn ClusterGateway,
    config: &OrchestratorConfig,
    backend: ServiceBackend,
    service_name: &str,
) -> Result<Endpoint> {
    let host = resolve_host(gateway, config, backend).await?;
    let url = inference_url(
        backend,
        &config.default_protocol,
        &host,
        service_name,
        &config.namespace,
        config.domain.is_some(),
    );
    Ok(Endpoint {
        protocol: config.default_protocol.clone(),
        host,
        path: service_name.to_string(),
        inference_url: url,
    })
}

/// Write a resource set in order under the given mode
pub(crate) async fn apply_set(
    gateway: &dyn ClusterGateway,
    manifests: &[Manifest],
    mode: ApplyMode,
) -> Result<()> {
    for manifest in manifests {
        match mode {
            ApplyMode::Create => gateway.create(manifest).await?,
            ApplyMode::Patch => gateway.patch(manifest).await?,
            ApplyMode::Replace => gateway.replace(manifest).await?,
            ApplyMode::Restore => match gateway.create(manifest).await {
                Ok(()) => {}
                Err(err) if err.is_already_exists() => {
                    warn!(
                        kind = %manifest.resource,
                        name = %manifest.name,
                        "resource already exists, keeping it"
                    );
                }
                Err(err) => return Err(err),
            },
        }
    }
    Ok(())
}

/// Delete a list of (kind, name) resources, skipping already-gone ones
///
/// Any failure other than not-found aborts the remaining deletes; the
/// caller may safely retry the whole call.
pub(crate) async fn delete_set(
    gateway: &dyn ClusterGateway,
    resources: &[(ResourceKind, String)],
) -> Result<()> {
    for (kind, name) in resources {
        match gateway.delete(*kind, name).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                debug!(kind = %kind, name = %name, "resource already gone");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Story: an explicit domain short-circuits ingress discovery entirely.
    #[tokio::test]
    async fn story_explicit_domain_skips_discovery() {
        let gateway = crate::gateway::MockClusterGateway::new();
        let config = OrchestratorConfig::new("inference").with_domain("models.example.com");

        let host = resolve_host(&gateway, &config, ServiceBackend::Knative)
            .await
            .unwrap();
        assert_eq!(host, "models.example.com");
    }

    /// Story: without a domain, the variant's conventional ingress service
    /// is queried for its address.
    #[tokio::test]
    async fn story_variant_default_ingress_is_discovered() {
        let mut gateway = crate::gateway::MockClusterGateway::new();
        gateway
            .expect_discover_ingress_host()
            .withf(|name, namespace| name == "kourier" && namespace == "kourier-system")
            .returning(|_, _| Ok("203.0.113.10".to_string()));
        let config = OrchestratorConfig::new("inference");

        let host = resolve_host(&gateway, &config, ServiceBackend::Knative)
            .await
            .unwrap();
        assert_eq!(host, "203.0.113.10");
    }

    /// Story: a configured ingress override takes the place of the variant
    /// default.
    #[tokio::test]
    async fn story_ingress_override_is_used() {
        let mut gateway = crate::gateway::MockClusterGateway::new();
        gateway
            .expect_discover_ingress_host()
            .withf(|name, namespace| name == "edge-lb" && namespace == "edge")
            .returning(|_, _| Ok("198.51.100.4".to_string()));
        let config = OrchestratorConfig::new("inference").with_ingress("edge-lb", "edge");

        let host = resolve_host(&gateway, &config, ServiceBackend::Emissary)
            .await
            .unwrap();
        assert_eq!(host, "198.51.100.4");
    }

    /// Story: Emissary URLs are path-routed with a mandatory trailing
    /// slash; Knative URLs are host-routed with the wildcard-DNS suffix
    /// only when no explicit domain exists.
    #[test]
    fn story_urls_follow_variant_routing() {
        assert_eq!(
            inference_url(
                ServiceBackend::Emissary,
                "http",
                "203.0.113.10",
                "svc",
                "inference",
                false
            ),
            "http://203.0.113.10/svc/"
        );
        assert_eq!(
            inference_url(
                ServiceBackend::Knative,
                "http",
                "203.0.113.10",
                "svc",
                "inference",
                false
            ),
            "http://svc.inference.203.0.113.10.sslip.io"
        );
        assert_eq!(
            inference_url(
                ServiceBackend::Knative,
                "https",
                "models.example.com",
                "svc",
                "inference",
                true
            ),
            "https://svc.inference.models.example.com"
        );
    }
}
