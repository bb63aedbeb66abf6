//! Cluster gateway
//!
//! Thin capability interface over the Kubernetes API: apply, read, and
//! delete the resource kinds the orchestrator manages, discover ingress
//! addresses, and read the raw status signals the aggregator folds. No
//! business logic lives here; callers own idempotence decisions such as
//! swallowing 404s on delete.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::manifest::{Manifest, ResourceKind};
use crate::status::{DeploymentStatusView, PodView, StatusCondition};
use crate::{Error, Result, FIELD_MANAGER, MANAGED_BY_LABEL, MANAGED_BY_VALUE};

/// Label selector matching every resource this orchestrator manages
pub fn managed_selector() -> String {
    format!("{MANAGED_BY_LABEL}={MANAGED_BY_VALUE}")
}

/// Capability interface over the orchestration platform's API
///
/// One method group per resource kind and verb. Every method suspends on
/// network I/O; none retries internally. 404s surface as
/// [`Error::NotFound`] so callers can distinguish them from other failures.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// Create a resource from a manifest
    async fn create(&self, manifest: &Manifest) -> Result<()>;

    /// Merge-patch an existing resource with a manifest
    async fn patch(&self, manifest: &Manifest) -> Result<()>;

    /// Replace an existing resource with a manifest (full overwrite)
    async fn replace(&self, manifest: &Manifest) -> Result<()>;

    /// Delete a resource by kind and name
    async fn delete(&self, kind: ResourceKind, name: &str) -> Result<()>;

    /// Resolve the external address of an ingress service
    ///
    /// Returns the load-balancer IP, falling back to its hostname. Fails
    /// with [`Error::IngressUnresolved`] when the service exposes neither.
    async fn discover_ingress_host(&self, name: &str, namespace: &str) -> Result<String>;

    /// Read the status conditions of a serving resource
    async fn serving_conditions(&self, name: &str) -> Result<Vec<StatusCondition>>;

    /// Read a core Service, failing with [`Error::NotFound`] if absent
    async fn read_service(&self, name: &str) -> Result<()>;

    /// Read a deployment's status signals
    async fn deployment_status(&self, name: &str) -> Result<DeploymentStatusView>;

    /// List pods matching a label selector
    async fn list_pods(&self, label_selector: &str) -> Result<Vec<PodView>>;

    /// Patch a deployment's scale subresource
    async fn scale_deployment(&self, name: &str, replicas: i32) -> Result<()>;

    /// List the names of managed resources of one kind
    async fn list_managed(&self, kind: ResourceKind) -> Result<Vec<String>>;
}

/// Real gateway wrapping a [`kube::Client`]
///
/// Writes go through [`DynamicObject`] with a static kind-to-ApiResource
/// mapping so one code path covers typed and custom resources alike; status
/// reads use the typed APIs.
pub struct KubeGateway {
    client: Client,
    namespace: String,
}

impl KubeGateway {
    /// Create a gateway scoped to the managed-service namespace
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn dynamic_api(&self, kind: ResourceKind) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), &self.namespace, &kind.api_resource())
    }

    fn to_dynamic(manifest: &Manifest) -> Result<DynamicObject> {
        serde_json::from_value(manifest.to_object())
            .map_err(|e| Error::ClusterRequestInvalid(format!("invalid manifest body: {e}")))
    }
}

#[async_trait]
impl ClusterGateway for KubeGateway {
    async fn create(&self, manifest: &Manifest) -> Result<()> {
        let api = self.dynamic_api(manifest.resource);
        api.create(&PostParams::default(), &Self::to_dynamic(manifest)?)
            .await?;
        debug!(kind = %manifest.resource, name = %manifest.name, "created resource");
        Ok(())
    }

    async fn patch(&self, manifest: &Manifest) -> Result<()> {
        let api = self.dynamic_api(manifest.resource);
        api.patch(
            &manifest.name,
            &PatchParams::default(),
            &Patch::Merge(manifest.to_object()),
        )
        .await?;
        debug!(kind = %manifest.resource, name = %manifest.name, "patched resource");
        Ok(())
    }

    async fn replace(&self, manifest: &Manifest) -> Result<()> {
        let api = self.dynamic_api(manifest.resource);
        // Replace requires the live resourceVersion for optimistic
        // concurrency, so read the current object first.
        let existing = api.get(&manifest.name).await?;
        let mut object = Self::to_dynamic(manifest)?;
        object.metadata.resource_version = existing.metadata.resource_version;
        api.replace(&manifest.name, &PostParams::default(), &object)
            .await?;
        debug!(kind = %manifest.resource, name = %manifest.name, "replaced resource");
        Ok(())
    }

    async fn delete(&self, kind: ResourceKind, name: &str) -> Result<()> {
        let api = self.dynamic_api(kind);
        api.delete(name, &DeleteParams::default()).await?;
        debug!(kind = %kind, name = %name, "deleted resource");
        Ok(())
    }

    async fn discover_ingress_host(&self, name: &str, namespace: &str) -> Result<String> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let service = api.get(name).await?;

        let ingress = service
            .status
            .and_then(|s| s.load_balancer)
            .and_then(|lb| lb.ingress)
            .unwrap_or_default();

        ingress
            .into_iter()
            .next()
            .and_then(|entry| entry.ip.or(entry.hostname))
            .ok_or_else(|| {
                Error::ingress_unresolved(format!(
                    "ingress {namespace}/{name} has no load balancer address"
                ))
            })
    }

    async fn serving_conditions(&self, name: &str) -> Result<Vec<StatusCondition>> {
        let api = self.dynamic_api(ResourceKind::ServingService);
        let object = api.get(name).await?;

        let conditions = object
            .data
            .get("status")
            .and_then(|s| s.get("conditions"))
            .cloned()
            .unwrap_or(serde_json::Value::Array(Vec::new()));

        serde_json::from_value(conditions)
            .map_err(|e| Error::ClusterUnavailable(format!("unreadable serving status: {e}")))
    }

    async fn read_service(&self, name: &str) -> Result<()> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), &self.namespace);
        api.get(name).await?;
        Ok(())
    }

    async fn deployment_status(&self, name: &str) -> Result<DeploymentStatusView> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &self.namespace);
        let deployment = api.get_status(name).await?;
        let status = deployment.status.unwrap_or_default();

        Ok(DeploymentStatusView {
            replicas: status.replicas.unwrap_or(0),
            conditions: status
                .conditions
                .unwrap_or_default()
                .into_iter()
                .map(|c| StatusCondition {
                    type_: c.type_,
                    status: c.status,
                    message: c.message.unwrap_or_default(),
                    reason: c.reason.unwrap_or_default(),
                })
                .collect(),
        })
    }

    async fn list_pods(&self, label_selector: &str) -> Result<Vec<PodView>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        let pods = api
            .list(&ListParams::default().labels(label_selector))
            .await?;

        Ok(pods
            .items
            .into_iter()
            .map(|pod| {
                let status = pod.status.unwrap_or_default();
                PodView {
                    name: pod.metadata.name.unwrap_or_default(),
                    phase: status.phase,
                    conditions: status
                        .conditions
                        .unwrap_or_default()
                        .into_iter()
                        .map(|c| StatusCondition {
                            type_: c.type_,
                            status: c.status,
                            message: c.message.unwrap_or_default(),
                            reason: c.reason.unwrap_or_default(),
                        })
                        .collect(),
                }
            })
            .collect())
    }

    async fn scale_deployment(&self, name: &str, replicas: i32) -> Result<()> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &self.namespace);
        let patch = serde_json::json!({ "spec": { "replicas": replicas } });
        api.patch_scale(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn list_managed(&self, kind: ResourceKind) -> Result<Vec<String>> {
        let api = self.dynamic_api(kind);
        let objects = api
            .list(&ListParams::default().labels(&managed_selector()))
            .await?;

        Ok(objects
            .items
            .into_iter()
            .filter_map(|o| o.metadata.name)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{render, RenderInput};
    use crate::record::ServiceBackend;

    /// Story: every rendered manifest converts into a DynamicObject the
    /// dynamic API accepts.
    #[test]
    fn story_manifests_convert_to_dynamic_objects() {
        let input = RenderInput {
            service_name: "svc",
            namespace: "inference",
            image_uri: "img:v1",
            container_port: 8080,
            env: &[],
            num_gpus: 1,
        };
        for backend in [ServiceBackend::Knative, ServiceBackend::Emissary] {
            for manifest in render(&input, backend).unwrap() {
                let object = KubeGateway::to_dynamic(&manifest).unwrap();
                assert_eq!(object.metadata.name.as_deref(), Some(manifest.name.as_str()));
                assert_eq!(object.metadata.namespace.as_deref(), Some("inference"));
            }
        }
    }

    /// Story: serving conditions parse from the raw condition documents the
    /// serving resource reports.
    #[test]
    fn story_serving_conditions_parse_from_raw_json() {
        let raw = serde_json::json!([
            { "type": "ConfigurationsReady", "status": "True" },
            { "type": "Ready", "status": "False",
              "message": "Revision failed", "reason": "RevisionFailed" },
        ]);
        let conditions: Vec<StatusCondition> = serde_json::from_value(raw).unwrap();
        assert_eq!(conditions.len(), 2);
        assert!(conditions[0].is_true());
        assert_eq!(conditions[1].reason, "RevisionFailed");
    }

    #[test]
    fn managed_selector_matches_manifest_labels() {
        let input = RenderInput {
            service_name: "svc",
            namespace: "inference",
            image_uri: "img:v1",
            container_port: 8080,
            env: &[],
            num_gpus: 0,
        };
        let set = render(&input, ServiceBackend::Emissary).unwrap();
        let (key, value) = managed_selector()
            .split_once('=')
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .unwrap();
        for manifest in set {
            assert_eq!(manifest.labels.get(&key), Some(&value));
        }
    }
}
