//! Manifest rendering for managed services
//!
//! Pure construction of the concrete Kubernetes resource bodies a backend
//! variant needs: one Knative Service, or a Deployment + Service + Emissary
//! Mapping triplet. Rendering never touches the cluster or the record store;
//! identical inputs produce structurally identical output.

use std::collections::BTreeMap;

use kube::discovery::ApiResource;
use serde_json::{json, Value};

use crate::record::{EnvVar, ServiceBackend, ServiceRecord, ServiceSpec};
use crate::{Error, Result, MANAGED_BY_LABEL, MANAGED_BY_VALUE};

/// Maximum length of a generated service name
///
/// 40 characters of `owner-model` prefix plus a `-xxxx` random suffix. Short
/// enough that the derived `<name>-deployment` stays within the 63-character
/// Kubernetes name limit.
pub const MAX_SERVICE_NAME_LEN: usize = 45;

/// The resource kinds this orchestrator manages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// apps/v1 Deployment
    Deployment,
    /// core v1 Service
    Service,
    /// serving.knative.dev/v1 Service
    ServingService,
    /// getambassador.io/v2 Mapping
    Mapping,
}

impl ResourceKind {
    /// API group/version string as it appears in manifests
    pub fn api_version(&self) -> &'static str {
        match self {
            Self::Deployment => "apps/v1",
            Self::Service => "v1",
            Self::ServingService => "serving.knative.dev/v1",
            Self::Mapping => "getambassador.io/v2",
        }
    }

    /// Kubernetes kind name
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Deployment => "Deployment",
            Self::Service | Self::ServingService => "Service",
            Self::Mapping => "Mapping",
        }
    }

    /// Plural resource name used in API paths
    pub fn plural(&self) -> &'static str {
        match self {
            Self::Deployment => "deployments",
            Self::Service | Self::ServingService => "services",
            Self::Mapping => "mappings",
        }
    }

    /// ApiResource for dynamic API access
    pub fn api_resource(&self) -> ApiResource {
        let (group, version) = match self {
            Self::Deployment => ("apps", "v1"),
            Self::Service => ("", "v1"),
            Self::ServingService => ("serving.knative.dev", "v1"),
            Self::Mapping => ("getambassador.io", "v2"),
        };
        ApiResource {
            group: group.to_string(),
            version: version.to_string(),
            api_version: self.api_version().to_string(),
            kind: self.kind().to_string(),
            plural: self.plural().to_string(),
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.kind())
    }
}

/// One concrete resource body, ready to apply through the gateway
#[derive(Clone, Debug, PartialEq)]
pub struct Manifest {
    /// Which managed kind this is
    pub resource: ResourceKind,
    /// Resource name
    pub name: String,
    /// Resource namespace
    pub namespace: String,
    /// Labels applied to the resource metadata
    pub labels: BTreeMap<String, String>,
    /// The resource `spec` body
    pub spec: Value,
}

impl Manifest {
    /// Create a manifest with the standard managed-service labels
    pub fn new(
        resource: ResourceKind,
        name: impl Into<String>,
        namespace: impl Into<String>,
        service_name: &str,
    ) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), service_name.to_string());
        labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());
        Self {
            resource,
            name: name.into(),
            namespace: namespace.into(),
            labels,
            spec: Value::Null,
        }
    }

    /// Set the spec body
    pub fn with_spec(mut self, spec: Value) -> Self {
        self.spec = spec;
        self
    }

    /// Assemble the full Kubernetes object for this manifest
    pub fn to_object(&self) -> Value {
        json!({
            "apiVersion": self.resource.api_version(),
            "kind": self.resource.kind(),
            "metadata": {
                "name": self.name,
                "namespace": self.namespace,
                "labels": self.labels,
            },
            "spec": self.spec,
        })
    }
}

/// Borrowed view of the fields manifest rendering needs
///
/// Built from a create descriptor or from a stored record so both paths
/// render through the same code.
#[derive(Clone, Copy, Debug)]
pub struct RenderInput<'a> {
    /// Service name (already generated and normalized)
    pub service_name: &'a str,
    /// Target namespace
    pub namespace: &'a str,
    /// Container image
    pub image_uri: &'a str,
    /// Container port
    pub container_port: u16,
    /// Container environment
    pub env: &'a [EnvVar],
    /// Requested GPU count
    pub num_gpus: u32,
}

impl<'a> RenderInput<'a> {
    /// View over a create descriptor
    pub fn from_spec(service_name: &'a str, namespace: &'a str, spec: &'a ServiceSpec) -> Self {
        Self {
            service_name,
            namespace,
            image_uri: &spec.image_uri,
            container_port: spec.container_port,
            env: &spec.env,
            num_gpus: spec.num_gpus,
        }
    }

    /// View over a stored record
    pub fn from_record(namespace: &'a str, record: &'a ServiceRecord) -> Self {
        Self {
            service_name: &record.service_name,
            namespace,
            image_uri: &record.image_uri,
            container_port: record.container_port,
            env: &record.env,
            num_gpus: record.num_gpus,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.service_name.is_empty() {
            return Err(Error::template("service name is required"));
        }
        if self.image_uri.is_empty() {
            return Err(Error::template("image uri is required"));
        }
        if self.container_port == 0 {
            return Err(Error::template("container port is required"));
        }
        Ok(())
    }

    /// Container body shared by the Knative template and the Deployment
    fn container(&self) -> Value {
        let env: Vec<Value> = self
            .env
            .iter()
            .map(|var| json!({ "name": var.name, "value": var.value }))
            .collect();
        let mut container = json!({
            "image": self.image_uri,
            "ports": [{ "containerPort": self.container_port }],
            "env": env,
        });
        if self.num_gpus > 0 {
            container["resources"] = json!({
                "limits": { "nvidia.com/gpu": self.num_gpus }
            });
        }
        container
    }
}

/// Render the ordered resource set for a service under the given backend
///
/// The order of the returned manifests is the order they must be applied in:
/// deployment, then service, then mapping for Emissary; a single resource
/// for Knative.
pub fn render(input: &RenderInput<'_>, backend: ServiceBackend) -> Result<Vec<Manifest>> {
    input.validate()?;
    match backend {
        ServiceBackend::Knative => Ok(vec![render_serving_service(input)]),
        ServiceBackend::Emissary => Ok(vec![
            render_deployment(input),
            render_service(input),
            render_mapping(input),
        ]),
    }
}

fn render_serving_service(input: &RenderInput<'_>) -> Manifest {
    Manifest::new(
        ResourceKind::ServingService,
        input.service_name,
        input.namespace,
        input.service_name,
    )
    .with_spec(json!({
        "template": {
            "metadata": {
                "labels": { "app": input.service_name }
            },
            "spec": {
                "containers": [input.container()]
            }
        }
    }))
}

fn render_deployment(input: &RenderInput<'_>) -> Manifest {
    Manifest::new(
        ResourceKind::Deployment,
        deployment_name(input.service_name),
        input.namespace,
        input.service_name,
    )
    .with_spec(json!({
        "replicas": 1,
        "selector": {
            "matchLabels": { "app": input.service_name }
        },
        "template": {
            "metadata": {
                "labels": {
                    "app": input.service_name,
                    MANAGED_BY_LABEL: MANAGED_BY_VALUE,
                }
            },
            "spec": {
                "containers": [{
                    "name": input.service_name,
                    "image": input.image_uri,
                    "ports": [{ "containerPort": input.container_port }],
                    "env": input.env.iter()
                        .map(|var| json!({ "name": var.name, "value": var.value }))
                        .collect::<Vec<_>>(),
                    "resources": if input.num_gpus > 0 {
                        json!({ "limits": { "nvidia.com/gpu": input.num_gpus } })
                    } else {
                        json!({})
                    },
                }]
            }
        }
    }))
}

fn render_service(input: &RenderInput<'_>) -> Manifest {
    Manifest::new(
        ResourceKind::Service,
        input.service_name,
        input.namespace,
        input.service_name,
    )
    .with_spec(json!({
        "selector": { "app": input.service_name },
        "ports": [{
            "port": input.container_port,
            "targetPort": input.container_port,
            "protocol": "TCP",
        }]
    }))
}

fn render_mapping(input: &RenderInput<'_>) -> Manifest {
    Manifest::new(
        ResourceKind::Mapping,
        mapping_name(input.service_name),
        input.namespace,
        input.service_name,
    )
    .with_spec(json!({
        "prefix": format!("/{}/", input.service_name),
        "service": format!("{}:{}", input.service_name, input.container_port),
    }))
}

/// Deployment name for a service
pub fn deployment_name(service_name: &str) -> String {
    format!("{service_name}-deployment")
}

/// Mapping name for a service
pub fn mapping_name(service_name: &str) -> String {
    format!("{service_name}-ingress")
}

/// Recover the service name a managed resource belongs to
///
/// Inverse of the name derivation above; used by the orphan sweep to map
/// cluster resources back to record-store entries.
pub fn service_name_of(kind: ResourceKind, resource_name: &str) -> String {
    let stripped = match kind {
        ResourceKind::Deployment => resource_name.strip_suffix("-deployment"),
        ResourceKind::Mapping => resource_name.strip_suffix("-ingress"),
        ResourceKind::Service | ResourceKind::ServingService => None,
    };
    stripped.unwrap_or(resource_name).to_string()
}

/// Normalize a string to Kubernetes resource-name rules
///
/// Lowercase alphanumerics and dashes, no leading or trailing dash, runs of
/// invalid characters collapsed to one dash.
pub fn k8s_safe_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = true; // suppress a leading dash
    for ch in name.chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Generate a unique, length-bounded service name for an owner + model pair
///
/// `owner-model` truncated to 40 characters, then a dash and 4 random hex
/// characters, normalized to Kubernetes naming rules. The random suffix
/// keeps repeated deployments of the same model distinct.
pub fn generate_service_name(owner_id: &str, model_id: &str) -> String {
    let prefix: String = format!("{owner_id}-{model_id}").chars().take(40).collect();
    let suffix: String = uuid::Uuid::new_v4().simple().to_string()[..4].to_string();
    k8s_safe_name(&format!("{prefix}-{suffix}"))
}

/// Normalize a free-form model title to a snake_case identifier
pub fn uncased_to_snake_case(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut last_sep = true;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_sep = false;
        } else if !last_sep {
            out.push('_');
            last_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}
