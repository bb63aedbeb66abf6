//! Orchestrator configuration
//!
//! Process-wide settings for the lifecycle orchestrator. The configured
//! default backend is deliberately authoritative on update: every update
//! rewrites the record's backend to match it (see
//! [`LifecycleOrchestrator::update`](crate::orchestrator::LifecycleOrchestrator::update)).

use crate::record::ServiceBackend;

/// Process-wide orchestrator settings
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Namespace all managed resources live in; empty means unconfigured
    /// and fails create with `NamespaceRequired`
    pub namespace: String,
    /// Backend used for new services and forced onto updated ones
    pub default_backend: ServiceBackend,
    /// URL scheme for generated inference endpoints
    pub default_protocol: String,
    /// Explicit external domain; when set, ingress discovery is skipped
    /// and no wildcard-DNS suffix is appended to Knative hostnames
    pub domain: Option<String>,
    /// Ingress service name overriding the per-backend default
    pub ingress_name: Option<String>,
    /// Namespace of the overriding ingress service
    pub ingress_namespace: Option<String>,
}

impl OrchestratorConfig {
    /// Create a config for the given namespace with standard defaults
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            default_backend: ServiceBackend::Emissary,
            default_protocol: "http".to_string(),
            domain: None,
            ingress_name: None,
            ingress_namespace: None,
        }
    }

    /// Set the default backend
    pub fn with_default_backend(mut self, backend: ServiceBackend) -> Self {
        self.default_backend = backend;
        self
    }

    /// Set the URL scheme for generated endpoints
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.default_protocol = protocol.into();
        self
    }

    /// Set an explicit external domain
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Override the ingress service used for host discovery
    pub fn with_ingress(
        mut self,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        self.ingress_name = Some(name.into());
        self.ingress_namespace = Some(namespace.into());
        self
    }

    /// Build a config from `BERTH_*` environment variables
    ///
    /// Recognized: `BERTH_NAMESPACE`, `BERTH_BACKEND` (`knative` |
    /// `emissary`), `BERTH_PROTOCOL`, `BERTH_DOMAIN`, `BERTH_INGRESS_NAME`,
    /// `BERTH_INGRESS_NAMESPACE`. Unset variables keep their defaults.
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Self::new(std::env::var("BERTH_NAMESPACE").unwrap_or_default());
        if let Ok(backend) = std::env::var("BERTH_BACKEND") {
            config.default_backend = backend.parse()?;
        }
        if let Ok(protocol) = std::env::var("BERTH_PROTOCOL") {
            config.default_protocol = protocol;
        }
        if let Ok(domain) = std::env::var("BERTH_DOMAIN") {
            if !domain.is_empty() {
                config.domain = Some(domain);
            }
        }
        if let (Ok(name), Ok(namespace)) = (
            std::env::var("BERTH_INGRESS_NAME"),
            std::env::var("BERTH_INGRESS_NAMESPACE"),
        ) {
            config = config.with_ingress(name, namespace);
        }
        Ok(config)
    }

    /// The configured ingress override, when both halves are set
    pub fn ingress_override(&self) -> Option<(&str, &str)> {
        match (&self.ingress_name, &self.ingress_namespace) {
            (Some(name), Some(namespace)) => Some((name.as_str(), namespace.as_str())),
            _ => None,
        }
    }
}
