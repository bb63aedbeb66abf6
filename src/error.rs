//! Error types for the berth orchestrator

use thiserror::Error;

/// Main error type for berth operations
///
/// Every operation on the lifecycle surface maps its failures into one of
/// these kinds so that the embedding transport layer can translate them into
/// stable wire responses without inspecting message text.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A record or a required sub-resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Identity is neither the record owner nor a privileged role
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A service with the same name already exists
    #[error("duplicate service: {0}")]
    DuplicateService(String),

    /// Manifest rendering failed due to a missing or invalid descriptor field
    #[error("template error: {0}")]
    Template(String),

    /// No domain or ingress configuration could be resolved to an address
    #[error("ingress unresolved: {0}")]
    IngressUnresolved(String),

    /// Transport or authorization failure talking to the cluster (retryable)
    #[error("cluster unavailable: {0}")]
    ClusterUnavailable(String),

    /// The cluster rejected a malformed manifest or request (not retryable)
    #[error("cluster rejected request: {0}")]
    ClusterRequestInvalid(String),

    /// No namespace is configured for managed services
    #[error("no namespace configured for managed services")]
    NamespaceRequired,

    /// Record store failure
    #[error("record store error: {0}")]
    Store(String),
}

impl Error {
    /// Create a not-found error with the given message
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a forbidden error with the given message
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Create a template error with the given message
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    /// Create an ingress-resolution error with the given message
    pub fn ingress_unresolved(msg: impl Into<String>) -> Self {
        Self::IngressUnresolved(msg.into())
    }

    /// Create a record store error with the given message
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// True if this error means the target resource does not exist
    ///
    /// Delete paths swallow these to stay idempotent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// True if this error means the resource already exists
    ///
    /// Restore paths swallow these when re-applying manifests best-effort.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::DuplicateService(_))
    }
}

/// Classify a Kubernetes API error into the berth taxonomy
///
/// 404 must stay distinguishable from other failures so that delete and
/// restore can absorb it; 409 stays distinguishable so restore can treat
/// already-present sub-resources as success.
impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) => match ae.code {
                404 => Self::NotFound(ae.message),
                409 => Self::DuplicateService(ae.message),
                400 | 422 => Self::ClusterRequestInvalid(ae.message),
                _ => Self::ClusterUnavailable(ae.message),
            },
            other => Self::ClusterUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use kube::core::ErrorResponse;

    fn api_error(code: u16, message: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: message.to_string(),
            reason: String::new(),
            code,
        })
    }

    /// Story: deleting an already-gone sub-resource classifies as NotFound,
    /// which the delete path swallows to stay idempotent.
    #[test]
    fn story_cluster_404_is_absorbable_not_found() {
        let err: Error = api_error(404, "deployments \"svc-deployment\" not found").into();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("not found"));
    }

    /// Story: restoring a service whose deployment survived classifies the
    /// 409 as already-exists so restore can continue with the next resource.
    #[test]
    fn story_cluster_409_is_absorbable_already_exists() {
        let err: Error = api_error(409, "deployments \"svc-deployment\" already exists").into();
        assert!(err.is_already_exists());
        assert!(!err.is_not_found());
    }

    /// Story: a malformed manifest is rejected permanently; the caller must
    /// fix the request rather than retry it.
    #[test]
    fn story_malformed_request_is_not_retryable() {
        let err: Error = api_error(422, "spec.containers is required").into();
        match err {
            Error::ClusterRequestInvalid(msg) => assert!(msg.contains("containers")),
            other => panic!("expected ClusterRequestInvalid, got {other:?}"),
        }
    }

    /// Story: auth and transport failures surface as ClusterUnavailable,
    /// which the caller may retry.
    #[test]
    fn story_auth_failure_is_retryable_unavailable() {
        let err: Error = api_error(403, "forbidden by RBAC").into();
        assert!(matches!(err, Error::ClusterUnavailable(_)));

        let err: Error = api_error(503, "apiserver overloaded").into();
        assert!(matches!(err, Error::ClusterUnavailable(_)));
    }

    /// Story: helper constructors accept both String and &str
    #[test]
    fn story_error_construction_ergonomics() {
        let name = "u1-mnist-a1b2";
        let err = Error::not_found(format!("service {name} not found"));
        assert!(err.to_string().contains(name));

        let err = Error::forbidden("user does not have owner access to service");
        assert!(err.to_string().contains("owner access"));
    }
}
