//! Service status aggregation
//!
//! Normalizes the heterogeneous readiness signals of both backends (Knative
//! serving conditions, Deployment conditions, pod phases and scheduling
//! conditions) into one [`ServiceStatus`] read model. Recomputed on every
//! query, never persisted.

use serde::{Deserialize, Serialize};

/// A single status condition as reported by a cluster resource
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusCondition {
    /// Condition type (`Ready`, `Available`, `PodScheduled`, ...)
    #[serde(rename = "type")]
    pub type_: String,
    /// Condition status: `True`, `False`, or `Unknown`
    pub status: String,
    /// Human-readable detail
    #[serde(default)]
    pub message: String,
    /// Machine-readable reason
    #[serde(default)]
    pub reason: String,
}

impl StatusCondition {
    /// Create a condition
    pub fn new(type_: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            status: status.into(),
            message: String::new(),
            reason: String::new(),
        }
    }

    /// Attach a message and reason
    pub fn with_detail(mut self, message: impl Into<String>, reason: impl Into<String>) -> Self {
        self.message = message.into();
        self.reason = reason.into();
        self
    }

    /// True when the condition reports the `True` state
    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}

/// Deployment status fields the aggregator consumes
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeploymentStatusView {
    /// Total replicas the deployment expects
    pub replicas: i32,
    /// Deployment status conditions
    pub conditions: Vec<StatusCondition>,
}

/// Pod status fields the aggregator consumes
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PodView {
    /// Pod name
    pub name: String,
    /// Pod phase (`Pending`, `Running`, `Succeeded`, `Failed`, `Unknown`)
    pub phase: Option<String>,
    /// Pod status conditions
    pub conditions: Vec<StatusCondition>,
}

/// Aggregated status of one managed service
///
/// `ready` and `schedulable` start true and flip false on the first failing
/// signal; `message` accumulates the detail of every failing signal seen.
/// With multiple replicas the `status` phase is lossy: the last pod wins.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    /// Service the status belongs to
    pub service_name: String,
    /// False once any sub-resource condition is not `True`
    pub ready: bool,
    /// False once any pod reports an unsatisfied `PodScheduled` condition
    pub schedulable: bool,
    /// Expected replica count (triplet backend only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_replicas: Option<i32>,
    /// Free-text phase; last observed pod phase wins
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Append-only diagnostic log of failing signals
    pub message: String,
}

impl ServiceStatus {
    /// Healthy starting point for a service
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ready: true,
            schedulable: true,
            expected_replicas: None,
            status: None,
            message: String::new(),
        }
    }

    /// Fold serving-resource conditions: the first non-`True` condition
    /// flips `ready` and records its detail; the rest are not inspected.
    pub fn fold_serving_conditions(&mut self, conditions: &[StatusCondition]) {
        for condition in conditions {
            if !condition.is_true() {
                self.ready = false;
                self.message.push_str(&format!(
                    "Message: {} is {}. {}",
                    condition.type_, condition.status, condition.message
                ));
                break;
            }
        }
    }

    /// Fold deployment status: records the expected replica count and flips
    /// `ready` for every non-`True` condition, appending its detail.
    pub fn fold_deployment(&mut self, deployment: &DeploymentStatusView) {
        self.expected_replicas = Some(deployment.replicas);
        for condition in &deployment.conditions {
            if !condition.is_true() {
                self.ready = false;
                self.message.push_str(&format!(
                    "Message: {}\nReason: {}",
                    condition.message, condition.reason
                ));
            }
        }
    }

    /// Fold one pod: its phase overwrites `status` (last pod wins) and an
    /// unsatisfied `PodScheduled` condition flips `schedulable`.
    pub fn fold_pod(&mut self, pod: &PodView) {
        self.status.clone_from(&pod.phase);
        for condition in &pod.conditions {
            if condition.type_ == "PodScheduled" && !condition.is_true() {
                self.schedulable = false;
                self.message.push_str(&format!(
                    "Message: {}\nReason: {}",
                    condition.message, condition.reason
                ));
            }
        }
    }
}
