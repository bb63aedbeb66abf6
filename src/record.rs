//! Persisted service records and the descriptors that mutate them
//!
//! A [`ServiceRecord`] is the document-store entity describing one managed
//! inference service. Field names serialize in camelCase to stay compatible
//! with the existing document collection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Resource topology used to expose a managed service
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceBackend {
    /// One Knative `serving.knative.dev/v1` Service resource
    Knative,
    /// Deployment + Service + Emissary `getambassador.io/v2` Mapping triplet
    Emissary,
}

impl std::str::FromStr for ServiceBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "knative" => Ok(Self::Knative),
            "emissary" => Ok(Self::Emissary),
            other => Err(Error::store(format!("unknown service backend: {other}"))),
        }
    }
}

impl std::fmt::Display for ServiceBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Knative => write!(f, "knative"),
            Self::Emissary => write!(f, "emissary"),
        }
    }
}

/// A single container environment variable
///
/// Kept as an ordered list rather than a map: order is part of the rendered
/// manifest and must survive round trips through the store.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    /// Variable name
    pub name: String,
    /// Variable value
    pub value: String,
}

impl EnvVar {
    /// Create a new environment variable
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The persisted record for one managed inference service
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    /// Unique service name, derived from owner + model + random suffix
    pub service_name: String,
    /// User that created the service; never empty once resources exist
    pub owner_id: String,
    /// Model identifier the service serves
    pub model_id: String,
    /// Container image
    pub image_uri: String,
    /// Port the container listens on
    pub container_port: u16,
    /// Container environment
    #[serde(default)]
    pub env: Vec<EnvVar>,
    /// Requested GPU count
    #[serde(default)]
    pub num_gpus: u32,
    /// Backend topology; absent on legacy or partially-created records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<ServiceBackend>,
    /// URL scheme for the inference endpoint
    pub protocol: String,
    /// External host the service is reachable on
    pub host: String,
    /// Routing path segment (Emissary); equals the service name
    pub path: String,
    /// Fully assembled inference endpoint URL
    pub inference_url: String,
    /// Creation timestamp
    pub created: DateTime<Utc>,
    /// Last mutation timestamp
    pub last_modified: DateTime<Utc>,
}

/// Descriptor for creating a new service
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    /// Model identifier (free-form title; normalized into the record)
    pub model_id: String,
    /// Container image
    pub image_uri: String,
    /// Port the container listens on
    pub container_port: u16,
    /// Container environment
    #[serde(default)]
    pub env: Vec<EnvVar>,
    /// Requested GPU count
    #[serde(default)]
    pub num_gpus: u32,
}

/// Partial descriptor for updating an existing service
///
/// Only fields that are `Some` are merged into the record; everything else
/// is left untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceUpdate {
    /// New container image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_uri: Option<String>,
    /// New container port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_port: Option<u16>,
    /// Replacement container environment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<EnvVar>>,
    /// New GPU count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_gpus: Option<u32>,
}

impl ServiceUpdate {
    /// True if no field is set; such updates short-circuit before any store
    /// or cluster call.
    pub fn is_empty(&self) -> bool {
        self.image_uri.is_none()
            && self.container_port.is_none()
            && self.env.is_none()
            && self.num_gpus.is_none()
    }
}

/// The set of fields a record update writes (`$set`-style partial document)
///
/// Built by the orchestrator from a [`ServiceUpdate`] plus the recomputed
/// routing fields. Only `Some` fields are applied.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordPatch {
    /// New container image
    pub image_uri: Option<String>,
    /// New container port
    pub container_port: Option<u16>,
    /// Replacement container environment
    pub env: Option<Vec<EnvVar>>,
    /// New GPU count
    pub num_gpus: Option<u32>,
    /// Backend topology after the update
    pub backend: Option<ServiceBackend>,
    /// Recomputed URL scheme
    pub protocol: Option<String>,
    /// Recomputed external host
    pub host: Option<String>,
    /// Recomputed inference endpoint URL
    pub inference_url: Option<String>,
    /// Mutation timestamp
    pub last_modified: Option<DateTime<Utc>>,
}

impl RecordPatch {
    /// Apply this patch to a record, returning true if any field changed value
    pub fn apply(&self, record: &mut ServiceRecord) -> bool {
        let before = record.clone();
        if let Some(v) = &self.image_uri {
            record.image_uri = v.clone();
        }
        if let Some(v) = self.container_port {
            record.container_port = v;
        }
        if let Some(v) = &self.env {
            record.env = v.clone();
        }
        if let Some(v) = self.num_gpus {
            record.num_gpus = v;
        }
        if let Some(v) = self.backend {
            record.backend = Some(v);
        }
        if let Some(v) = &self.protocol {
            record.protocol = v.clone();
        }
        if let Some(v) = &self.host {
            record.host = v.clone();
        }
        if let Some(v) = &self.inference_url {
            record.inference_url = v.clone();
        }
        if let Some(v) = self.last_modified {
            record.last_modified = v;
        }
        *record != before
    }
}
