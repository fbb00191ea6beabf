//! Compute Resource Client
//!
//! The contract the gateway needs from a cloud provider's instance and
//! operation APIs, plus the model types exchanged across it.

pub mod gce;

pub use gce::GceClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{protocol::RpcError, Result};

/// Instance and operation API of a compute provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn list_instances(&self, project: &str, zone: &str) -> Result<Vec<InstanceSummary>>;

    async fn start_instance(&self, project: &str, zone: &str, name: &str)
        -> Result<OperationHandle>;

    async fn stop_instance(&self, project: &str, zone: &str, name: &str)
        -> Result<OperationHandle>;

    async fn get_operation(&self, project: &str, zone: &str, id: &str)
        -> Result<OperationSnapshot>;

    async fn get_instance(&self, project: &str, zone: &str, name: &str)
        -> Result<InstanceStatus>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRef {
    pub project: String,
    pub zone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl InstanceRef {
    pub fn zone(project: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            zone: zone.into(),
            name: None,
        }
    }

    pub fn instance(
        project: impl Into<String>,
        zone: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            zone: zone.into(),
            name: Some(name.into()),
        }
    }
}

impl fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}/{}/{}", self.project, self.zone, name),
            None => write!(f, "{}/{}", self.project, self.zone),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSummary {
    pub name: String,
    pub status: InstanceStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    Provisioning,
    Staging,
    Running,
    Stopping,
    Terminated,
    #[serde(other)]
    Unknown,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Provisioning => "PROVISIONING",
            InstanceStatus::Staging => "STAGING",
            InstanceStatus::Running => "RUNNING",
            InstanceStatus::Stopping => "STOPPING",
            InstanceStatus::Terminated => "TERMINATED",
            InstanceStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for InstanceStatus {
    fn from(s: &str) -> Self {
        match s {
            "PROVISIONING" => InstanceStatus::Provisioning,
            "STAGING" => InstanceStatus::Staging,
            "RUNNING" => InstanceStatus::Running,
            "STOPPING" => InstanceStatus::Stopping,
            "TERMINATED" => InstanceStatus::Terminated,
            _ => InstanceStatus::Unknown,
        }
    }
}

/// Provider-side operation status. Ordered so that a later state compares greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    Running,
    Done,
}

impl OperationStatus {
    /// Moves forward to `observed`, never backwards. DONE is terminal.
    pub fn advance(self, observed: OperationStatus) -> OperationStatus {
        self.max(observed)
    }

    pub fn is_done(&self) -> bool {
        matches!(self, OperationStatus::Done)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationStatus::Pending => write!(f, "PENDING"),
            OperationStatus::Running => write!(f, "RUNNING"),
            OperationStatus::Done => write!(f, "DONE"),
        }
    }
}

/// Reference to an in-flight provider mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationHandle {
    pub id: String,
    pub status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl OperationHandle {
    pub fn new(id: impl Into<String>, status: OperationStatus) -> Self {
        Self {
            id: id.into(),
            status,
            error: None,
        }
    }

    /// Folds a fresh observation into the handle, keeping transitions monotonic.
    pub fn observe(&mut self, snapshot: &OperationSnapshot) {
        self.status = self.status.advance(snapshot.status);
        if snapshot.error.is_some() {
            self.error = snapshot.error.clone();
        }
    }
}

/// Result of polling an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSnapshot {
    pub status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl OperationSnapshot {
    pub fn new(status: OperationStatus) -> Self {
        Self {
            status,
            error: None,
        }
    }

    pub fn failed(code: i64, message: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::Done,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}
