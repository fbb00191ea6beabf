//! Tool Registry
//!
//! The closed set of tools offered to agents. Each tool's input schema is
//! derived from the argument struct its handler deserializes, so the declared
//! schema and the accepted arguments are the same type.

use lazy_static::lazy_static;
use regex::Regex;
use schemars::{schema_for, JsonSchema};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::{compute::InstanceRef, Error, Result};

lazy_static! {
    // Compute Engine resource names (RFC 1035 labels)
    static ref INSTANCE_NAME: Regex =
        Regex::new(r"^[a-z]([-a-z0-9]{0,61}[a-z0-9])?$").expect("valid instance name pattern");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolId {
    ListInstances,
    StartInstance,
    StopInstance,
    GetRecentActions,
}

impl ToolId {
    pub const ALL: [ToolId; 4] = [
        ToolId::ListInstances,
        ToolId::StartInstance,
        ToolId::StopInstance,
        ToolId::GetRecentActions,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolId::ListInstances => "list_instances",
            ToolId::StartInstance => "start_instance",
            ToolId::StopInstance => "stop_instance",
            ToolId::GetRecentActions => "get_recent_actions",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolId::ListInstances => {
                "List Compute Engine instances in a project zone with their current status."
            }
            ToolId::StartInstance => {
                "Start a Compute Engine instance. The result reports the lifecycle state reached \
                 and is marked provisional if the instance may still be converging."
            }
            ToolId::StopInstance => {
                "Stop a Compute Engine instance. The result reports the lifecycle state reached \
                 and is marked provisional if the instance may still be converging."
            }
            ToolId::GetRecentActions => {
                "Return the most recent instance actions taken through this server, oldest first."
            }
        }
    }

    /// Whether the tool changes provider state.
    pub fn is_mutating(&self) -> bool {
        matches!(self, ToolId::StartInstance | ToolId::StopInstance)
    }

    pub fn input_schema(&self) -> Value {
        match self {
            ToolId::ListInstances => schema_of::<ListInstancesArgs>(),
            ToolId::StartInstance | ToolId::StopInstance => schema_of::<InstanceArgs>(),
            ToolId::GetRecentActions => schema_of::<RecentActionsArgs>(),
        }
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tool declaration as advertised by `tools/list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Every registered tool, in advertisement order.
pub fn registry() -> Vec<ToolSpec> {
    ToolId::ALL.iter().map(ToolId::spec).collect()
}

fn schema_of<T: JsonSchema>() -> Value {
    let mut schema = serde_json::to_value(schema_for!(T)).unwrap_or_default();
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
    }
    schema
}

/// Validation shared by all argument structs after deserialization.
pub trait ToolArgs: DeserializeOwned {
    fn validate(&self) -> Result<()>;

    fn parse(arguments: &Value) -> Result<Self> {
        let args: Self = serde_json::from_value(arguments.clone())
            .map_err(|e| Error::InvalidParams(e.to_string()))?;
        args.validate()?;
        Ok(args)
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidParams(format!("'{}' must not be empty", field)));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ListInstancesArgs {
    /// Google Cloud project id
    pub project: String,
    /// Zone, e.g. us-central1-a
    pub zone: String,
}

impl ListInstancesArgs {
    pub fn instance_ref(&self) -> InstanceRef {
        InstanceRef::zone(&self.project, &self.zone)
    }
}

impl ToolArgs for ListInstancesArgs {
    fn validate(&self) -> Result<()> {
        require_non_empty("project", &self.project)?;
        require_non_empty("zone", &self.zone)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct InstanceArgs {
    /// Google Cloud project id
    pub project: String,
    /// Zone, e.g. us-central1-a
    pub zone: String,
    /// Instance name
    pub name: String,
}

impl InstanceArgs {
    pub fn instance_ref(&self) -> InstanceRef {
        InstanceRef::instance(&self.project, &self.zone, &self.name)
    }
}

impl ToolArgs for InstanceArgs {
    fn validate(&self) -> Result<()> {
        require_non_empty("project", &self.project)?;
        require_non_empty("zone", &self.zone)?;
        if !INSTANCE_NAME.is_match(&self.name) {
            return Err(Error::InvalidParams(format!(
                "'{}' is not a valid instance name",
                self.name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RecentActionsArgs {
    /// Maximum number of records to return
    #[serde(default)]
    pub limit: Option<u32>,
}

impl ToolArgs for RecentActionsArgs {
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}
