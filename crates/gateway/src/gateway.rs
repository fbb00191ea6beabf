//! Protocol Gateway
//!
//! Front door for every transport: parses JSON-RPC requests, validates tool
//! calls against the registry, dispatches to handlers, records instance
//! actions in the ledger and shapes responses.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::{
    compute::{InstanceRef, InstanceSummary, ResourceClient},
    config::Config,
    ledger::{ActionKind, ActionLedger, ActionOutcome, ActionRecord},
    lifecycle::{LifecycleTracker, Mutation, MutationResult},
    metrics,
    protocol::{
        CallToolParams, ErrorCode, InitializeResult, RpcError, RpcMethod, RpcRequest, RpcResponse,
        ServerInfo, ToolCallResult, PROTOCOL_VERSION,
    },
    tools::{self, InstanceArgs, ListInstancesArgs, RecentActionsArgs, ToolArgs, ToolId, ToolSpec},
    Error, Result,
};

pub struct ToolGateway {
    client: Arc<dyn ResourceClient>,
    tracker: LifecycleTracker,
    ledger: Arc<ActionLedger>,
    tools: Vec<ToolSpec>,
    server_info: ServerInfo,
    default_recent_limit: usize,
}

/// Outcome of a handler that reached the provider, ready for the ledger
struct Handled {
    kind: ActionKind,
    instance: InstanceRef,
    result: Result<(Value, ActionOutcome)>,
}

impl ToolGateway {
    pub fn new(client: Arc<dyn ResourceClient>, config: &Config) -> Self {
        Self {
            tracker: LifecycleTracker::new(client.clone(), config.lifecycle.clone()),
            client,
            ledger: Arc::new(ActionLedger::new(config.ledger.capacity)),
            tools: tools::registry(),
            server_info: ServerInfo::default(),
            default_recent_limit: config.ledger.default_recent_limit,
        }
    }

    pub fn ledger(&self) -> Arc<ActionLedger> {
        self.ledger.clone()
    }

    pub fn initialize(&self) -> InitializeResult {
        InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: json!({ "tools": {} }),
            server_info: self.server_info.clone(),
        }
    }

    pub fn list_tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    /// Handles a raw request body. `None` means no response is owed (notification).
    pub async fn handle_bytes(&self, body: &[u8]) -> Option<RpcResponse> {
        match serde_json::from_slice::<RpcRequest>(body) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                warn!("Rejecting malformed request: {}", e);
                Some(RpcResponse::parse_error(format!("Parse error: {}", e)))
            }
        }
    }

    pub async fn handle(&self, request: RpcRequest) -> Option<RpcResponse> {
        if request.is_notification() {
            debug!("Ignoring notification {}", request.method);
            return None;
        }

        let id = request.id.clone().unwrap_or(Value::Null);
        let Some(method) = RpcMethod::parse(&request.method) else {
            return Some(RpcResponse::error(
                id,
                RpcError::new(
                    ErrorCode::MethodNotFound,
                    format!("Method not found: {}", request.method),
                ),
            ));
        };

        let result = match method {
            RpcMethod::Initialize => serde_json::to_value(self.initialize()).map_err(Error::from),
            RpcMethod::ListTools => Ok(json!({ "tools": self.list_tools() })),
            RpcMethod::CallTool => self.call_tool_request(request.params).await,
        };

        Some(match result {
            Ok(value) => RpcResponse::result(id, value),
            Err(e) => RpcResponse::error(id, RpcError::from(&e)),
        })
    }

    async fn call_tool_request(&self, params: Option<Value>) -> Result<Value> {
        let params: CallToolParams = serde_json::from_value(params.unwrap_or_else(|| json!({})))
            .map_err(|e| Error::InvalidParams(e.to_string()))?;
        let name = params
            .name
            .ok_or_else(|| Error::InvalidParams("missing tool name".to_string()))?;
        let arguments = params.arguments.unwrap_or_else(|| json!({}));

        let result = self.call_tool(&name, arguments).await?;
        Ok(serde_json::to_value(result)?)
    }

    /// Looks up, validates and runs a tool. Protocol errors (unknown tool,
    /// invalid arguments) are returned before anything is recorded.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult> {
        let tool = match ToolId::from_name(name) {
            Some(tool) => tool,
            None => {
                warn!("Unknown tool requested: {}", name);
                metrics::TOOL_CALLS_TOTAL
                    .with_label_values(&["unknown", "rejected"])
                    .inc();
                return Err(Error::UnknownTool(name.to_string()));
            }
        };
        if tool.is_mutating() {
            info!("Calling tool {} with {}", tool, arguments);
        } else {
            debug!("Calling tool {} with {}", tool, arguments);
        }

        let outcome = self.dispatch(tool, &arguments).await;
        let label = match &outcome {
            Ok(_) => "succeeded",
            Err(Error::InvalidParams(_)) => "rejected",
            Err(_) => "failed",
        };
        metrics::TOOL_CALLS_TOTAL
            .with_label_values(&[tool.name(), label])
            .inc();

        let value = outcome.map_err(|e| {
            if !matches!(e, Error::InvalidParams(_)) {
                error!("Tool {} failed: {}", tool, e);
            }
            e
        })?;
        ToolCallResult::json(&value)
    }

    async fn dispatch(&self, tool: ToolId, arguments: &Value) -> Result<Value> {
        let handled = match tool {
            ToolId::ListInstances => {
                let args = ListInstancesArgs::parse(arguments)?;
                self.list_instances(args).await
            }
            ToolId::StartInstance => {
                let args = InstanceArgs::parse(arguments)?;
                self.mutate(Mutation::Start, args).await
            }
            ToolId::StopInstance => {
                let args = InstanceArgs::parse(arguments)?;
                self.mutate(Mutation::Stop, args).await
            }
            ToolId::GetRecentActions => {
                let args = RecentActionsArgs::parse(arguments)?;
                return self.recent_actions(args).await;
            }
        };

        self.record(handled, arguments).await
    }

    async fn list_instances(&self, args: ListInstancesArgs) -> Handled {
        let result = self
            .client
            .list_instances(&args.project, &args.zone)
            .await
            .map(|instances| (instances_payload(&instances), ActionOutcome::Succeeded));

        Handled {
            kind: ActionKind::List,
            instance: args.instance_ref(),
            result,
        }
    }

    async fn mutate(&self, mutation: Mutation, args: InstanceArgs) -> Handled {
        let instance = args.instance_ref();
        let result = self
            .tracker
            .drive(mutation, &instance)
            .await
            .and_then(|outcome| mutation_payload(&outcome));

        Handled {
            kind: match mutation {
                Mutation::Start => ActionKind::Start,
                Mutation::Stop => ActionKind::Stop,
            },
            instance,
            result,
        }
    }

    async fn recent_actions(&self, args: RecentActionsArgs) -> Result<Value> {
        let limit = args
            .limit
            .map(|l| l as usize)
            .unwrap_or(self.default_recent_limit);
        let actions = self.ledger.recent(limit).await;
        Ok(json!({
            "count": actions.len(),
            "capacity": self.ledger.capacity(),
            "actions": actions,
        }))
    }

    /// Appends the invocation to the ledger whatever the outcome; a failed
    /// call may still have changed provider state.
    async fn record(&self, handled: Handled, arguments: &Value) -> Result<Value> {
        let Handled {
            kind,
            instance,
            result,
        } = handled;

        let (payload, outcome, returned) = match result {
            Ok((payload, outcome)) => (payload.clone(), outcome, Ok(payload)),
            Err(e) => {
                let mut payload = json!({ "error": e.to_string() });
                if let Some(operation) = e.operation() {
                    payload["operation"] = json!(operation);
                }
                (payload, ActionOutcome::Failed, Err(e))
            }
        };

        debug!("Recording {:?} for {} as {:?}", kind, instance, outcome);
        self.ledger
            .append(ActionRecord::new(
                kind,
                instance,
                outcome,
                arguments.clone(),
                payload,
            ))
            .await;

        returned
    }
}

fn instances_payload(instances: &[InstanceSummary]) -> Value {
    json!({ "instances": instances })
}

fn mutation_payload(result: &MutationResult) -> Result<(Value, ActionOutcome)> {
    let outcome = if result.provisional {
        ActionOutcome::Provisional
    } else {
        ActionOutcome::Succeeded
    };
    Ok((serde_json::to_value(result)?, outcome))
}
