//! STDIO transport for the weft coordinator.
//!
//! Line-based JSON-RPC 2.0 over stdin/stdout with the MCP
//! initialize/initialized handshake, `tools/list` discovery, and
//! `tools/call` dispatch into the task service.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};
use weft_core::{
    protocol::{
        ClaimTaskParams, CleanupTaskParams, CompleteTaskParams, CreateTasksParams, GetTaskParams,
        ListTasksParams, MergeTaskParams, StartTaskParams, UpdateProgressParams,
    },
    GitDriver, TaskService, TaskStore,
};

use crate::error::McpError;

/// MCP protocol state tracking
#[derive(Debug, PartialEq)]
enum McpState {
    /// Waiting for the initialize request from the client
    WaitingForInitialize,
    /// Initialize answered, waiting for the initialized notification
    WaitingForInitialized,
    /// Ready to process tool calls
    Ready,
}

/// STDIO MCP server over a [`TaskService`]
pub struct StdioMcpServer<S, G> {
    service: TaskService<S, G>,
    state: McpState,
}

impl<S, G> StdioMcpServer<S, G>
where
    S: TaskStore + 'static,
    G: GitDriver + 'static,
{
    pub fn new(service: TaskService<S, G>) -> Self {
        Self {
            service,
            state: McpState::WaitingForInitialize,
        }
    }

    /// Run the server until stdin closes
    pub async fn serve(mut self) -> Result<()> {
        info!("stdio MCP server started, waiting for initialize request");

        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut reader = BufReader::new(stdin);
        let mut line = String::new();

        loop {
            line.clear();

            match reader.read_line(&mut line).await {
                Ok(0) => {
                    info!("stdin closed, shutting down");
                    break;
                }
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    debug!(line = trimmed, "request received");

                    match self.process_message(trimmed).await {
                        Ok(Some(response)) => {
                            let response_json = serde_json::to_string(&response)
                                .context("Failed to serialize JSON-RPC response")?;
                            stdout
                                .write_all(response_json.as_bytes())
                                .await
                                .context("Failed to write response to stdout")?;
                            stdout.write_all(b"\n").await?;
                            stdout.flush().await?;
                        }
                        Ok(None) => {
                            debug!("notification processed");
                        }
                        Err(e) => {
                            error!(error = %e, "error processing message");
                            let id = extract_id_from_line(trimmed);
                            let response =
                                McpError::Protocol(e.to_string()).to_json_rpc_error(id);
                            let error_json = serde_json::to_string(&response).unwrap_or_else(|_| {
                                r#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"Internal error"},"id":null}"#.to_string()
                            });
                            let _ = stdout.write_all(error_json.as_bytes()).await;
                            let _ = stdout.write_all(b"\n").await;
                            let _ = stdout.flush().await;
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "error reading from stdin");
                    break;
                }
            }
        }

        info!("stdio MCP server shutdown complete");
        Ok(())
    }

    /// Process one JSON-RPC message (request or notification). Public so
    /// the transport can be exercised without attaching real stdio.
    pub async fn process_message(&mut self, line: &str) -> Result<Option<Value>> {
        let message: Value =
            serde_json::from_str(line).context("Failed to parse JSON-RPC message")?;

        if message.get("jsonrpc").and_then(|v| v.as_str()) != Some("2.0") {
            return Err(anyhow::anyhow!("Invalid JSON-RPC version"));
        }

        let method = message
            .get("method")
            .and_then(|v| v.as_str())
            .context("Missing or invalid 'method' field")?;
        let id = message.get("id").cloned();
        let params = message.get("params").cloned().unwrap_or(Value::Null);
        let is_notification = id.is_none();

        match (&self.state, method) {
            (McpState::WaitingForInitialize, "initialize") => {
                if is_notification {
                    return Err(anyhow::anyhow!(
                        "Initialize must be a request, not a notification"
                    ));
                }
                info!("initialize request received");
                self.state = McpState::WaitingForInitialized;

                Ok(Some(json!({
                    "jsonrpc": "2.0",
                    "result": {
                        "protocolVersion": "2024-11-05",
                        "capabilities": {
                            "tools": { "listChanged": false }
                        },
                        "serverInfo": {
                            "name": "weft-mcp",
                            "version": env!("CARGO_PKG_VERSION")
                        }
                    },
                    "id": id
                })))
            }

            (McpState::WaitingForInitialized, "notifications/initialized") => {
                if !is_notification {
                    return Err(anyhow::anyhow!(
                        "Initialized must be a notification, not a request"
                    ));
                }
                info!("initialized notification received, server ready");
                self.state = McpState::Ready;
                Ok(None)
            }

            (McpState::Ready, _) => {
                if is_notification {
                    match method {
                        "notifications/cancelled" => {
                            debug!("cancelled notification ignored");
                            Ok(None)
                        }
                        _ => {
                            warn!(method, "unknown notification");
                            Ok(None)
                        }
                    }
                } else {
                    match self.execute_tool_call(method, params).await {
                        Ok(result) => Ok(Some(json!({
                            "jsonrpc": "2.0",
                            "result": result,
                            "id": id
                        }))),
                        Err(e) => Ok(Some(e.to_json_rpc_error(id))),
                    }
                }
            }

            _ => Err(anyhow::anyhow!(
                "Invalid method '{}' for current state {:?}",
                method,
                self.state
            )),
        }
    }

    async fn execute_tool_call(&self, method: &str, params: Value) -> Result<Value, McpError> {
        match method {
            "tools/list" => Ok(tool_listing()),
            "tools/call" => {
                let tool_name = params
                    .get("name")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        McpError::Protocol("Missing tool name in tools/call".to_string())
                    })?
                    .to_string();
                let arguments = params
                    .get("arguments")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
                self.dispatch(&tool_name, arguments).await
            }
            // Direct method calls for compatibility
            _ => self.dispatch(method, params).await,
        }
    }

    /// Dispatch one coordinator operation by name
    async fn dispatch(&self, operation: &str, params: Value) -> Result<Value, McpError> {
        fn parse<T: serde::de::DeserializeOwned>(
            operation: &str,
            params: Value,
        ) -> Result<T, McpError> {
            serde_json::from_value(params).map_err(|e| {
                McpError::Validation(format!("Invalid {operation} parameters: {e}"))
            })
        }

        match operation {
            "create_tasks" => {
                let params: CreateTasksParams = parse(operation, params)?;
                let result = self.service.create_tasks(params).await?;
                Ok(serde_json::to_value(result)?)
            }
            "list_tasks" => {
                let params: ListTasksParams = if params.is_null() {
                    ListTasksParams::default()
                } else {
                    parse(operation, params)?
                };
                let result = self.service.list_tasks(params).await?;
                Ok(serde_json::to_value(result)?)
            }
            "get_task" => {
                let params: GetTaskParams = parse(operation, params)?;
                let result = self.service.get_task(params).await?;
                Ok(serde_json::to_value(result)?)
            }
            "claim_task" => {
                let params: ClaimTaskParams = parse(operation, params)?;
                let result = self.service.claim_task(params).await?;
                Ok(serde_json::to_value(result)?)
            }
            "start_task" => {
                let params: StartTaskParams = parse(operation, params)?;
                let result = self.service.start_task(params).await?;
                Ok(serde_json::to_value(result)?)
            }
            "update_progress" => {
                let params: UpdateProgressParams = parse(operation, params)?;
                let result = self.service.update_progress(params).await?;
                Ok(serde_json::to_value(result)?)
            }
            "complete_task" => {
                let params: CompleteTaskParams = parse(operation, params)?;
                let result = self.service.complete_task(params).await?;
                Ok(serde_json::to_value(result)?)
            }
            "merge_task" => {
                let params: MergeTaskParams = parse(operation, params)?;
                let result = self.service.merge_task(params).await?;
                Ok(serde_json::to_value(result)?)
            }
            "cleanup_task" => {
                let params: CleanupTaskParams = parse(operation, params)?;
                let result = self.service.cleanup_task(params).await?;
                Ok(serde_json::to_value(result)?)
            }
            "health_check" => {
                let result = self.service.health_check().await?;
                Ok(serde_json::to_value(result)?)
            }
            _ => Err(McpError::Protocol(format!("Unknown operation: {operation}"))),
        }
    }
}

/// Extract the request id from a possibly malformed line so error
/// responses can still reference it
fn extract_id_from_line(line: &str) -> Option<Value> {
    serde_json::from_str::<Value>(line)
        .ok()
        .and_then(|v| v.get("id").cloned())
}

/// `tools/list` payload for the coordinator's tool surface
fn tool_listing() -> Value {
    json!({
        "tools": [
            {
                "name": "create_tasks",
                "description": "Create a task group from a structured task list with dependencies and file patterns",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"},
                        "description": {"type": "string"},
                        "tasks": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "title": {"type": "string"},
                                    "description": {"type": "string"},
                                    "priority": {"type": "string", "enum": ["high", "medium", "low"]},
                                    "depends_on": {"type": "array", "items": {"type": "integer"}},
                                    "file_patterns": {
                                        "type": "array",
                                        "items": {
                                            "type": "object",
                                            "properties": {
                                                "pattern": {"type": "string"},
                                                "ownership_type": {"type": "string", "enum": ["exclusive", "shared"]}
                                            },
                                            "required": ["pattern"]
                                        }
                                    }
                                },
                                "required": ["title"]
                            }
                        }
                    },
                    "required": ["title", "tasks"]
                }
            },
            {
                "name": "list_tasks",
                "description": "List tasks with optional group and status filters",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "group_id": {"type": "string"},
                        "status": {
                            "type": "array",
                            "items": {"type": "string", "enum": ["pending", "blocked", "assigned", "in_progress", "in_review", "completed", "failed"]}
                        }
                    }
                }
            },
            {
                "name": "get_task",
                "description": "Get a task with its dependencies, file ownership, and progress log",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "task_id": {"type": "string"}
                    },
                    "required": ["task_id"]
                }
            },
            {
                "name": "claim_task",
                "description": "Claim a pending task whose dependencies are complete",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "task_id": {"type": "string"},
                        "agent_id": {"type": "string"}
                    },
                    "required": ["task_id"]
                }
            },
            {
                "name": "start_task",
                "description": "Create the task's worktree and branch and begin work",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "task_id": {"type": "string"}
                    },
                    "required": ["task_id"]
                }
            },
            {
                "name": "update_progress",
                "description": "Report progress, optionally checking changed files against other tasks' patterns",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "task_id": {"type": "string"},
                        "progress": {"type": "integer", "minimum": 0, "maximum": 100},
                        "note": {"type": "string"},
                        "files_changed": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["task_id", "progress"]
                }
            },
            {
                "name": "complete_task",
                "description": "Mark a task ready for review and unblock dependents",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "task_id": {"type": "string"},
                        "summary": {"type": "string"},
                        "files_changed": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["task_id", "summary"]
                }
            },
            {
                "name": "merge_task",
                "description": "Merge a reviewed task branch into trunk",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "task_id": {"type": "string"},
                        "strategy": {"type": "string", "enum": ["merge", "squash"]}
                    },
                    "required": ["task_id"]
                }
            },
            {
                "name": "cleanup_task",
                "description": "Abandon a task, removing its worktree and branch",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "task_id": {"type": "string"},
                        "reason": {"type": "string"}
                    },
                    "required": ["task_id"]
                }
            },
            {
                "name": "health_check",
                "description": "Check the health of the coordinator and its store",
                "inputSchema": {
                    "type": "object"
                }
            }
        ]
    })
}
