use rmcp::{
    handler::server::{ServerHandler, tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router,
    ErrorData as McpError,
};
use std::sync::Arc;
use std::time::Instant;

use crate::engine::audit::AuditLog;
use crate::lifecycle::namespace::Namespace;
use crate::native::gateway::Gateway;
use crate::providers::process::{self, StartRequest};

#[derive(Clone)]
pub struct ProcessEngine {
    tool_router: ToolRouter<Self>,
    pub namespace: Namespace,
    pub gateway: Gateway,
    pub audit: Arc<AuditLog>,
}

impl ProcessEngine {
    fn start_tool_call(&self, tool: &str, params: &serde_json::Value) -> Instant {
        tracing::debug!(tool, %params, "Tool call");
        Instant::now()
    }

    fn complete_tool_call(&self, tool: &str, start: Instant, success: bool, message: &str) {
        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(tool, duration_ms, success, "Tool call completed");
        self.audit.record(message);
    }

    /// Engine failures are reported as tool results, never protocol errors.
    fn tool_error(e: impl std::fmt::Display) -> CallToolResult {
        CallToolResult::error(vec![Content::text(format!("Error: {}", e))])
    }
}

// ── Argument structs ──────────────────────────────────────────────────

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct StartProcessArgs {
    #[schemars(description = "The script or command to run")]
    pub script: String,
    #[schemars(description = "Optional array of arguments")]
    pub args: Option<Vec<String>>,
    #[schemars(description = "Optional working directory")]
    pub cwd: Option<String>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct DeleteProcessArgs {
    #[schemars(description = "Process name to delete")]
    pub name: String,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct ListProcessesArgs {
    #[schemars(description = "Optional namespace to filter processes (if not provided, shows all processes)")]
    pub namespace: Option<String>,
}

// ── Tool implementations ──────────────────────────────────────────────

#[tool_router]
impl ProcessEngine {
    pub fn new(namespace: Namespace, gateway: Gateway, audit: Arc<AuditLog>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            namespace,
            gateway,
            audit,
        }
    }

    #[tool(name = "start-process", description = "Start a new process using PM2")]
    async fn start_process(
        &self,
        args: Parameters<StartProcessArgs>,
    ) -> Result<CallToolResult, McpError> {
        let tool_name = "start-process";
        let StartProcessArgs { script, args, cwd } = args.0;
        let params = serde_json::json!({"script": script, "args": args, "cwd": cwd});
        let start = self.start_tool_call(tool_name, &params);

        let request = StartRequest {
            script: script.clone(),
            args: args.unwrap_or_default(),
            cwd,
        };
        match process::start_process(&self.gateway, &self.namespace, request).await {
            Ok(started) => {
                let message = format!("Started process: {} ({})", started.name, script);
                self.complete_tool_call(tool_name, start, true, &message);
                let pid = started
                    .pid
                    .map(|pid| pid.to_string())
                    .unwrap_or_else(|| "N/A".to_string());
                Ok(CallToolResult::success(vec![Content::text(format!(
                    "Successfully started process '{}' with script: {} (status: {}, pid: {})",
                    started.name, script, started.status, pid
                ))]))
            }
            Err(e) => {
                let message = format!("Failed to start process ({}): {}", script, e);
                self.complete_tool_call(tool_name, start, false, &message);
                Ok(Self::tool_error(e))
            }
        }
    }

    #[tool(name = "delete-process", description = "Stop and delete a process by name")]
    async fn delete_process(
        &self,
        args: Parameters<DeleteProcessArgs>,
    ) -> Result<CallToolResult, McpError> {
        let tool_name = "delete-process";
        let name = args.0.name;
        let params = serde_json::json!({"name": name});
        let start = self.start_tool_call(tool_name, &params);

        match process::delete_process(&self.gateway, &name).await {
            Ok(()) => {
                self.complete_tool_call(tool_name, start, true, &format!("Deleted process: {}", name));
                Ok(CallToolResult::success(vec![Content::text(format!(
                    "Successfully deleted process '{}'",
                    name
                ))]))
            }
            Err(e) => {
                let message = format!("Failed to delete process {}: {}", name, e);
                self.complete_tool_call(tool_name, start, false, &message);
                Ok(Self::tool_error(e))
            }
        }
    }

    #[tool(name = "list-processes", description = "List PM2 processes, optionally filtered by namespace")]
    async fn list_processes(
        &self,
        args: Parameters<ListProcessesArgs>,
    ) -> Result<CallToolResult, McpError> {
        let tool_name = "list-processes";
        let filter = args.0.namespace;
        let params = serde_json::json!({"namespace": filter});
        let start = self.start_tool_call(tool_name, &params);

        match process::list_processes(&self.gateway, filter.as_deref()).await {
            Ok(listing) => {
                self.complete_tool_call(tool_name, start, true, &listing.audit_message());
                Ok(CallToolResult::success(vec![Content::text(listing.to_string())]))
            }
            Err(e) => {
                let message = format!("Failed to list processes: {}", e);
                self.complete_tool_call(tool_name, start, false, &message);
                Ok(Self::tool_error(e))
            }
        }
    }

    #[tool(name = "get-namespace", description = "Get the current server namespace")]
    async fn get_namespace(&self) -> Result<CallToolResult, McpError> {
        let tool_name = "get-namespace";
        let start = self.start_tool_call(tool_name, &serde_json::json!({}));
        let message = format!("Namespace requested: {}", self.namespace);
        self.complete_tool_call(tool_name, start, true, &message);

        Ok(CallToolResult::success(vec![Content::text(format!(
            "Current server namespace: {}",
            self.namespace
        ))]))
    }
}

#[tool_handler]
impl ServerHandler for ProcessEngine {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(format!(
                "Starts, lists and deletes PM2 processes. Processes started here are \
                 named '{}-<id>' and are deleted when this server shuts down.",
                self.namespace
            )),
            ..Default::default()
        }
    }
}
