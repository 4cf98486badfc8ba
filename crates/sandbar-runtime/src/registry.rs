use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dashmap::DashMap;
use futures::FutureExt;
use serde_json::Value;
use tracing::{info, warn};

use crate::{Tool, ToolContext, ToolDescriptor, ToolError, ToolResult};

struct Registration {
    descriptor: ToolDescriptor,
    tool: Arc<dyn Tool>,
}

/// Name-keyed set of tools and the single place where tool failures are
/// turned into error results. Nothing a handler does escapes `call`.
#[derive(Default)]
pub struct ToolRegistry {
    tools: DashMap<String, Registration>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its descriptor name. Re-registering a name
    /// replaces the previous entry.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let descriptor = tool.descriptor();
        info!(tool = %descriptor.name, "Registering tool");
        self.tools
            .insert(descriptor.name.clone(), Registration { descriptor, tool });
    }

    /// Descriptors sorted by name.
    pub fn list(&self) -> Vec<ToolDescriptor> {
        let mut descriptors: Vec<ToolDescriptor> = self
            .tools
            .iter()
            .map(|entry| entry.value().descriptor.clone())
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Look up, validate arguments, and run a tool.
    pub async fn call(&self, name: &str, args: Value, ctx: &ToolContext) -> ToolResult {
        // Clone out of the map so no shard lock is held across the await
        let (descriptor, tool) = match self.tools.get(name) {
            Some(entry) => (entry.descriptor.clone(), entry.tool.clone()),
            None => {
                warn!(tool = name, "Unknown tool requested");
                return ToolResult::error(ToolError::UnknownTool(name.to_string()).to_string());
            }
        };

        if let Err(e) = descriptor.validate_args(&args) {
            warn!(tool = name, error = %e, "Rejected tool arguments");
            return ToolResult::error(e.to_string());
        }

        info!(tool = name, allowed_dirs = ctx.allowed_dirs.len(), "Executing tool");

        match AssertUnwindSafe(tool.execute(args, ctx)).catch_unwind().await {
            Ok(Ok(result)) => {
                if result.is_error {
                    warn!(tool = name, "Tool reported failure");
                } else {
                    info!(tool = name, "Tool completed");
                }
                result
            }
            Ok(Err(e)) => {
                let message = format!("{:#}", e);
                warn!(tool = name, error = %message, "Tool execution failed");
                ToolResult::error(message)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(tool = name, error = %message, "Tool panicked");
                ToolResult::error(format!("tool {} panicked: {}", name, message))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
