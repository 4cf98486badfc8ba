use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::{ToolContext, ToolDescriptor, ToolResult};

/// Async Tool trait
/// Note: Uses async_trait for trait object compatibility with DashMap storage
#[async_trait]
pub trait Tool: Send + Sync {
    /// Execute tool with already schema-checked input.
    ///
    /// `Ok(ToolResult::error(..))` and `Err(..)` both reach the caller as an
    /// error result; use the former when there is output worth returning.
    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult>;

    /// Static descriptor used for registration and discovery
    fn descriptor(&self) -> ToolDescriptor;
}
