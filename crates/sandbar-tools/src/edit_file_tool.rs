use anyhow::{Context, Result};
use async_trait::async_trait;
use sandbar_runtime::{ParamSpec, Tool, ToolContext, ToolDescriptor, ToolError, ToolResult};
use serde_json::Value;

use crate::path_guard::PathGuard;
use crate::write_file_tool::write_atomic;

pub struct EditFileTool;

impl EditFileTool {
    pub const NAME: &'static str = "fs_edit";

    pub fn new() -> Self {
        Self
    }
}

impl Default for EditFileTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for EditFileTool {
    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let path_str = input["file_path"]
            .as_str()
            .context("Missing required field 'file_path'")?;
        let old_string = input["old_string"]
            .as_str()
            .context("Missing required field 'old_string'")?;
        let new_string = input["new_string"]
            .as_str()
            .context("Missing required field 'new_string'")?;
        let replace_all = input["replace_all"].as_bool().unwrap_or(false);

        if old_string.is_empty() {
            return Err(ToolError::InvalidArguments("old_string must not be empty".into()).into());
        }

        let path = PathGuard::validate_str(path_str, &ctx.allowed_dirs)?;

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ToolError::NotFound(format!("file not found: {}", path_str)).into())
            }
            Err(e) => return Err(e).context(format!("Failed to read file: {}", path_str)),
        };

        // Literal, non-overlapping occurrences
        let match_count = content.matches(old_string).count();

        if match_count == 0 {
            return Err(ToolError::Precondition("old_string not found in file".into()).into());
        }

        if match_count > 1 && !replace_all {
            return Err(ToolError::Precondition(format!(
                "old_string found {} times in file. Use replace_all or provide more context to make it unique.",
                match_count
            ))
            .into());
        }

        let new_content = if replace_all {
            content.replace(old_string, new_string)
        } else {
            content.replacen(old_string, new_string, 1)
        };

        write_atomic(&path, new_content.as_bytes())?;

        Ok(ToolResult::text(format!(
            "Replaced {} occurrence(s) in {}",
            match_count, path_str
        )))
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            "Perform exact string replacement in a file. By default, old_string must appear \
             exactly once (fails if 0 or >1 matches). Use replace_all to replace every occurrence.",
        )
        .param(ParamSpec::string("file_path", "Absolute path to the file"))
        .param(ParamSpec::string("old_string", "Exact string to find"))
        .param(ParamSpec::string("new_string", "Replacement string"))
        .param(ParamSpec::boolean("replace_all", "Replace all occurrences (default: false)"))
        .required(&["file_path", "old_string", "new_string"])
        .category("File System")
    }
}
