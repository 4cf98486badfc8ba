use anyhow::{Context, Result};
use async_trait::async_trait;
use sandbar_runtime::{ParamSpec, Tool, ToolContext, ToolDescriptor, ToolResult};
use serde_json::Value;
use std::io::Write;
use std::path::Path;

use crate::path_guard::PathGuard;

pub struct WriteFileTool;

impl WriteFileTool {
    pub const NAME: &'static str = "fs_write";

    pub fn new() -> Self {
        Self
    }
}

impl Default for WriteFileTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let path_str = input["file_path"]
            .as_str()
            .context("Missing required field 'file_path'")?;
        let content = input["content"]
            .as_str()
            .context("Missing required field 'content'")?;

        let path = PathGuard::validate_str(path_str, &ctx.allowed_dirs)?;

        // Create parent directories
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context(format!("Failed to create directories: {:?}", parent))?;
        }

        write_atomic(&path, content.as_bytes())?;

        // UTF-8 byte length, not character count
        Ok(ToolResult::text(format!(
            "Wrote {} bytes to {}",
            content.len(),
            path_str
        )))
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            "Write content to a file. Creates the file and parent directories if they do not \
             exist. Overwrites existing files.",
        )
        .param(ParamSpec::string("file_path", "Absolute path to the file"))
        .param(ParamSpec::string("content", "Content to write"))
        .required(&["file_path", "content"])
        .category("File System")
    }
}

/// Atomic write: temp file in the target directory + rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or(Path::new("/"));
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .context("Failed to create temp file for atomic write")?;

    tmp.write_all(bytes)
        .context("Failed to write to temp file")?;
    tmp.flush()?;

    // Temp files are created 0600; keep the mode of the file being replaced
    match std::fs::metadata(path) {
        Ok(meta) => tmp.as_file().set_permissions(meta.permissions())?,
        Err(_) => set_default_mode(tmp.as_file())?,
    }

    tmp.persist(path)
        .context(format!("Failed to persist file: {:?}", path))?;
    Ok(())
}

#[cfg(unix)]
fn set_default_mode(file: &std::fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_default_mode(_file: &std::fs::File) -> std::io::Result<()> {
    Ok(())
}
