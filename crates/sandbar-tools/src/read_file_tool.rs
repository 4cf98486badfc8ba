use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use sandbar_runtime::{ParamSpec, Tool, ToolContext, ToolDescriptor, ToolError, ToolResult};
use serde_json::Value;
use std::path::Path;

use crate::path_guard::PathGuard;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "bmp", "ico"];
const MAX_LINE_LENGTH: usize = 2000;
const DEFAULT_LIMIT: usize = 2000;
/// cat -n pads line numbers to at least this width
const MIN_NUMBER_WIDTH: usize = 6;

pub struct ReadFileTool;

impl ReadFileTool {
    pub const NAME: &'static str = "fs_read";

    pub fn new() -> Self {
        Self
    }
}

impl Default for ReadFileTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let path_str = input["file_path"]
            .as_str()
            .context("Missing required field 'file_path'")?;
        let offset = input["offset"].as_i64().unwrap_or(1).max(1) as usize;
        let limit = input["limit"]
            .as_i64()
            .map(|l| l.max(0) as usize)
            .unwrap_or(DEFAULT_LIMIT);

        let path = PathGuard::validate_str(path_str, &ctx.allowed_dirs)?;

        let meta = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(_) => return Err(ToolError::NotFound(format!("file not found: {}", path_str)).into()),
        };
        if meta.is_dir() {
            return Err(ToolError::InvalidArguments(format!(
                "path is a directory, not a file: {}",
                path_str
            ))
            .into());
        }

        let bytes = tokio::fs::read(&path)
            .await
            .context(format!("Failed to read file: {}", path_str))?;

        if let Some(ext) = image_extension(Path::new(path_str)) {
            let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
            return Ok(ToolResult::text(format!("[base64 image: .{}]\n{}", ext, encoded)));
        }

        let content = String::from_utf8_lossy(&bytes);
        Ok(ToolResult::text(format_lines(&content, offset, limit)))
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            "Read file contents with line numbers (cat -n format). Supports offset and limit \
             for partial reads. Lines longer than 2000 characters are truncated.",
        )
        .param(ParamSpec::string("file_path", "Absolute path to the file"))
        .param(ParamSpec::integer("offset", "Line number to start reading from (1-based)"))
        .param(ParamSpec::integer("limit", "Maximum number of lines to read (default: 2000)"))
        .required(&["file_path"])
        .read_only()
        .category("File System")
    }
}

/// Lowercased extension if the file is one of the image types returned as base64.
fn image_extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Render lines `[offset, offset + limit)` (1-based) with right-aligned numbers.
fn format_lines(content: &str, offset: usize, limit: usize) -> String {
    let start = offset - 1;
    let shown: Vec<&str> = content.lines().skip(start).take(limit).collect();
    let last_number = start + shown.len();
    let width = last_number.to_string().len().max(MIN_NUMBER_WIDTH);

    shown
        .iter()
        .enumerate()
        .map(|(i, line)| {
            format!(
                "{:>width$}\t{}",
                start + i + 1,
                truncate_line(line),
                width = width
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate_line(line: &str) -> std::borrow::Cow<'_, str> {
    match line.char_indices().nth(MAX_LINE_LENGTH) {
        Some((cut, _)) => format!("{}... [truncated]", &line[..cut]).into(),
        None => line.into(),
    }
}
