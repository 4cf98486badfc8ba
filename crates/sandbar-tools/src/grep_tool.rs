use anyhow::{Context, Result};
use async_trait::async_trait;
use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;
use sandbar_runtime::{ParamSpec, Tool, ToolContext, ToolDescriptor, ToolError, ToolResult};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::grep_backend::{FileHits, GrepBackend};
use crate::path_guard::PathGuard;

pub const NO_MATCHES: &str = "no matches found";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Content,
    FilesWithMatches,
    Count,
}

impl OutputMode {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "content" => Some(Self::Content),
            "files_with_matches" => Some(Self::FilesWithMatches),
            "count" => Some(Self::Count),
            _ => None,
        }
    }
}

/// One grep request, already validated.
#[derive(Debug, Clone)]
pub struct GrepQuery {
    pub pattern: String,
    pub regex: Regex,
    pub path: PathBuf,
    pub glob: Option<String>,
    glob_matcher: Option<GlobMatcher>,
    /// A glob with a directory part is matched against the path below `path`
    glob_is_anchored: bool,
    pub file_type: Option<String>,
    pub mode: OutputMode,
    /// Context lines either side of a match; zero outside content mode
    pub context: usize,
    pub head_limit: Option<usize>,
    /// An explicit file is searched regardless of glob/type filters
    is_file_target: bool,
}

impl GrepQuery {
    pub fn new(
        pattern: &str,
        path: PathBuf,
        glob: Option<&str>,
        file_type: Option<&str>,
        mode: OutputMode,
        context: usize,
        head_limit: Option<usize>,
    ) -> Result<Self, ToolError> {
        let regex = Regex::new(pattern)
            .map_err(|e| ToolError::InvalidArguments(format!("invalid regex: {}", e)))?;
        let glob_matcher = glob
            .map(|g| {
                GlobBuilder::new(g.trim_start_matches('/'))
                    .literal_separator(true)
                    .build()
                    .map(|g| g.compile_matcher())
            })
            .transpose()
            .map_err(|e| ToolError::InvalidArguments(format!("invalid glob filter: {}", e)))?;
        let is_file_target = path.is_file();

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            path,
            glob: glob.map(str::to_string),
            glob_matcher,
            glob_is_anchored: glob.is_some_and(|g| g.contains('/')),
            file_type: file_type.map(|t| t.trim_start_matches('.').to_string()),
            mode,
            context: if mode == OutputMode::Content { context } else { 0 },
            head_limit: head_limit.filter(|&n| n > 0),
            is_file_target,
        })
    }

    /// Glob/type filter for a discovered file.
    ///
    /// A glob without `/` matches the file name at any depth; one with `/`
    /// matches the path relative to the search root.
    pub fn accepts_file(&self, path: &Path) -> bool {
        if self.is_file_target {
            return true;
        }
        let Some(name) = path.file_name() else {
            return false;
        };
        if let Some(ext) = &self.file_type {
            if !name.to_string_lossy().ends_with(&format!(".{}", ext)) {
                return false;
            }
        }
        if let Some(glob) = &self.glob_matcher {
            let matched = if self.glob_is_anchored {
                glob.is_match(path.strip_prefix(&self.path).unwrap_or(path))
            } else {
                glob.is_match(name)
            };
            if !matched {
                return false;
            }
        }
        true
    }

    /// Globs that only ever widen `accepts_file`, for pre-filtering in rg.
    ///
    /// rg ORs repeated `--glob` whitelists, so the exact filter is re-applied
    /// to its hits. Anchored globs get a `**/` prefix because rg matches them
    /// relative to its own working directory, not the search root.
    pub(crate) fn rg_globs(&self) -> Vec<String> {
        let mut globs = Vec::new();
        if let Some(ext) = &self.file_type {
            globs.push(format!("*.{}", ext));
        }
        if let Some(glob) = &self.glob {
            if self.glob_is_anchored {
                globs.push(format!("**/{}", glob.trim_start_matches('/')));
            } else {
                globs.push(glob.clone());
            }
        }
        globs
    }
}

/// Render backend hits: ascending path order, head limit, mode formatting.
pub fn render(mut hits: Vec<FileHits>, query: &GrepQuery) -> String {
    hits.sort_by(|a, b| a.path.cmp(&b.path));
    let limit = query.head_limit.unwrap_or(usize::MAX);
    let mut out: Vec<String> = Vec::new();
    let mut produced = 0usize;

    for file in &hits {
        if produced >= limit {
            break;
        }
        let path = file.path.display();
        match query.mode {
            OutputMode::FilesWithMatches => {
                out.push(path.to_string());
                produced += 1;
            }
            OutputMode::Count => {
                out.push(format!("{}:{}", path, file.matches.len()));
                produced += 1;
            }
            OutputMode::Content => {
                let take = (limit - produced).min(file.matches.len());
                let kept = &file.matches[..take];
                produced += take;
                for (&n, text) in &file.lines {
                    let in_window = kept
                        .iter()
                        .any(|&m| n + query.context >= m && n <= m + query.context);
                    if in_window {
                        out.push(format!("{}:{}:{}", path, n, text));
                    }
                }
            }
        }
    }

    if out.is_empty() {
        NO_MATCHES.to_string()
    } else {
        out.join("\n")
    }
}

pub struct GrepTool {
    backend: Arc<dyn GrepBackend>,
}

impl GrepTool {
    pub const NAME: &'static str = "fs_grep";

    pub fn new(backend: Arc<dyn GrepBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for GrepTool {
    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let pattern = input["pattern"]
            .as_str()
            .context("Missing required field 'pattern'")?;
        let path = match input["path"].as_str() {
            Some(p) => PathBuf::from(p),
            None => std::env::current_dir().context("Failed to determine current directory")?,
        };
        let mode = match input["output_mode"].as_str() {
            Some(m) => OutputMode::parse(m).ok_or_else(|| {
                ToolError::InvalidArguments(format!("unknown output_mode: {}", m))
            })?,
            None => OutputMode::FilesWithMatches,
        };
        let context = input["context"].as_i64().unwrap_or(0).max(0) as usize;
        let head_limit = input["head_limit"].as_i64().map(|n| n.max(0) as usize);

        let path = PathGuard::validate(&path, &ctx.allowed_dirs)?;
        if !path.exists() {
            return Err(ToolError::NotFound(format!("path not found: {}", path.display())).into());
        }

        let query = GrepQuery::new(
            pattern,
            path,
            input["glob"].as_str(),
            input["type"].as_str(),
            mode,
            context,
            head_limit,
        )?;

        debug!(backend = self.backend.name(), pattern, mode = ?mode, "Running grep");
        let hits = self.backend.search(&query).await?;
        Ok(ToolResult::text(render(hits, &query)))
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            "Search file contents with regex. Uses ripgrep if available, falls back to a \
             built-in search. Default output mode is files_with_matches (file paths only).",
        )
        .param(ParamSpec::string("pattern", "Regex pattern to search for"))
        .param(ParamSpec::string("path", "File or directory to search in (defaults to cwd)"))
        .param(ParamSpec::string("glob", "Glob to filter files (e.g. '*.rs')"))
        .param(ParamSpec::string("type", "File type filter (e.g. 'rs', 'py', 'ts')"))
        .param(ParamSpec::enumeration(
            "output_mode",
            "Output mode",
            &["content", "files_with_matches", "count"],
        ))
        .param(ParamSpec::integer(
            "context",
            "Lines of context around matches (content mode only)",
        ))
        .param(ParamSpec::integer("head_limit", "Limit output to first N results"))
        .required(&["pattern"])
        .read_only()
        .category("File System")
    }
}
