use anyhow::{Context, Result};
use async_trait::async_trait;
use globset::{GlobBuilder, GlobMatcher};
use sandbar_runtime::{ParamSpec, Tool, ToolContext, ToolDescriptor, ToolError, ToolResult};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;
use walkdir::WalkDir;

use crate::path_guard::PathGuard;

const MAX_RESULTS: usize = 1000;

/// A compiled `fs_glob` pattern.
///
/// `*` and `?` stay within one path component, `**` spans directories and
/// `{a,b}` alternates. A component starting with `.` only matches a pattern
/// component that itself starts with a literal `.`.
struct GlobFilter {
    matcher: GlobMatcher,
    dot_components: Vec<GlobMatcher>,
}

impl GlobFilter {
    fn new(pattern: &str) -> Result<Self, ToolError> {
        let pattern = pattern.trim_start_matches("./");
        let matcher = compile(pattern)
            .map_err(|e| ToolError::InvalidArguments(format!("glob error: {}", e)))?;
        let dot_components = pattern
            .split('/')
            .filter(|c| c.starts_with('.') && *c != "." && *c != "..")
            .filter_map(|c| compile(c).ok())
            .collect();
        Ok(Self {
            matcher,
            dot_components,
        })
    }

    fn allows_hidden(&self, name: &str) -> bool {
        !name.starts_with('.') || self.dot_components.iter().any(|g| g.is_match(name))
    }

    /// Match a path relative to the search directory.
    fn is_match(&self, relative: &Path) -> bool {
        self.matcher.is_match(relative)
            && relative
                .iter()
                .all(|c| self.allows_hidden(&c.to_string_lossy()))
    }
}

fn compile(pattern: &str) -> Result<GlobMatcher, globset::Error> {
    Ok(GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()?
        .compile_matcher())
}

pub struct GlobTool;

impl GlobTool {
    pub const NAME: &'static str = "fs_glob";

    pub fn new() -> Self {
        Self
    }

    /// Directories to search, per the explicit path or the sandbox.
    fn search_dirs(&self, explicit: Option<&str>, ctx: &ToolContext) -> Result<Vec<PathBuf>> {
        if let Some(p) = explicit {
            let dir = PathGuard::validate_str(p, &ctx.allowed_dirs)?;
            if !dir.exists() {
                return Err(ToolError::NotFound(format!("directory not found: {}", p)).into());
            }
            if !dir.is_dir() {
                return Err(
                    ToolError::InvalidArguments(format!("path is not a directory: {}", p)).into(),
                );
            }
            return Ok(vec![dir]);
        }

        if ctx.is_restricted() {
            let existing: Vec<PathBuf> = ctx
                .allowed_dirs
                .iter()
                .filter(|d| d.is_dir())
                .cloned()
                .collect();
            if existing.is_empty() {
                return Err(
                    ToolError::NotFound("none of the allowed directories exist".into()).into(),
                );
            }
            return Ok(existing);
        }

        let cwd = std::env::current_dir().context("Failed to determine current directory")?;
        Ok(vec![cwd])
    }
}

impl Default for GlobTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for GlobTool {
    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let pattern = input["pattern"]
            .as_str()
            .context("Missing required field 'pattern'")?;
        // "." and "" mean no explicit path
        let explicit = input["path"].as_str().filter(|p| !p.is_empty() && *p != ".");

        if Path::new(pattern).is_absolute() {
            return Err(ToolError::InvalidArguments(
                "pattern must be relative to the search directory".into(),
            )
            .into());
        }
        let filter = GlobFilter::new(pattern)?;

        let dirs = self.search_dirs(explicit, ctx)?;

        // Discovery order across directories, first occurrence wins
        let mut seen = HashSet::new();
        let mut matches: Vec<PathBuf> = Vec::new();
        for dir in &dirs {
            for hit in glob_in_dir(dir, &filter) {
                if !hit.is_file() {
                    continue;
                }
                if ctx.is_restricted() && PathGuard::validate(&hit, &ctx.allowed_dirs).is_err() {
                    debug!(path = %hit.display(), "Dropping glob hit outside allowed directories");
                    continue;
                }
                if seen.insert(hit.clone()) {
                    matches.push(hit);
                }
            }
        }

        let total = matches.len();
        let mut with_mtime: Vec<(PathBuf, SystemTime)> = matches
            .into_iter()
            .map(|p| {
                let mtime = std::fs::metadata(&p)
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (p, mtime)
            })
            .collect();
        // Stable: equal mtimes keep discovery order
        with_mtime.sort_by(|a, b| b.1.cmp(&a.1));

        let mut output = with_mtime
            .iter()
            .take(MAX_RESULTS)
            .map(|(p, _)| p.display().to_string())
            .collect::<Vec<_>>()
            .join("\n");
        if total > MAX_RESULTS {
            output.push_str(&format!(
                "\n\n(showing {} of {} matches)",
                MAX_RESULTS, total
            ));
        }

        Ok(ToolResult::text(output))
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            "Find files matching a glob pattern. Returns absolute paths sorted by modification \
             time (newest first). Capped at 1000 results.",
        )
        .param(ParamSpec::string("pattern", "Glob pattern (e.g. '**/*.rs')"))
        .param(ParamSpec::string(
            "path",
            "Directory to search in (defaults to allowed directories, or cwd if unrestricted)",
        ))
        .required(&["pattern"])
        .read_only()
        .category("File System")
    }
}

/// Files below `dir` matching `filter`, in walk order (sorted by name at
/// each level). Unreadable entries are skipped.
fn glob_in_dir(dir: &Path, filter: &GlobFilter) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e.file_type().is_dir()
                || filter.allows_hidden(&e.file_name().to_string_lossy())
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.depth() > 0)
        .filter(|e| {
            e.path()
                .strip_prefix(dir)
                .is_ok_and(|relative| filter.is_match(relative))
        })
        .map(|e| e.into_path())
        .collect()
}
