//! Search strategies behind `fs_grep`.
//!
//! Both backends return the same structured hits; formatting, ordering and
//! limits are applied afterwards by the tool, so output does not depend on
//! which backend ran.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sandbar_runtime::ToolError;
use serde::Deserialize;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::grep_tool::GrepQuery;

/// Directories never descended into, besides hidden ones.
pub const SKIPPED_DIRS: &[&str] = &["node_modules", "__pycache__"];

const RIPGREP_TIMEOUT: Duration = Duration::from_secs(30);

/// Matches found in one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileHits {
    pub path: PathBuf,
    /// 1-based numbers of matching lines, ascending
    pub matches: Vec<usize>,
    /// Text of every matching line plus whatever context lines were collected
    pub lines: BTreeMap<usize, String>,
}

/// A grep strategy. Implementations must honor hidden/dependency directory
/// skipping and the query's file filter, and must not format output.
#[async_trait]
pub trait GrepBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(&self, query: &GrepQuery) -> Result<Vec<FileHits>>;
}

/// Which backend to use, chosen once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrepStrategy {
    /// ripgrep when `rg` is on PATH, otherwise the built-in walker
    #[default]
    Auto,
    Ripgrep,
    Builtin,
}

/// Probe the host and build the backend for `strategy`.
pub fn select_backend(strategy: GrepStrategy) -> Result<Arc<dyn GrepBackend>> {
    let backend: Arc<dyn GrepBackend> = match strategy {
        GrepStrategy::Builtin => Arc::new(WalkerBackend::new()),
        GrepStrategy::Ripgrep => {
            let rg = which::which("rg")
                .context("ripgrep strategy requested but `rg` was not found on PATH")?;
            Arc::new(RipgrepBackend::new(rg))
        }
        GrepStrategy::Auto => match which::which("rg") {
            Ok(rg) => Arc::new(RipgrepBackend::new(rg)),
            Err(_) => Arc::new(WalkerBackend::new()),
        },
    };
    info!(backend = backend.name(), "Selected grep backend");
    Ok(backend)
}

fn is_skipped_dir(name: &str) -> bool {
    name.starts_with('.') || SKIPPED_DIRS.contains(&name)
}

// ── Built-in walker ─────────────────────────────────────────────────────

/// Recursive directory walk with line-by-line regex matching.
pub struct WalkerBackend;

impl WalkerBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WalkerBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GrepBackend for WalkerBackend {
    fn name(&self) -> &'static str {
        "builtin"
    }

    async fn search(&self, query: &GrepQuery) -> Result<Vec<FileHits>> {
        let query = query.clone();
        tokio::task::spawn_blocking(move || walk_and_search(&query))
            .await
            .context("grep walker task failed")
    }
}

fn walk_and_search(query: &GrepQuery) -> Vec<FileHits> {
    let walker = WalkDir::new(&query.path)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            // The root is always searched, even if it is itself hidden
            e.depth() == 0
                || !e.file_type().is_dir()
                || !is_skipped_dir(&e.file_name().to_string_lossy())
        });

    let mut results = Vec::new();
    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() || !query.accepts_file(entry.path()) {
            continue;
        }
        if let Some(hits) = search_file(entry.path(), query) {
            results.push(hits);
        }
    }
    results
}

/// Match one file. Unreadable and binary files yield nothing; invalid UTF-8
/// is replaced rather than skipping the file.
fn search_file(path: &Path, query: &GrepQuery) -> Option<FileHits> {
    let bytes = std::fs::read(path).ok()?;
    if bytes.contains(&0) {
        return None;
    }
    let content = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = content.lines().collect();

    let matches: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| query.regex.is_match(line))
        .map(|(i, _)| i + 1)
        .collect();
    if matches.is_empty() {
        return None;
    }

    let mut kept = BTreeMap::new();
    for &m in &matches {
        let lo = m.saturating_sub(query.context).max(1);
        let hi = (m + query.context).min(lines.len());
        for n in lo..=hi {
            kept.entry(n).or_insert_with(|| lines[n - 1].to_string());
        }
    }

    Some(FileHits {
        path: path.to_path_buf(),
        matches,
        lines: kept,
    })
}

// ── ripgrep ─────────────────────────────────────────────────────────────

/// Delegates to an external `rg` binary and parses its JSON event stream.
pub struct RipgrepBackend {
    program: PathBuf,
}

impl RipgrepBackend {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    fn args(&self, query: &GrepQuery) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--json".into(),
            "--crlf".into(),
            "--no-ignore".into(),
            "--hidden".into(),
            "--no-config".into(),
        ];
        if query.context > 0 {
            args.push("-C".into());
            args.push(query.context.to_string());
        }
        for glob in query.rg_globs() {
            args.push("--glob".into());
            args.push(glob);
        }
        args.push("--glob".into());
        args.push("!.*/".into());
        for dir in SKIPPED_DIRS {
            args.push("--glob".into());
            args.push(format!("!{}/", dir));
        }
        args.push("--regexp".into());
        args.push(query.pattern.clone());
        args.push("--".into());
        args.push(query.path.to_string_lossy().into_owned());
        args
    }
}

#[async_trait]
impl GrepBackend for RipgrepBackend {
    fn name(&self) -> &'static str {
        "ripgrep"
    }

    async fn search(&self, query: &GrepQuery) -> Result<Vec<FileHits>> {
        let child = Command::new(&self.program)
            .args(self.args(query))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::Execution(format!("failed to spawn rg: {}", e)))?;

        let output = match tokio::time::timeout(RIPGREP_TIMEOUT, child.wait_with_output()).await {
            Ok(result) => result.context("rg execution failed")?,
            Err(_) => {
                warn!(pattern = %query.pattern, "rg timed out and was killed");
                return Err(ToolError::Execution(format!(
                    "grep timed out after {} ms",
                    RIPGREP_TIMEOUT.as_millis()
                ))
                .into());
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let hits = parse_json_events(&stdout, query);

        match output.status.code() {
            Some(0) | Some(1) => Ok(hits),
            // rg reports 2 for any error, including one unreadable file among matches
            _ if !hits.is_empty() => {
                warn!(
                    stderr = %String::from_utf8_lossy(&output.stderr).trim_end(),
                    "rg reported errors, keeping partial matches"
                );
                Ok(hits)
            }
            _ => Err(ToolError::Execution(format!(
                "grep error: {}",
                String::from_utf8_lossy(&output.stderr).trim_end()
            ))
            .into()),
        }
    }
}

/// rg reports non-UTF-8 lines as base64 `bytes` instead of `text`.
fn event_text(lines: &Value) -> Option<Cow<'_, str>> {
    if let Some(text) = lines["text"].as_str() {
        return Some(Cow::Borrowed(text));
    }
    let bytes = BASE64.decode(lines["bytes"].as_str()?).ok()?;
    Some(Cow::Owned(String::from_utf8_lossy(&bytes).into_owned()))
}

/// Fold rg `--json` events into per-file hits, keeping rg's file order.
fn parse_json_events(stdout: &str, query: &GrepQuery) -> Vec<FileHits> {
    let mut files: Vec<FileHits> = Vec::new();

    for line in stdout.lines() {
        let Ok(event) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        let kind = event["type"].as_str().unwrap_or("");
        if kind != "match" && kind != "context" {
            continue;
        }
        let data = &event["data"];
        let (Some(path), Some(text), Some(number)) = (
            data["path"]["text"].as_str(),
            event_text(&data["lines"]),
            data["line_number"].as_u64(),
        ) else {
            continue;
        };
        let path = PathBuf::from(path);
        if !query.accepts_file(&path) {
            continue;
        }

        if files.last().map_or(true, |f| f.path != path) {
            files.push(FileHits {
                path,
                ..Default::default()
            });
        }
        let Some(file) = files.last_mut() else {
            continue;
        };
        let number = number as usize;
        let text = text.trim_end_matches('\n').trim_end_matches('\r');
        file.lines.insert(number, text.to_string());
        if kind == "match" {
            file.matches.push(number);
        }
    }

    // Context-only files cannot occur, but rg's output order within a file is
    // already ascending; keep matches sorted regardless
    files.retain(|f| !f.matches.is_empty());
    for f in &mut files {
        f.matches.sort_unstable();
        f.matches.dedup();
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grep_tool::OutputMode;
    use serde_json::json;

    fn query(path: &str, context: usize) -> GrepQuery {
        GrepQuery::new("foo", PathBuf::from(path), None, None, OutputMode::Content, context, None)
            .unwrap()
    }

    #[test]
    fn skipped_dir_names() {
        assert!(is_skipped_dir(".git"));
        assert!(is_skipped_dir("node_modules"));
        assert!(!is_skipped_dir("src"));
    }

    #[test]
    fn parses_match_and_context_events() {
        let events = [
            json!({"type": "begin", "data": {"path": {"text": "/w/a.rs"}}}),
            json!({"type": "context", "data": {"path": {"text": "/w/a.rs"}, "lines": {"text": "before\n"}, "line_number": 1}}),
            json!({"type": "match", "data": {"path": {"text": "/w/a.rs"}, "lines": {"text": "foo here\r\n"}, "line_number": 2}}),
            json!({"type": "end", "data": {"path": {"text": "/w/a.rs"}}}),
            json!({"type": "match", "data": {"path": {"text": "/w/b.rs"}, "lines": {"text": "foo\n"}, "line_number": 7}}),
            json!({"type": "summary", "data": {}}),
        ];
        let stdout = events
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("\n");

        let hits = parse_json_events(&stdout, &query("/w", 1));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].path, PathBuf::from("/w/a.rs"));
        assert_eq!(hits[0].matches, vec![2]);
        assert_eq!(hits[0].lines.get(&1).map(String::as_str), Some("before"));
        assert_eq!(hits[0].lines.get(&2).map(String::as_str), Some("foo here"));
        assert_eq!(hits[1].matches, vec![7]);
    }

    #[test]
    fn ripgrep_args_end_with_pattern_and_path() {
        let backend = RipgrepBackend::new(PathBuf::from("rg"));
        let args = backend.args(&query("/w", 2));
        assert!(args.contains(&"--json".to_string()));
        assert!(args.windows(2).any(|w| w == ["-C", "2"]));
        assert!(args.windows(2).any(|w| w == ["--glob", "!node_modules/"]));
        assert_eq!(&args[args.len() - 4..], ["--regexp", "foo", "--", "/w"]);
    }

    #[test]
    fn walker_search_file_collects_context_windows() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, "a\nfoo\nb\nc\nd\nfoo\n").unwrap();

        let hits = search_file(&file, &query("/unused", 1)).unwrap();
        assert_eq!(hits.matches, vec![2, 6]);
        assert_eq!(hits.lines.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3, 5, 6]);
    }

    #[test]
    fn non_utf8_lines_are_decoded_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("latin1.txt");
        std::fs::write(&file, b"caf\xe9 foo\nplain\n").unwrap();

        let hits = search_file(&file, &query("/unused", 0)).unwrap();
        assert_eq!(hits.matches, vec![1]);
        assert_eq!(hits.lines.get(&1).map(String::as_str), Some("caf\u{fffd} foo"));

        // "caf\xe9 foo\n" as rg emits it
        let event = json!({"type": "match", "data": {
            "path": {"text": "/w/latin1.txt"},
            "lines": {"bytes": "Y2Fm6SBmb28K"},
            "line_number": 1
        }});
        let hits = parse_json_events(&event.to_string(), &query("/w", 0));
        assert_eq!(hits[0].lines.get(&1).map(String::as_str), Some("caf\u{fffd} foo"));
    }

    #[test]
    fn walker_skips_binary_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bin.dat");
        std::fs::write(&file, b"foo\x00bar").unwrap();
        assert!(search_file(&file, &query("/unused", 0)).is_none());
    }
}
