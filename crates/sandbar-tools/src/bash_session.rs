use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Working directory shared by successive `fs_bash` calls.
///
/// The lock is held for a whole command execution, so validate-then-run-then-
/// update is exclusive even if calls are ever serviced concurrently.
pub struct BashSession {
    cwd: Mutex<PathBuf>,
    marker: String,
}

impl BashSession {
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd: Mutex::new(cwd),
            marker: format!("___SANDBAR_CWD_{}___", Uuid::new_v4().simple()),
        }
    }

    /// Session starting in the process's current directory.
    pub fn from_current_dir() -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to determine current directory")?;
        Ok(Self::new(cwd))
    }

    pub async fn cwd(&self) -> PathBuf {
        self.cwd.lock().await.clone()
    }

    /// Sentinel prefix of the line that reports the post-command directory.
    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, PathBuf> {
        self.cwd.lock().await
    }
}

/// Visible output and directory report extracted from raw shell output.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ParsedOutput {
    pub visible: String,
    pub new_cwd: Option<PathBuf>,
}

/// Strip sentinel lines out of `raw`.
///
/// Text before a sentinel on the same line stays visible; the text after it
/// becomes the new directory if it is an absolute path. The last valid report wins.
pub(crate) fn parse_output(raw: &str, marker: &str) -> ParsedOutput {
    let mut new_cwd = None;
    let mut lines: Vec<&str> = Vec::new();

    for line in raw.split('\n') {
        match line.find(marker) {
            Some(idx) => {
                let reported = line[idx + marker.len()..].trim();
                if !reported.is_empty() && Path::new(reported).is_absolute() {
                    new_cwd = Some(PathBuf::from(reported));
                }
                let before = &line[..idx];
                if !before.trim().is_empty() {
                    lines.push(before);
                }
            }
            None => lines.push(line),
        }
    }

    ParsedOutput {
        visible: lines.join("\n").trim_end().to_string(),
        new_cwd,
    }
}
