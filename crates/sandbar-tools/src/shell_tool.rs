use anyhow::{Context, Result};
use async_trait::async_trait;
use sandbar_runtime::{ParamSpec, Tool, ToolContext, ToolDescriptor, ToolError, ToolResult};
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::bash_session::{parse_output, BashSession};
use crate::path_guard::PathGuard;

pub const DEFAULT_TIMEOUT_MS: u64 = 120_000;
pub const MAX_TIMEOUT_MS: u64 = 600_000;
pub const MAX_OUTPUT_CHARS: usize = 30_000;
pub const TRUNCATION_MARKER: &str = "\n... [output truncated]";
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// How long a timed-out command's pipes may take to drain after the kill.
const READER_GRACE: Duration = Duration::from_millis(500);

/// Runs commands in the session's working directory and follows `cd`.
pub struct BashTool {
    session: Arc<BashSession>,
    shell: PathBuf,
}

impl BashTool {
    pub const NAME: &'static str = "fs_bash";

    pub fn new(session: Arc<BashSession>) -> Self {
        Self {
            session,
            shell: PathBuf::from(DEFAULT_SHELL),
        }
    }

    /// Use a different shell binary (invoked as `<shell> -c <script>`)
    pub fn with_shell(mut self, shell: PathBuf) -> Self {
        self.shell = shell;
        self
    }

    pub fn session(&self) -> &Arc<BashSession> {
        &self.session
    }

    /// Append the directory report while keeping the command's exit status.
    fn wrap(&self, command: &str) -> String {
        format!(
            "{}\n__sandbar_status=$?\necho \"{}$(pwd)\"\nexit $__sandbar_status",
            command,
            self.session.marker()
        )
    }
}

#[async_trait]
impl Tool for BashTool {
    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let command = input["command"]
            .as_str()
            .context("Input missing 'command' field")?;
        let timeout_ms = input["timeout"]
            .as_i64()
            .map(|t| t.clamp(1, MAX_TIMEOUT_MS as i64) as u64)
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        let description = input["description"].as_str().unwrap_or("");

        let mut cwd = self.session.lock().await;

        // A previous command may have cd-ed out of the sandbox
        if PathGuard::validate(&cwd, &ctx.allowed_dirs).is_err() {
            return Err(ToolError::PathRejected(format!(
                "cwd {} is outside allowed directories",
                cwd.display()
            ))
            .into());
        }
        if !cwd.is_dir() {
            return Err(ToolError::NotFound(format!(
                "working directory {} no longer exists",
                cwd.display()
            ))
            .into());
        }

        // Audit log: record exact command being executed
        info!(cmd = command, description, cwd = %cwd.display(), timeout_ms, "Executing shell command");

        let mut command_builder = Command::new(&self.shell);
        command_builder
            .arg("-c")
            .arg(self.wrap(command))
            .current_dir(&*cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a kill reaches background jobs and pipelines
        #[cfg(unix)]
        command_builder.process_group(0);

        let mut child = command_builder.spawn().map_err(|e| {
            ToolError::Execution(format!("failed to spawn {}: {}", self.shell.display(), e))
        })?;
        let pgid = child.id();

        let mut stdout = StreamCapture::start(child.stdout.take());
        let mut stderr = StreamCapture::start(child.stderr.take());
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        let status = match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(status) => status.context("Command execution failed")?,
            Err(_) => {
                warn!(cmd = command, timeout_ms, "Shell command timed out and was killed");
                kill_process_group(pgid);
                let _ = child.kill().await;
                let _ = tokio::time::timeout(READER_GRACE, async {
                    tokio::join!(&mut stdout.task, &mut stderr.task)
                })
                .await;

                let captured = combine_streams(&stdout.finish().await, &stderr.finish().await);
                let partial = truncate_output(parse_output(&captured, self.session.marker()).visible);
                let note = format!("command timed out after {} ms", timeout_ms);
                return Ok(ToolResult::error(if partial.is_empty() {
                    note
                } else {
                    format!("{}\n{}", partial, note)
                }));
            }
        };

        // A background job can hold the pipes open after the shell exits
        let drained = tokio::time::timeout_at(deadline, async {
            tokio::join!(&mut stdout.task, &mut stderr.task)
        })
        .await;
        if drained.is_err() {
            warn!(cmd = command, "Shell output still open at deadline, killing process group");
            kill_process_group(pgid);
        }

        let stdout = stdout.finish().await;
        let stderr = stderr.finish().await;
        let parsed = parse_output(&combine_streams(&stdout, &stderr), self.session.marker());

        // Applied even when the command failed
        if let Some(new_cwd) = parsed.new_cwd {
            if *cwd != new_cwd {
                info!(from = %cwd.display(), to = %new_cwd.display(), "Shell working directory changed");
            }
            *cwd = new_cwd;
        }

        let visible = truncate_output(parsed.visible);

        if status.success() {
            return Ok(ToolResult::text(visible));
        }

        let exit_code = status.code();
        warn!(cmd = command, exit_code = ?exit_code, "Shell command failed");
        if !visible.is_empty() {
            return Ok(ToolResult::error(visible));
        }
        Ok(ToolResult::error(match exit_code {
            Some(code) => format!("command exited with status {}", code),
            None => "command terminated by signal".to_string(),
        }))
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            "Execute a shell command. Working directory persists between calls. Output is \
             truncated at 30000 characters.",
        )
        .param(ParamSpec::string("command", "Shell command to execute"))
        .param(ParamSpec::integer(
            "timeout",
            "Timeout in milliseconds (default: 120000, max: 600000)",
        ))
        .param(ParamSpec::string("description", "Description of what the command does"))
        .required(&["command"])
        .category("Shell")
    }
}

/// Bytes read from one of the child's pipes by a background task.
///
/// The buffer is shared so whatever arrived before a timeout is still
/// available after the reader is stopped.
struct StreamCapture {
    buf: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl StreamCapture {
    fn start<R>(reader: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let task = tokio::spawn(async move {
            let Some(mut reader) = reader else {
                return;
            };
            let mut chunk = [0u8; 8192];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => sink.lock().await.extend_from_slice(&chunk[..n]),
                }
            }
        });
        Self { buf, task }
    }

    /// Stop reading and return everything captured so far.
    async fn finish(self) -> String {
        self.task.abort();
        let bytes = self.buf.lock().await;
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: Option<u32>) {
    if let Some(pgid) = pgid {
        // SAFETY: killpg only sends a signal; a stale group id yields ESRCH
        unsafe {
            libc::killpg(pgid as libc::pid_t, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: Option<u32>) {}

/// stdout then stderr, separated by a newline when both have content.
fn combine_streams(stdout: &str, stderr: &str) -> String {
    if stdout.is_empty() {
        return stderr.to_string();
    }
    if stderr.is_empty() {
        return stdout.to_string();
    }
    if stdout.ends_with('\n') {
        format!("{}{}", stdout, stderr)
    } else {
        format!("{}\n{}", stdout, stderr)
    }
}

fn truncate_output(output: String) -> String {
    match output.char_indices().nth(MAX_OUTPUT_CHARS) {
        Some((cut, _)) => format!("{}{}", &output[..cut], TRUNCATION_MARKER),
        None => output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_keeps_exactly_the_limit() {
        let long = "a".repeat(MAX_OUTPUT_CHARS + 500);
        let out = truncate_output(long);
        assert!(out.ends_with(TRUNCATION_MARKER));
        assert_eq!(out.len(), MAX_OUTPUT_CHARS + TRUNCATION_MARKER.len());

        let exact = "b".repeat(MAX_OUTPUT_CHARS);
        assert_eq!(truncate_output(exact.clone()), exact);
    }

    #[test]
    fn streams_are_joined_once() {
        assert_eq!(combine_streams("out\n", "err\n"), "out\nerr\n");
        assert_eq!(combine_streams("out", "err"), "out\nerr");
        assert_eq!(combine_streams("", "err"), "err");
        assert_eq!(combine_streams("out", ""), "out");
    }

    #[test]
    fn wrapper_preserves_status_and_reports_cwd() {
        let tool = BashTool::new(Arc::new(BashSession::new(PathBuf::from("/"))));
        let script = tool.wrap("false");
        assert!(script.starts_with("false\n__sandbar_status=$?\n"));
        assert!(script.contains(tool.session().marker()));
        assert!(script.ends_with("exit $__sandbar_status"));
    }
}
