pub mod bash_session;
pub mod edit_file_tool;
pub mod glob_tool;
pub mod grep_backend;
pub mod grep_tool;
pub mod path_guard;
pub mod read_file_tool;
pub mod shell_tool;
pub mod write_file_tool;

pub use bash_session::BashSession;
pub use edit_file_tool::EditFileTool;
pub use glob_tool::GlobTool;
pub use grep_backend::{select_backend, GrepBackend, GrepStrategy, RipgrepBackend, WalkerBackend};
pub use grep_tool::GrepTool;
pub use path_guard::PathGuard;
pub use read_file_tool::ReadFileTool;
pub use shell_tool::BashTool;
pub use write_file_tool::WriteFileTool;

use anyhow::Result;
use sandbar_runtime::ToolRegistry;
use std::path::PathBuf;
use std::sync::Arc;

/// Startup options for the built-in tool set.
#[derive(Debug, Clone)]
pub struct ToolOptions {
    pub shell: PathBuf,
    pub grep_strategy: GrepStrategy,
}

impl Default for ToolOptions {
    fn default() -> Self {
        Self {
            shell: PathBuf::from(shell_tool::DEFAULT_SHELL),
            grep_strategy: GrepStrategy::Auto,
        }
    }
}

/// Register all six tools with one shared shell session.
/// Returns the session so callers can inspect it.
pub fn register_all(registry: &ToolRegistry, options: &ToolOptions) -> Result<Arc<BashSession>> {
    let session = Arc::new(BashSession::from_current_dir()?);
    let backend = select_backend(options.grep_strategy)?;

    registry.register(Arc::new(ReadFileTool::new()));
    registry.register(Arc::new(WriteFileTool::new()));
    registry.register(Arc::new(EditFileTool::new()));
    registry.register(Arc::new(GlobTool::new()));
    registry.register(Arc::new(GrepTool::new(backend)));
    registry.register(Arc::new(
        BashTool::new(session.clone()).with_shell(options.shell.clone()),
    ));
    Ok(session)
}
