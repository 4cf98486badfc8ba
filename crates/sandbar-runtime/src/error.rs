//! Error taxonomy shared by every tool.
//!
//! Handlers return `anyhow::Result`, so a `ToolError` usually travels inside an
//! `anyhow::Error`. None of these are fatal: the registry turns each one into
//! an error result for the caller.

/// Recoverable tool failures.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Arguments did not match the tool's declared schema, or a value was
    /// syntactically invalid (bad regex, bad glob, empty search string).
    #[error("{0}")]
    InvalidArguments(String),

    /// Path was relative or fell outside the allowed directories.
    #[error("{0}")]
    PathRejected(String),

    /// File or directory does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The operation's precondition on file content did not hold.
    #[error("{0}")]
    Precondition(String),

    /// External command failed, timed out, or could not be spawned.
    #[error("{0}")]
    Execution(String),

    /// No tool registered under this name.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}
