use std::path::PathBuf;

/// Per-call execution context handed to every tool.
///
/// `allowed_dirs` is the effective sandbox for this call: the process-wide
/// static list followed by any directories the caller supplied. An empty
/// list means no restriction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolContext {
    pub allowed_dirs: Vec<PathBuf>,
}

impl ToolContext {
    pub fn new(allowed_dirs: Vec<PathBuf>) -> Self {
        Self { allowed_dirs }
    }

    /// Context with no directory restriction.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Concatenate static and per-call directories, static first.
    pub fn merged<S, C>(static_dirs: S, call_dirs: C) -> Self
    where
        S: IntoIterator,
        S::Item: Into<PathBuf>,
        C: IntoIterator,
        C::Item: Into<PathBuf>,
    {
        let allowed_dirs = static_dirs
            .into_iter()
            .map(Into::into)
            .chain(call_dirs.into_iter().map(Into::into))
            .collect();
        Self { allowed_dirs }
    }

    pub fn is_restricted(&self) -> bool {
        !self.allowed_dirs.is_empty()
    }
}
