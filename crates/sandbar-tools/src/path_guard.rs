use sandbar_runtime::ToolError;
use std::path::{Component, Path, PathBuf};

/// Symlink hops followed for a dangling final component before giving up.
const MAX_LINK_DEPTH: usize = 40;

/// Directory-allow-list resolver; prevents path traversal attacks.
/// Every tool runs its target paths through `validate` before touching disk.
pub struct PathGuard;

impl PathGuard {
    /// Decide whether `path` falls under one of `allowed_dirs`.
    ///
    /// Returns the path the caller should operate on: the resolved location
    /// when the set is non-empty, the input unchanged when it is empty.
    pub fn validate(path: &Path, allowed_dirs: &[PathBuf]) -> Result<PathBuf, ToolError> {
        if !path.is_absolute() {
            return Err(ToolError::PathRejected("path must be absolute".to_string()));
        }

        if allowed_dirs.is_empty() {
            return Ok(path.to_path_buf());
        }

        let resolved = resolve(path);
        for dir in allowed_dirs {
            let root = resolve(dir);
            // Path::starts_with compares whole components, so /allowed2 never
            // matches /allowed
            if resolved.starts_with(&root) {
                return Ok(resolved);
            }
        }

        Err(ToolError::PathRejected(format!(
            "path {} is outside allowed directories",
            path.display()
        )))
    }

    pub fn validate_str(path: &str, allowed_dirs: &[PathBuf]) -> Result<PathBuf, ToolError> {
        Self::validate(Path::new(path), allowed_dirs)
    }
}

/// Real location of `path`.
///
/// The raw path is canonicalized first so `..` is applied after any symlink
/// before it. For a path that does not exist yet, the parent is resolved the
/// same way and the last component is appended, so a new file is checked by
/// where it will actually be created.
fn resolve(path: &Path) -> PathBuf {
    resolve_with_depth(path, 0)
}

fn resolve_with_depth(path: &Path, depth: usize) -> PathBuf {
    if let Ok(real) = path.canonicalize() {
        return real;
    }

    // Dangling symlink: follow it to where a write would land
    if depth < MAX_LINK_DEPTH {
        if let Ok(target) = std::fs::read_link(path) {
            let parent = path.parent().unwrap_or(Path::new("/"));
            return resolve_with_depth(&parent.join(target), depth + 1);
        }
    }

    match (path.parent(), path.components().next_back()) {
        (Some(parent), Some(last)) => {
            normalize_path(&resolve_with_depth(parent, depth).join(last))
        }
        _ => normalize_path(path),
    }
}

/// Normalize a path by resolving `.` and `..` components without filesystem access.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut parts: Vec<Component> = Vec::new();
    for c in path.components() {
        match c {
            Component::ParentDir => {
                // Only pop normal components, never pop root/prefix
                if matches!(parts.last(), Some(Component::Normal(_))) {
                    parts.pop();
                }
            }
            Component::CurDir => {}
            other => parts.push(other),
        }
    }
    parts.iter().collect()
}
