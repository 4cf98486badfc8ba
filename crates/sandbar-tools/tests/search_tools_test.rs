//! Tests for fs_glob and fs_grep. Grep scenarios run against every backend
//! available on the host so both produce the same output.

use sandbar_runtime::{Tool, ToolContext};
use sandbar_tools::{GlobTool, GrepBackend, GrepTool, RipgrepBackend, WalkerBackend};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

fn workspace() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::Builder::new().prefix("sandbar").tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    (dir, root)
}

fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn set_mtime(path: &Path, secs_ago: u64) {
    set_mtime_at(path, SystemTime::now() - Duration::from_secs(secs_ago));
}

fn set_mtime_at(path: &Path, time: SystemTime) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(time).unwrap();
}

fn backends() -> Vec<Arc<dyn GrepBackend>> {
    let mut all: Vec<Arc<dyn GrepBackend>> = vec![Arc::new(WalkerBackend::new())];
    if let Ok(rg) = which::which("rg") {
        all.push(Arc::new(RipgrepBackend::new(rg)));
    }
    all
}

async fn grep_all(input: Value, ctx: &ToolContext) -> Vec<(&'static str, String)> {
    let mut outputs = Vec::new();
    for backend in backends() {
        let name = backend.name();
        let result = GrepTool::new(backend)
            .execute(input.clone(), ctx)
            .await
            .unwrap();
        assert!(!result.is_error, "{} failed", name);
        outputs.push((name, result.text_content().to_string()));
    }
    outputs
}

// ── fs_glob ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_glob_sorted_newest_first() {
    let (_dir, root) = workspace();
    for (name, age) in [("old.rs", 300), ("new.rs", 10), ("mid.rs", 100)] {
        write(&root.join("src").join(name), "x");
        set_mtime(&root.join("src").join(name), age);
    }
    write(&root.join("README.md"), "x");

    let result = GlobTool::new()
        .execute(json!({"pattern": "**/*.rs"}), &ToolContext::new(vec![root.clone()]))
        .await
        .unwrap();
    let expected = ["new.rs", "mid.rs", "old.rs"]
        .iter()
        .map(|n| root.join("src").join(n).display().to_string())
        .collect::<Vec<_>>()
        .join("\n");
    assert_eq!(result.text_content(), expected);
}

#[tokio::test]
async fn test_glob_equal_mtimes_keep_discovery_order() {
    let (_dir, root) = workspace();
    let same = SystemTime::now() - Duration::from_secs(60);
    for name in ["c.rs", "a.rs", "b.rs"] {
        write(&root.join(name), "x");
        set_mtime_at(&root.join(name), same);
    }
    write(&root.join("fresh.rs"), "x");
    set_mtime(&root.join("fresh.rs"), 1);

    let result = GlobTool::new()
        .execute(json!({"pattern": "*.rs"}), &ToolContext::new(vec![root.clone()]))
        .await
        .unwrap();
    let expected = ["fresh.rs", "a.rs", "b.rs", "c.rs"]
        .iter()
        .map(|n| root.join(n).display().to_string())
        .collect::<Vec<_>>()
        .join("\n");
    assert_eq!(result.text_content(), expected);
}

#[tokio::test]
async fn test_glob_brace_alternation() {
    let (_dir, root) = workspace();
    write(&root.join("app.ts"), "x");
    write(&root.join("lib/util.js"), "x");
    write(&root.join("main.rs"), "x");
    let same = SystemTime::now() - Duration::from_secs(60);
    for name in ["app.ts", "lib/util.js"] {
        set_mtime_at(&root.join(name), same);
    }
    let ctx = ToolContext::new(vec![root.clone()]);

    let result = GlobTool::new()
        .execute(json!({"pattern": "*.{ts,js}"}), &ctx)
        .await
        .unwrap();
    assert_eq!(result.text_content(), root.join("app.ts").display().to_string());

    let result = GlobTool::new()
        .execute(json!({"pattern": "**/*.{ts,js}"}), &ctx)
        .await
        .unwrap();
    assert_eq!(
        result.text_content(),
        format!("{}\n{}", root.join("app.ts").display(), root.join("lib/util.js").display())
    );
}

#[tokio::test]
async fn test_glob_explicit_path_and_directories_excluded() {
    let (_dir, root) = workspace();
    write(&root.join("a/one.txt"), "1");
    std::fs::create_dir_all(root.join("a/dir.txt")).unwrap();
    write(&root.join("b/two.txt"), "2");

    let result = GlobTool::new()
        .execute(
            json!({"pattern": "*.txt", "path": root.join("a").display().to_string()}),
            &ToolContext::new(vec![root.clone()]),
        )
        .await
        .unwrap();
    assert_eq!(result.text_content(), root.join("a/one.txt").display().to_string());
}

#[tokio::test]
async fn test_glob_overlapping_allowed_dirs_dedupe() {
    let (_dir, root) = workspace();
    write(&root.join("sub/x.md"), "x");

    let ctx = ToolContext::new(vec![root.clone(), root.join("sub")]);
    let result = GlobTool::new()
        .execute(json!({"pattern": "**/*.md"}), &ctx)
        .await
        .unwrap();
    assert_eq!(result.text_content(), root.join("sub/x.md").display().to_string());
}

#[tokio::test]
async fn test_glob_hidden_entries_need_literal_dot() {
    let (_dir, root) = workspace();
    write(&root.join(".hidden/a.toml"), "x");
    write(&root.join("visible/a.toml"), "x");
    let ctx = ToolContext::new(vec![root.clone()]);

    let result = GlobTool::new()
        .execute(json!({"pattern": "*/a.toml"}), &ctx)
        .await
        .unwrap();
    assert_eq!(result.text_content(), root.join("visible/a.toml").display().to_string());

    let result = GlobTool::new()
        .execute(json!({"pattern": ".hidden/*.toml"}), &ctx)
        .await
        .unwrap();
    assert_eq!(result.text_content(), root.join(".hidden/a.toml").display().to_string());
}

#[tokio::test]
async fn test_glob_no_matches_is_empty_success() {
    let (_dir, root) = workspace();
    let result = GlobTool::new()
        .execute(json!({"pattern": "*.nothing"}), &ToolContext::new(vec![root]))
        .await
        .unwrap();
    assert!(!result.is_error);
    assert_eq!(result.text_content(), "");
}

#[tokio::test]
async fn test_glob_caps_results() {
    let (_dir, root) = workspace();
    for i in 0..1005 {
        write(&root.join(format!("f{:04}.log", i)), "");
    }
    let result = GlobTool::new()
        .execute(json!({"pattern": "*.log"}), &ToolContext::new(vec![root]))
        .await
        .unwrap();
    let text = result.text_content();
    assert!(text.ends_with("\n\n(showing 1000 of 1005 matches)"));
    assert_eq!(text.lines().filter(|l| l.ends_with(".log")).count(), 1000);
}

#[tokio::test]
async fn test_glob_rejects_outside_path_and_absolute_pattern() {
    let (_dir, root) = workspace();
    let ctx = ToolContext::new(vec![root.join("inner")]);
    std::fs::create_dir_all(root.join("inner")).unwrap();

    let err = GlobTool::new()
        .execute(json!({"pattern": "*", "path": root.display().to_string()}), &ctx)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("outside allowed directories"));

    let err = GlobTool::new()
        .execute(json!({"pattern": "/etc/*"}), &ctx)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("relative"));
}

#[tokio::test]
async fn test_glob_invalid_pattern() {
    let (_dir, root) = workspace();
    let err = GlobTool::new()
        .execute(json!({"pattern": "*.{rs"}), &ToolContext::new(vec![root]))
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("glob error"));
}

#[tokio::test]
async fn test_glob_missing_allowed_dirs() {
    let ctx = ToolContext::new(vec![PathBuf::from("/definitely/not/here")]);
    let err = GlobTool::new()
        .execute(json!({"pattern": "*"}), &ctx)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("none of the allowed directories exist"));
}

// ── fs_grep ─────────────────────────────────────────────────────────────

fn grep_tree() -> (tempfile::TempDir, PathBuf) {
    let (dir, root) = workspace();
    write(&root.join("src/a.rs"), "fn main() {\n    let todo = 1;\n}\n");
    write(&root.join("src/b.py"), "# TODO: x\nprint('todo')\nTODO again\n");
    write(&root.join("notes.txt"), "nothing here\n");
    write(&root.join(".git/config"), "TODO hidden\n");
    write(&root.join("node_modules/pkg/index.js"), "TODO dep\n");
    write(&root.join("__pycache__/m.pyc"), "TODO cache\n");
    (dir, root)
}

#[tokio::test]
async fn test_grep_files_with_matches_default() {
    let (_dir, root) = grep_tree();
    let ctx = ToolContext::new(vec![root.clone()]);
    let expected = [root.join("src/a.rs"), root.join("src/b.py")]
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join("\n");

    for (backend, out) in grep_all(json!({"pattern": "(?i)todo", "path": root.display().to_string()}), &ctx).await {
        assert_eq!(out, expected, "backend {}", backend);
    }
}

#[tokio::test]
async fn test_grep_count_mode_counts_lines() {
    let (_dir, root) = grep_tree();
    let ctx = ToolContext::new(vec![root.clone()]);
    let input = json!({
        "pattern": "TODO",
        "path": root.display().to_string(),
        "output_mode": "count"
    });
    let expected = format!("{}:2", root.join("src/b.py").display());

    for (backend, out) in grep_all(input, &ctx).await {
        assert_eq!(out, expected, "backend {}", backend);
    }
}

#[tokio::test]
async fn test_grep_content_with_context() {
    let (_dir, root) = grep_tree();
    let ctx = ToolContext::new(vec![root.clone()]);
    let file = root.join("src/a.rs");
    let input = json!({
        "pattern": "let",
        "path": root.display().to_string(),
        "output_mode": "content",
        "context": 1
    });
    let expected = format!(
        "{f}:1:fn main() {{\n{f}:2:    let todo = 1;\n{f}:3:}}",
        f = file.display()
    );

    for (backend, out) in grep_all(input, &ctx).await {
        assert_eq!(out, expected, "backend {}", backend);
    }
}

#[tokio::test]
async fn test_grep_head_limit_in_content_mode() {
    let (_dir, root) = grep_tree();
    let ctx = ToolContext::new(vec![root.clone()]);
    let file = root.join("src/b.py");
    let input = json!({
        "pattern": "TODO",
        "path": file.display().to_string(),
        "output_mode": "content",
        "head_limit": 1
    });
    let expected = format!("{}:1:# TODO: x", file.display());

    for (backend, out) in grep_all(input, &ctx).await {
        assert_eq!(out, expected, "backend {}", backend);
    }
}

#[tokio::test]
async fn test_grep_type_and_glob_filters() {
    let (_dir, root) = grep_tree();
    let ctx = ToolContext::new(vec![root.clone()]);
    let py = root.join("src/b.py").display().to_string();

    let by_type = json!({"pattern": "(?i)todo", "path": root.display().to_string(), "type": "py"});
    for (backend, out) in grep_all(by_type, &ctx).await {
        assert_eq!(out, py, "backend {}", backend);
    }

    let by_glob = json!({"pattern": "(?i)todo", "path": root.display().to_string(), "glob": "*.py"});
    for (backend, out) in grep_all(by_glob, &ctx).await {
        assert_eq!(out, py, "backend {}", backend);
    }
}

#[tokio::test]
async fn test_grep_glob_with_directory_part() {
    let (_dir, root) = grep_tree();
    write(&root.join("src/nested/c.rs"), "// TODO nested\n");
    write(&root.join("other/src/d.rs"), "// TODO elsewhere\n");
    let ctx = ToolContext::new(vec![root.clone()]);

    let shallow = json!({"pattern": "(?i)todo", "path": root.display().to_string(), "glob": "src/*.rs"});
    let expected = root.join("src/a.rs").display().to_string();
    for (backend, out) in grep_all(shallow, &ctx).await {
        assert_eq!(out, expected, "backend {}", backend);
    }

    let deep = json!({"pattern": "(?i)todo", "path": root.display().to_string(), "glob": "src/**/*.rs"});
    let expected = format!(
        "{}\n{}",
        root.join("src/a.rs").display(),
        root.join("src/nested/c.rs").display()
    );
    for (backend, out) in grep_all(deep, &ctx).await {
        assert_eq!(out, expected, "backend {}", backend);
    }
}

#[tokio::test]
async fn test_grep_searches_non_utf8_files() {
    let (_dir, root) = workspace();
    let file = root.join("latin1.txt");
    std::fs::write(&file, b"caf\xe9\nneedle here\n").unwrap();
    let ctx = ToolContext::new(vec![root.clone()]);

    let listing = json!({"pattern": "needle", "path": root.display().to_string()});
    for (backend, out) in grep_all(listing, &ctx).await {
        assert_eq!(out, file.display().to_string(), "backend {}", backend);
    }

    let content = json!({
        "pattern": "needle",
        "path": root.display().to_string(),
        "output_mode": "content",
        "context": 1
    });
    let expected = format!("{f}:1:caf\u{fffd}\n{f}:2:needle here", f = file.display());
    for (backend, out) in grep_all(content, &ctx).await {
        assert_eq!(out, expected, "backend {}", backend);
    }
}

#[tokio::test]
async fn test_grep_no_matches() {
    let (_dir, root) = grep_tree();
    let ctx = ToolContext::new(vec![root.clone()]);
    for mode in ["content", "files_with_matches", "count"] {
        let input = json!({
            "pattern": "zzz_never",
            "path": root.display().to_string(),
            "output_mode": mode
        });
        for (backend, out) in grep_all(input, &ctx).await {
            assert_eq!(out, "no matches found", "backend {} mode {}", backend, mode);
        }
    }
}

#[tokio::test]
async fn test_grep_invalid_regex() {
    let (_dir, root) = grep_tree();
    let ctx = ToolContext::new(vec![root.clone()]);
    for backend in backends() {
        let err = GrepTool::new(backend)
            .execute(json!({"pattern": "(", "path": root.display().to_string()}), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid regex"));
    }
}

#[tokio::test]
async fn test_grep_rejects_outside_and_missing_paths() {
    let (_dir, root) = grep_tree();
    let ctx = ToolContext::new(vec![root.join("src")]);
    let tool = GrepTool::new(Arc::new(WalkerBackend::new()));

    let err = tool
        .execute(json!({"pattern": "x", "path": root.join("notes.txt").display().to_string()}), &ctx)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("outside allowed directories"));

    let err = tool
        .execute(json!({"pattern": "x", "path": root.join("src/gone").display().to_string()}), &ctx)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("path not found"));
}

#[tokio::test]
async fn test_grep_unknown_output_mode() {
    let (_dir, root) = grep_tree();
    let err = GrepTool::new(Arc::new(WalkerBackend::new()))
        .execute(
            json!({"pattern": "x", "path": root.display().to_string(), "output_mode": "lines"}),
            &ToolContext::new(vec![root.clone()]),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("output_mode"));
}
