use anyhow::{Context, Result};
use sandbar_tools::GrepStrategy;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub bash: BashConfig,

    #[serde(default)]
    pub grep: GrepConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct SandboxConfig {
    /// Entries may use `~` and `$VAR`
    #[serde(default)]
    pub allowed_dirs: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct BashConfig {
    #[serde(default = "default_shell")]
    pub shell: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
pub struct GrepConfig {
    #[serde(default)]
    pub strategy: GrepStrategy,
}

fn default_shell() -> PathBuf {
    PathBuf::from(sandbar_tools::shell_tool::DEFAULT_SHELL)
}

impl Default for BashConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
        }
    }
}

/// Load config from file or use defaults
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let content =
        fs::read_to_string(path).context(format!("Failed to read config file: {:?}", path))?;
    let config: Config = toml::from_str(&content).context("Failed to parse TOML config")?;
    Ok(config)
}

/// Static allowed directories: config entries (expanded) followed by CLI
/// entries, with relative paths anchored at `cwd`.
pub fn resolve_allowed_dirs(
    config_dirs: &[String],
    cli_dirs: &[PathBuf],
    cwd: &Path,
) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::with_capacity(config_dirs.len() + cli_dirs.len());
    for raw in config_dirs {
        let expanded = shellexpand::full(raw)
            .with_context(|| format!("Failed to expand allowed directory: {}", raw))?;
        dirs.push(PathBuf::from(expanded.as_ref()));
    }
    dirs.extend(cli_dirs.iter().cloned());

    Ok(dirs
        .into_iter()
        .map(|d| if d.is_absolute() { d } else { cwd.join(d) })
        .collect())
}
