use clap::{Parser, ValueEnum};
use sandbar_tools::GrepStrategy;
use std::path::PathBuf;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrepStrategyArg {
    /// ripgrep if `rg` is on PATH, otherwise built-in
    Auto,
    /// Always use ripgrep; fail at startup if it is missing
    Ripgrep,
    /// Always use the built-in directory walker
    Builtin,
}

impl From<GrepStrategyArg> for GrepStrategy {
    fn from(arg: GrepStrategyArg) -> Self {
        match arg {
            GrepStrategyArg::Auto => GrepStrategy::Auto,
            GrepStrategyArg::Ripgrep => GrepStrategy::Ripgrep,
            GrepStrategyArg::Builtin => GrepStrategy::Builtin,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "sandbar")]
#[command(
    about = "Sandboxed filesystem and shell tools served as JSON-RPC over stdio",
    long_about = None
)]
#[command(version)]
pub struct Cli {
    /// Directory the tools may access (repeatable). No directories means no restriction
    #[arg(long = "allowed-dir", value_name = "DIR")]
    pub allowed_dirs: Vec<PathBuf>,

    /// Path to config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Grep implementation; overrides the config file
    #[arg(long, value_enum)]
    pub grep_strategy: Option<GrepStrategyArg>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_dir_is_repeatable() {
        let cli = Cli::parse_from([
            "sandbar",
            "--allowed-dir",
            "/a",
            "--allowed-dir",
            "/b",
            "--grep-strategy",
            "builtin",
        ]);
        assert_eq!(cli.allowed_dirs, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(cli.grep_strategy, Some(GrepStrategyArg::Builtin));
        assert!(cli.config.is_none());
    }

    #[test]
    fn defaults_are_empty() {
        let cli = Cli::parse_from(["sandbar"]);
        assert!(cli.allowed_dirs.is_empty());
        assert!(cli.grep_strategy.is_none());
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        assert!(Cli::try_parse_from(["sandbar", "--grep-strategy", "fast"]).is_err());
    }
}
