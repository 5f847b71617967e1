use crate::config::DaemonConfig;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "leitwerkd", version, about = "Coding-agent session daemon")]
pub struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Base directory for sessions created without an explicit workspace.
    #[arg(long, value_name = "DIR")]
    pub workspace_root: Option<PathBuf>,

    /// Database file location.
    #[arg(long, value_name = "FILE")]
    pub database: Option<PathBuf>,

    /// Disable per-session git worktrees for this run.
    #[arg(long)]
    pub no_worktrees: bool,
}

impl Cli {
    /// Command-line flags win over file configuration.
    pub fn apply(&self, config: &mut DaemonConfig) {
        if let Some(root) = &self.workspace_root {
            config.workspace_root = root.clone();
        }
        if let Some(database) = &self.database {
            config.database_path = Some(database.clone());
        }
        if self.no_worktrees {
            config.worktrees_enabled = false;
        }
    }
}
