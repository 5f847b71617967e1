use clap::Parser;
use leitwerk::cli::Cli;
use leitwerk::config::DaemonConfig;
use leitwerk::domains::agents::StaticToolsConfig;
use leitwerk::domains::git::GitWorktreeManager;
use leitwerk::domains::sessions::{
    DetachedHandleFactory, LifecycleSettings, SessionCache, SessionLifecycle, SessionStore,
};
use leitwerk::infrastructure::database::Database;
use leitwerk::infrastructure::events::{DaemonHub, MessageHub};
use mimalloc::MiMalloc;
use std::sync::Arc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = DaemonConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;

    let db = Database::new(config.database_path.clone())?;
    let store = SessionStore::new(db);
    let cache = Arc::new(SessionCache::new());
    let hub = DaemonHub::new();
    let messages = MessageHub::new();

    let lifecycle = SessionLifecycle::new(
        store,
        cache,
        Arc::new(GitWorktreeManager),
        Arc::new(DetachedHandleFactory),
        Arc::new(StaticToolsConfig(config.tools.clone())),
        hub,
        messages,
        LifecycleSettings {
            workspace_root: config.workspace_root.clone(),
            worktrees_enabled: config.worktrees_enabled,
            defaults: config.session_config(),
        },
    );

    let restored = lifecycle.restore_cache()?;
    log::info!("Restored {restored} active sessions into the cache");
    log::info!("leitwerkd ready (workspace root: {})", config.workspace_root.display());

    tokio::signal::ctrl_c().await?;
    log::info!("Shutting down");
    Ok(())
}
