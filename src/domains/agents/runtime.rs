use crate::domains::sessions::entity::ToolsConfig;
use anyhow::Result;
use async_trait::async_trait;

/// Process-side lifecycle of a live session handle.
///
/// `cleanup` tears down whatever the runtime owns for the session and
/// `restart` resynchronizes the SDK transcript after stored messages were
/// truncated. Both are called from best-effort paths, so implementations
/// should report failures rather than panic.
#[async_trait]
pub trait SessionRuntime: Send + Sync {
    async fn cleanup(&self) -> Result<()>;

    async fn restart(&self) -> Result<()>;
}

/// Runtime for sessions with no live transport attached.
pub struct DetachedRuntime;

#[async_trait]
impl SessionRuntime for DetachedRuntime {
    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }

    async fn restart(&self) -> Result<()> {
        log::debug!("restart requested for detached session runtime, nothing to resync");
        Ok(())
    }
}

/// Supplies the tools configuration granted to newly created sessions.
pub trait ToolsConfigSource: Send + Sync {
    fn tools_config(&self) -> ToolsConfig;
}

/// Fixed tools configuration, typically loaded from daemon config at startup.
pub struct StaticToolsConfig(pub ToolsConfig);

impl ToolsConfigSource for StaticToolsConfig {
    fn tools_config(&self) -> ToolsConfig {
        self.0.clone()
    }
}
