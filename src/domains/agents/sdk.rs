use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of asking the SDK transport to restore files to a checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewindFilesOutcome {
    pub can_rewind: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_changed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insertions: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletions: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RewindFilesOutcome {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            can_rewind: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Control channel to a running SDK query.
///
/// Implementations wrap whatever transport the agent process exposes. The
/// rewind paths only ever call this after checking `transport_ready`, and a
/// `dry_run` call must leave the working tree untouched.
#[async_trait]
pub trait SdkQuery: Send + Sync {
    fn transport_ready(&self) -> bool;

    async fn rewind_files(&self, message_uuid: &str, dry_run: bool) -> RewindFilesOutcome;
}
