use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    PendingWorktreeChoice,
    Archived,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::PendingWorktreeChoice => "pending_worktree_choice",
            SessionStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "pending_worktree_choice" => Some(SessionStatus::PendingWorktreeChoice),
            "archived" => Some(SessionStatus::Archived),
            _ => None,
        }
    }
}

/// Role of a session inside a manager/worker pair spawned by a room agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    Manager,
    Worker,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsConfig {
    #[serde(default)]
    pub allowed: Vec<String>,
    #[serde(default)]
    pub disallowed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcp_servers: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_level: Option<String>,
}

/// Caller-supplied overrides on top of the deployment defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfigPatch {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub permission_mode: Option<String>,
    pub sandbox: Option<bool>,
    pub mcp_servers: Option<Value>,
    pub system_prompt: Option<String>,
    pub thinking_level: Option<String>,
}

impl SessionConfig {
    pub fn apply(&mut self, patch: &SessionConfigPatch) {
        if let Some(model) = &patch.model {
            self.model = model.clone();
        }
        if let Some(max_tokens) = patch.max_tokens {
            self.max_tokens = max_tokens;
        }
        if let Some(temperature) = patch.temperature {
            self.temperature = temperature;
        }
        if let Some(permission_mode) = &patch.permission_mode {
            self.permission_mode = Some(permission_mode.clone());
        }
        if let Some(sandbox) = patch.sandbox {
            self.sandbox = Some(sandbox);
        }
        if let Some(mcp_servers) = &patch.mcp_servers {
            self.mcp_servers = Some(mcp_servers.clone());
        }
        if let Some(system_prompt) = &patch.system_prompt {
            self.system_prompt = Some(system_prompt.clone());
        }
        if let Some(thinking_level) = &patch.thinking_level {
            self.thinking_level = Some(thinking_level.clone());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorktreeChoiceKind {
    Worktree,
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorktreeChoiceStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeChoiceRecord {
    pub status: WorktreeChoiceStatus,
    pub choice: WorktreeChoiceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Branch the session ended up on: the created worktree branch, or the
    /// detected current branch for direct sessions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeInfo {
    pub worktree_path: PathBuf,
    pub main_repo_path: PathBuf,
    pub branch: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionMetadata {
    pub message_count: u64,
    pub total_tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_cost: f64,
    pub tool_call_count: u64,
    pub title_generated: bool,
    pub workspace_initialized: bool,
    pub removed_outputs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worktree_choice: Option<WorktreeChoiceRecord>,
    /// Uuid of the user message the SDK should resume from after a
    /// conversation truncation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_session_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_type: Option<SessionRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paired_session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_task_id: Option<String>,
}

/// Partial metadata update. Plain `Option` fields are merge-if-present;
/// `resume_session_at` is doubly optional so a patch can explicitly clear it
/// (`Some(None)`) as opposed to leaving it untouched (`None`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetadataPatch {
    pub message_count: Option<u64>,
    pub total_tokens: Option<u64>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub total_cost: Option<f64>,
    pub tool_call_count: Option<u64>,
    pub title_generated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_session_at: Option<Option<String>>,
    pub worktree_choice: Option<WorktreeChoiceRecord>,
    pub current_task_id: Option<String>,
}

impl SessionMetadata {
    pub fn apply(&mut self, patch: &MetadataPatch) {
        if let Some(v) = patch.message_count {
            self.message_count = v;
        }
        if let Some(v) = patch.total_tokens {
            self.total_tokens = v;
        }
        if let Some(v) = patch.input_tokens {
            self.input_tokens = v;
        }
        if let Some(v) = patch.output_tokens {
            self.output_tokens = v;
        }
        if let Some(v) = patch.total_cost {
            self.total_cost = v;
        }
        if let Some(v) = patch.tool_call_count {
            self.tool_call_count = v;
        }
        if let Some(v) = patch.title_generated {
            self.title_generated = v;
        }
        if let Some(v) = &patch.resume_session_at {
            self.resume_session_at = v.clone();
        }
        if let Some(v) = &patch.worktree_choice {
            self.worktree_choice = Some(v.clone());
        }
        if let Some(v) = &patch.current_task_id {
            self.current_task_id = Some(v.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub workspace_path: PathBuf,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub config: SessionConfig,
    pub metadata: SessionMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worktree: Option<WorktreeInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial session update as accepted by `SessionLifecycle::update` and
/// re-broadcast verbatim in the `session.updated` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<SessionConfigPatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataPatch>,
}

impl SessionPatch {
    pub fn is_empty(&self) -> bool {
        *self == SessionPatch::default()
    }
}

impl Session {
    pub fn apply_patch(&mut self, patch: &SessionPatch) {
        if let Some(title) = &patch.title {
            self.title = Some(title.clone());
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(workspace_path) = &patch.workspace_path {
            self.workspace_path = workspace_path.clone();
        }
        if let Some(config) = &patch.config {
            self.config.apply(config);
        }
        if let Some(metadata) = &patch.metadata {
            self.metadata.apply(metadata);
        }
    }
}

/// One stored SDK message. `message_type` mirrors the SDK's open-ended type
/// tags, so it stays a plain string with helpers for the two types this core
/// dispatches on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub uuid: String,
    pub session_id: String,
    pub message_type: String,
    pub content: Value,
    pub timestamp: DateTime<Utc>,
}

impl MessageRecord {
    pub fn is_user(&self) -> bool {
        self.message_type == "user"
    }

    pub fn is_assistant(&self) -> bool {
        self.message_type == "assistant"
    }
}

/// Inputs to `SessionLifecycle::create`.
#[derive(Debug, Clone, Default)]
pub struct CreateSessionParams {
    pub workspace_path: Option<PathBuf>,
    pub title: Option<String>,
    pub config: Option<SessionConfigPatch>,
    /// When set, a worktree is provisioned eagerly from this base branch
    /// instead of deferring to the worktree-choice flow.
    pub base_branch: Option<String>,
    pub session_type: Option<SessionRole>,
    pub paired_session_id: Option<String>,
    pub parent_session_id: Option<String>,
    pub current_task_id: Option<String>,
    pub room_id: Option<String>,
    pub created_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_session() -> Session {
        Session {
            id: "11111111-2222-3333-4444-555555555555".to_string(),
            workspace_path: PathBuf::from("/workspaces/demo"),
            status: SessionStatus::Active,
            title: Some("Demo".to_string()),
            config: SessionConfig {
                model: "sonnet".to_string(),
                max_tokens: 8192,
                temperature: 0.7,
                ..Default::default()
            },
            metadata: SessionMetadata::default(),
            worktree: None,
            room_id: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn status_string_round_trip() {
        for status in [
            SessionStatus::Active,
            SessionStatus::PendingWorktreeChoice,
            SessionStatus::Archived,
        ] {
            assert_eq!(SessionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SessionStatus::parse("running"), None);
    }

    #[test]
    fn session_serializes_camel_case() {
        let session = sample_session();
        let json = serde_json::to_value(&session).unwrap();
        assert!(json.get("workspacePath").is_some());
        assert!(json.get("createdAt").is_some());
        assert_eq!(json["status"], "active");
    }

    #[test]
    fn patch_merges_without_clobbering_unrelated_fields() {
        let mut session = sample_session();
        session.metadata.message_count = 7;

        let patch = SessionPatch {
            title: Some("Renamed".to_string()),
            config: Some(SessionConfigPatch {
                temperature: Some(0.2),
                ..Default::default()
            }),
            ..Default::default()
        };
        session.apply_patch(&patch);

        assert_eq!(session.title.as_deref(), Some("Renamed"));
        assert_eq!(session.config.temperature, 0.2);
        assert_eq!(session.config.model, "sonnet");
        assert_eq!(session.metadata.message_count, 7);
    }

    #[test]
    fn metadata_patch_can_clear_resume_anchor() {
        let mut metadata = SessionMetadata {
            resume_session_at: Some("uuid-1".to_string()),
            ..Default::default()
        };

        let untouched = MetadataPatch::default();
        metadata.apply(&untouched);
        assert_eq!(metadata.resume_session_at.as_deref(), Some("uuid-1"));

        let clear = MetadataPatch {
            resume_session_at: Some(None),
            ..Default::default()
        };
        metadata.apply(&clear);
        assert_eq!(metadata.resume_session_at, None);
    }

    #[test]
    fn metadata_survives_rows_written_by_older_releases() {
        let metadata: SessionMetadata =
            serde_json::from_str(r#"{"messageCount": 3, "titleGenerated": true}"#).unwrap();
        assert_eq!(metadata.message_count, 3);
        assert!(metadata.title_generated);
        assert!(metadata.removed_outputs.is_empty());
    }
}
