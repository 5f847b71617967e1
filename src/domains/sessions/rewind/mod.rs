pub mod analysis;
pub mod operations;

pub use analysis::{RewindCase, RewindCaseKind, RewindRange, analyze_rewind_case, build_rewind_range};
pub use operations::{FileOperation, RevertSummary, extract_file_operations, revert_file_operations};

use crate::domains::agents::{RewindFilesOutcome, SdkQuery};
use crate::domains::sessions::cache::SessionCache;
use crate::domains::sessions::entity::{MessageRecord, MetadataPatch};
use crate::domains::sessions::repository::SessionStore;
use crate::errors::DaemonError;
use crate::events::DaemonEvent;
use crate::infrastructure::database::SdkMessageQuery;
use crate::infrastructure::events::DaemonHub;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

const UNKNOWN_ERROR: &str = "Unknown error";
const NO_VALID_MESSAGES: &str = "No valid messages found";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewindMode {
    Files,
    Conversation,
    Both,
}

impl RewindMode {
    fn includes_files(self) -> bool {
        matches!(self, RewindMode::Files | RewindMode::Both)
    }

    fn includes_conversation(self) -> bool {
        matches!(self, RewindMode::Conversation | RewindMode::Both)
    }
}

/// One user turn a client can rewind to, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewindPoint {
    pub uuid: String,
    pub turn_number: u32,
    pub timestamp: DateTime<Utc>,
    pub content: Value,
}

/// Dry-run answer for an ordinary checkpoint rewind. Never an Err: expected
/// failures land in `error` with `can_rewind: false`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewindPreview {
    pub can_rewind: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_changed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insertions: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletions: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages_affected: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RewindPreview {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            can_rewind: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Result of an executed rewind. Like previews, execution reports failures in
/// the result object instead of erroring; interactive callers inspect and
/// retry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewindOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_rewound: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_changed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insertions: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletions: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages_deleted: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_reverts: Option<RevertSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewind_case: Option<RewindCaseKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RewindOutcome {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// How a file in a selective preview would get restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RevertVia {
    SdkCheckpoint,
    DiffOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileToRevert {
    pub file_path: String,
    pub revert_via: RevertVia,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectiveRewindPreview {
    pub can_rewind: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewind_case: Option<RewindCaseKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages_to_delete: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub files_to_revert: Vec<FileToRevert>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SelectiveRewindPreview {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            can_rewind: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Computes and applies "go back to an earlier point" for a session, across
/// the three mechanisms: the SDK's own checkpoint rewind, diff-based file
/// reverts for spans without a user anchor, and the hybrid of both.
///
/// Execution brackets itself with `rewind.started` and then exactly one of
/// `rewind.completed` / `rewind.failed` on the internal hub.
pub struct RewindHandler {
    store: SessionStore,
    cache: Arc<SessionCache>,
    hub: DaemonHub,
}

impl RewindHandler {
    pub fn new(store: SessionStore, cache: Arc<SessionCache>, hub: DaemonHub) -> Self {
        Self { store, cache, hub }
    }

    /// All user messages newest first; `turn_number` counts from the oldest,
    /// 1-indexed, so it stays stable as new turns arrive.
    pub fn get_rewind_points(&self, session_id: &str) -> Result<Vec<RewindPoint>, DaemonError> {
        let messages = self
            .store
            .get_user_messages(session_id)
            .map_err(DaemonError::db)?;

        Ok(messages
            .into_iter()
            .enumerate()
            .rev()
            .map(|(index, message)| RewindPoint {
                uuid: message.uuid,
                turn_number: (index + 1) as u32,
                timestamp: message.timestamp,
                content: message.content,
            })
            .collect())
    }

    pub async fn preview_rewind(&self, session_id: &str, checkpoint_uuid: &str) -> RewindPreview {
        match self.build_preview(session_id, checkpoint_uuid).await {
            Ok(preview) => preview,
            Err(message) => RewindPreview::failure(message),
        }
    }

    pub async fn execute_rewind(
        &self,
        session_id: &str,
        checkpoint_uuid: &str,
        mode: RewindMode,
    ) -> RewindOutcome {
        self.hub.emit(
            DaemonEvent::RewindStarted,
            &json!({ "sessionId": session_id, "checkpointId": checkpoint_uuid, "mode": mode }),
        );

        match self.run_rewind(session_id, checkpoint_uuid, mode).await {
            Ok(outcome) => {
                self.hub.emit(
                    DaemonEvent::RewindCompleted,
                    &json!({
                        "sessionId": session_id,
                        "checkpointId": checkpoint_uuid,
                        "mode": mode,
                        "result": outcome,
                    }),
                );
                outcome
            }
            Err(message) => {
                log::warn!("Rewind for session {session_id} failed: {message}");
                self.hub.emit(
                    DaemonEvent::RewindFailed,
                    &json!({
                        "sessionId": session_id,
                        "checkpointId": checkpoint_uuid,
                        "mode": mode,
                        "error": message,
                    }),
                );
                RewindOutcome::failure(message)
            }
        }
    }

    pub async fn preview_selective_rewind(
        &self,
        session_id: &str,
        target_uuids: &[String],
    ) -> SelectiveRewindPreview {
        match self.build_selective_preview(session_id, target_uuids).await {
            Ok(preview) => preview,
            Err(message) => SelectiveRewindPreview::failure(message),
        }
    }

    pub async fn execute_selective_rewind(
        &self,
        session_id: &str,
        target_uuids: &[String],
        mode: RewindMode,
    ) -> RewindOutcome {
        self.hub.emit(
            DaemonEvent::RewindStarted,
            &json!({ "sessionId": session_id, "targetUuids": target_uuids, "mode": mode }),
        );

        match self.run_selective(session_id, target_uuids, mode).await {
            Ok(outcome) => {
                self.hub.emit(
                    DaemonEvent::RewindCompleted,
                    &json!({
                        "sessionId": session_id,
                        "targetUuids": target_uuids,
                        "mode": mode,
                        "result": outcome,
                    }),
                );
                outcome
            }
            Err(message) => {
                log::warn!("Selective rewind for session {session_id} failed: {message}");
                self.hub.emit(
                    DaemonEvent::RewindFailed,
                    &json!({
                        "sessionId": session_id,
                        "targetUuids": target_uuids,
                        "mode": mode,
                        "error": message,
                    }),
                );
                RewindOutcome::failure(message)
            }
        }
    }

    async fn build_preview(
        &self,
        session_id: &str,
        checkpoint_uuid: &str,
    ) -> Result<RewindPreview, String> {
        let (checkpoint, query) = self
            .rewind_preconditions(session_id, checkpoint_uuid)
            .await
            .map_err(|e| e.to_string())?;

        let files = query.rewind_files(&checkpoint.uuid, true).await;
        let messages_affected = self
            .store
            .count_messages_after(session_id, checkpoint.timestamp)
            .map_err(|e| e.to_string())?;

        Ok(RewindPreview {
            can_rewind: files.can_rewind,
            files_changed: files.files_changed,
            insertions: files.insertions,
            deletions: files.deletions,
            messages_affected: Some(messages_affected),
            error: files.error,
        })
    }

    async fn run_rewind(
        &self,
        session_id: &str,
        checkpoint_uuid: &str,
        mode: RewindMode,
    ) -> Result<RewindOutcome, String> {
        let (checkpoint, query) = self
            .rewind_preconditions(session_id, checkpoint_uuid)
            .await
            .map_err(|e| e.to_string())?;

        match mode {
            RewindMode::Files => {
                let files = query.rewind_files(&checkpoint.uuid, false).await;
                if !files.can_rewind {
                    return Err(files.error.unwrap_or_else(|| UNKNOWN_ERROR.to_string()));
                }
                Ok(RewindOutcome {
                    success: true,
                    files_changed: files.files_changed,
                    insertions: files.insertions,
                    deletions: files.deletions,
                    ..Default::default()
                })
            }
            RewindMode::Conversation => {
                let deleted = self
                    .truncate_conversation(session_id, checkpoint.timestamp)
                    .await?;
                Ok(RewindOutcome {
                    success: true,
                    conversation_rewound: Some(true),
                    messages_deleted: Some(deleted),
                    ..Default::default()
                })
            }
            RewindMode::Both => {
                // Files first, best-effort: a file failure must never block
                // the conversation truncation.
                let files = query.rewind_files(&checkpoint.uuid, false).await;
                if !files.can_rewind {
                    log::warn!(
                        "File rewind for session {session_id} failed, continuing with conversation: {}",
                        files.error.as_deref().unwrap_or(UNKNOWN_ERROR)
                    );
                }

                let deleted = self
                    .truncate_conversation(session_id, checkpoint.timestamp)
                    .await?;

                let mut outcome = RewindOutcome {
                    success: true,
                    conversation_rewound: Some(true),
                    messages_deleted: Some(deleted),
                    ..Default::default()
                };
                if files.can_rewind {
                    outcome.files_changed = files.files_changed;
                    outcome.insertions = files.insertions;
                    outcome.deletions = files.deletions;
                }
                Ok(outcome)
            }
        }
    }

    async fn build_selective_preview(
        &self,
        session_id: &str,
        target_uuids: &[String],
    ) -> Result<SelectiveRewindPreview, String> {
        let (range, case) = self.resolve_selective_range(session_id, target_uuids)?;

        if case == RewindCase::SdkNative {
            let preview = self.preview_rewind(session_id, &range.earliest.uuid).await;
            return Ok(SelectiveRewindPreview {
                can_rewind: preview.can_rewind,
                rewind_case: Some(RewindCaseKind::SdkNative),
                messages_to_delete: preview.messages_affected,
                files_to_revert: files_to_revert(&case, &range),
                error: preview.error,
            });
        }

        Ok(SelectiveRewindPreview {
            can_rewind: true,
            rewind_case: Some(case.kind()),
            messages_to_delete: Some(range.in_range.len() as u64),
            files_to_revert: files_to_revert(&case, &range),
            error: None,
        })
    }

    async fn run_selective(
        &self,
        session_id: &str,
        target_uuids: &[String],
        mode: RewindMode,
    ) -> Result<RewindOutcome, String> {
        let (range, case) = self.resolve_selective_range(session_id, target_uuids)?;

        match &case {
            RewindCase::SdkNative => {
                // The true rewind anchor is the enclosing user turn, so the
                // ordinary checkpoint path takes over from here.
                let mut outcome = self
                    .run_rewind(session_id, &range.earliest.uuid, mode)
                    .await?;
                outcome.rewind_case = Some(RewindCaseKind::SdkNative);
                Ok(outcome)
            }
            RewindCase::DiffBased {
                messages_before_user,
            } => {
                let mut outcome = RewindOutcome {
                    success: true,
                    rewind_case: Some(RewindCaseKind::DiffBased),
                    ..Default::default()
                };

                if mode.includes_files() {
                    let operations = extract_file_operations(messages_before_user);
                    outcome.file_reverts = Some(revert_file_operations(&operations).await);
                }
                if mode.includes_conversation() {
                    let deleted = self
                        .truncate_conversation(session_id, range.earliest.timestamp)
                        .await?;
                    outcome.conversation_rewound = Some(true);
                    outcome.messages_deleted = Some(deleted);
                }
                Ok(outcome)
            }
            RewindCase::Hybrid {
                oldest_user_message,
                messages_before_user,
            } => {
                let mut outcome = RewindOutcome {
                    success: true,
                    rewind_case: Some(RewindCaseKind::Hybrid),
                    ..Default::default()
                };

                if mode.includes_files() {
                    match self.hybrid_file_step(session_id, oldest_user_message, messages_before_user).await {
                        Ok((files, reverts)) => {
                            outcome.files_changed = files.files_changed;
                            outcome.insertions = files.insertions;
                            outcome.deletions = files.deletions;
                            outcome.file_reverts = Some(reverts);
                        }
                        Err(message) => {
                            if mode == RewindMode::Files {
                                return Err(message);
                            }
                            log::warn!(
                                "File step for session {session_id} failed, continuing with conversation: {message}"
                            );
                        }
                    }
                }
                if mode.includes_conversation() {
                    // The truncation point is the earliest message, which
                    // precedes the file anchor: messages before the oldest
                    // user message are still part of the rewound span.
                    let deleted = self
                        .truncate_conversation(session_id, range.earliest.timestamp)
                        .await?;
                    outcome.conversation_rewound = Some(true);
                    outcome.messages_deleted = Some(deleted);
                }
                Ok(outcome)
            }
        }
    }

    /// SDK rewind to the anchor, then diff-revert of the operations applied
    /// before it. The diff side only runs once the SDK side has restored the
    /// anchor state it builds on.
    async fn hybrid_file_step(
        &self,
        session_id: &str,
        anchor: &MessageRecord,
        messages_before_user: &[MessageRecord],
    ) -> Result<(RewindFilesOutcome, RevertSummary), String> {
        let query = self
            .active_query(session_id)
            .await
            .map_err(|e| e.to_string())?;

        let files = query.rewind_files(&anchor.uuid, false).await;
        if !files.can_rewind {
            return Err(files.error.unwrap_or_else(|| UNKNOWN_ERROR.to_string()));
        }

        let operations = extract_file_operations(messages_before_user);
        let reverts = revert_file_operations(&operations).await;
        Ok((files, reverts))
    }

    fn resolve_selective_range(
        &self,
        session_id: &str,
        target_uuids: &[String],
    ) -> Result<(RewindRange, RewindCase), String> {
        let page = self
            .store
            .get_sdk_messages(session_id, &SdkMessageQuery::default())
            .map_err(|e| e.to_string())?;

        let range = build_rewind_range(&page.messages, target_uuids)
            .ok_or_else(|| NO_VALID_MESSAGES.to_string())?;
        let case = analyze_rewind_case(&range.earliest, &range.in_range, &range.user_in_range);
        Ok((range, case))
    }

    async fn rewind_preconditions(
        &self,
        session_id: &str,
        checkpoint_uuid: &str,
    ) -> Result<(MessageRecord, Arc<dyn SdkQuery>), DaemonError> {
        let checkpoint = self
            .store
            .get_user_message_by_uuid(session_id, checkpoint_uuid)
            .map_err(DaemonError::db)?
            .ok_or(DaemonError::RewindPointNotFound)?;
        let query = self.active_query(session_id).await?;
        Ok((checkpoint, query))
    }

    async fn active_query(&self, session_id: &str) -> Result<Arc<dyn SdkQuery>, DaemonError> {
        let handle = self.cache.get(session_id).ok_or(DaemonError::QueryNotActive)?;
        let query = handle.query().await.ok_or(DaemonError::QueryNotActive)?;
        if !query.transport_ready() {
            return Err(DaemonError::SdkNotReady);
        }
        Ok(query)
    }

    /// Deletes messages at-and-after the cutoff, re-anchors
    /// `resume_session_at` on the last surviving user message, and restarts
    /// the live query so the SDK transcript matches the truncated history.
    async fn truncate_conversation(
        &self,
        session_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, String> {
        let deleted = self
            .store
            .delete_messages_at_and_after(session_id, cutoff)
            .map_err(|e| e.to_string())?;

        let remaining = self
            .store
            .get_user_messages(session_id)
            .map_err(|e| e.to_string())?;
        let resume = remaining.last().map(|message| message.uuid.clone());

        let patch = MetadataPatch {
            resume_session_at: Some(resume),
            ..Default::default()
        };
        self.store
            .update_session_metadata(session_id, &patch)
            .map_err(|e| e.to_string())?;

        if let Some(handle) = self.cache.get(session_id) {
            handle.update_metadata(&patch).await;
            handle
                .restart()
                .await
                .map_err(|e| format!("Query restart failed: {e}"))?;
        } else {
            log::warn!("No live handle for session {session_id}, skipping query restart");
        }

        log::info!("Truncated {deleted} message(s) for session {session_id}");
        Ok(deleted)
    }
}

fn annotate(operations: &[FileOperation], via: RevertVia) -> Vec<FileToRevert> {
    let mut files: Vec<FileToRevert> = Vec::new();
    for operation in operations {
        let path = operation.file_path();
        if !files.iter().any(|file| file.file_path == path) {
            files.push(FileToRevert {
                file_path: path.to_string(),
                revert_via: via,
            });
        }
    }
    files
}

fn files_to_revert(case: &RewindCase, range: &RewindRange) -> Vec<FileToRevert> {
    match case {
        RewindCase::SdkNative => annotate(
            &extract_file_operations(&range.in_range),
            RevertVia::SdkCheckpoint,
        ),
        RewindCase::DiffBased {
            messages_before_user,
        } => annotate(&extract_file_operations(messages_before_user), RevertVia::DiffOnly),
        RewindCase::Hybrid {
            oldest_user_message,
            messages_before_user,
        } => {
            let mut files = annotate(
                &extract_file_operations(messages_before_user),
                RevertVia::DiffOnly,
            );
            let from_anchor: Vec<MessageRecord> = range
                .in_range
                .iter()
                .skip_while(|message| message.uuid != oldest_user_message.uuid)
                .cloned()
                .collect();
            files.extend(annotate(
                &extract_file_operations(&from_anchor),
                RevertVia::SdkCheckpoint,
            ));
            files
        }
    }
}
