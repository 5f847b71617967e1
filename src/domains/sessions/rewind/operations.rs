use crate::domains::sessions::entity::MessageRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A file mutation recovered from an assistant tool-use block. Only the two
/// content-bearing tools are extracted; everything else (Bash, Read, ...) has
/// no revertible file effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum FileOperation {
    Edit {
        file_path: String,
        old_string: String,
        new_string: String,
    },
    Write {
        file_path: String,
        content: String,
    },
}

impl FileOperation {
    pub fn file_path(&self) -> &str {
        match self {
            FileOperation::Edit { file_path, .. } => file_path,
            FileOperation::Write { file_path, .. } => file_path,
        }
    }
}

/// Outcome of a revert pass, unique paths per bucket. A path can appear in
/// more than one bucket when several operations touched it with mixed results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevertSummary {
    pub reverted: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
}

impl RevertSummary {
    fn record(bucket: &mut Vec<String>, path: &str) {
        if !bucket.iter().any(|p| p == path) {
            bucket.push(path.to_string());
        }
    }
}

fn string_field(input: &Value, key: &str) -> Option<String> {
    input.get(key).and_then(Value::as_str).map(str::to_string)
}

fn operation_from_block(block: &Value) -> Option<FileOperation> {
    if block.get("type").and_then(Value::as_str) != Some("tool_use") {
        return None;
    }
    let input = block.get("input")?;
    match block.get("name").and_then(Value::as_str)? {
        "Edit" => Some(FileOperation::Edit {
            file_path: string_field(input, "file_path")?,
            old_string: string_field(input, "old_string")?,
            new_string: string_field(input, "new_string")?,
        }),
        "Write" => Some(FileOperation::Write {
            file_path: string_field(input, "file_path")?,
            content: string_field(input, "content")?,
        }),
        _ => None,
    }
}

/// Scans assistant messages for `Edit`/`Write` tool-use blocks, in message
/// order. Non-assistant messages and messages without a content array
/// contribute nothing.
pub fn extract_file_operations(messages: &[MessageRecord]) -> Vec<FileOperation> {
    let mut operations = Vec::new();
    for message in messages {
        if !message.is_assistant() {
            continue;
        }
        let Some(blocks) = message.content.get("content").and_then(Value::as_array) else {
            continue;
        };
        for block in blocks {
            if let Some(operation) = operation_from_block(block) {
                operations.push(operation);
            }
        }
    }
    operations
}

/// Undoes operations in reverse chronological order, last applied first.
///
/// An edit is reversible only while the file still contains its `new_string`;
/// the first occurrence is swapped back to `old_string`. A missing or diverged
/// file fails the path. Writes are never undone here since deleting a created
/// file is not safe to infer from content alone; those paths are reported as
/// skipped.
pub async fn revert_file_operations(operations: &[FileOperation]) -> RevertSummary {
    let mut summary = RevertSummary::default();

    for operation in operations.iter().rev() {
        match operation {
            FileOperation::Edit {
                file_path,
                old_string,
                new_string,
            } => match tokio::fs::read_to_string(file_path).await {
                Ok(current) => {
                    if current.contains(new_string.as_str()) {
                        let restored = current.replacen(new_string.as_str(), old_string, 1);
                        match tokio::fs::write(file_path, restored).await {
                            Ok(()) => RevertSummary::record(&mut summary.reverted, file_path),
                            Err(e) => {
                                log::warn!("Failed to write reverted {file_path}: {e}");
                                RevertSummary::record(&mut summary.failed, file_path);
                            }
                        }
                    } else {
                        log::debug!("Edit no longer present in {file_path}, cannot revert");
                        RevertSummary::record(&mut summary.failed, file_path);
                    }
                }
                Err(e) => {
                    log::debug!("Cannot read {file_path} for revert: {e}");
                    RevertSummary::record(&mut summary.failed, file_path);
                }
            },
            FileOperation::Write { file_path, .. } => {
                RevertSummary::record(&mut summary.skipped, file_path);
            }
        }
    }

    summary
}
