use crate::domains::sessions::entity::MessageRecord;
use serde::{Deserialize, Serialize};

/// Which rewind mechanism a selective request needs. Each variant carries
/// exactly the data its execution branch consumes, so dispatch is one
/// exhaustive match.
#[derive(Debug, Clone, PartialEq)]
pub enum RewindCase {
    /// The earliest targeted message is a user message: the SDK can rewind
    /// directly to that checkpoint.
    SdkNative,
    /// No user message anywhere in range: every file change must be undone by
    /// diffing, there is no conversational anchor.
    DiffBased { messages_before_user: Vec<MessageRecord> },
    /// A user message exists later in the range: SDK rewind to it, plus
    /// diff-revert for the messages before it.
    Hybrid {
        oldest_user_message: MessageRecord,
        messages_before_user: Vec<MessageRecord>,
    },
}

impl RewindCase {
    pub fn kind(&self) -> RewindCaseKind {
        match self {
            RewindCase::SdkNative => RewindCaseKind::SdkNative,
            RewindCase::DiffBased { .. } => RewindCaseKind::DiffBased,
            RewindCase::Hybrid { .. } => RewindCaseKind::Hybrid,
        }
    }
}

/// Wire-facing tag for the case, without the carried data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RewindCaseKind {
    SdkNative,
    DiffBased,
    Hybrid,
}

/// The resolved span of a selective rewind request.
#[derive(Debug, Clone)]
pub struct RewindRange {
    pub earliest: MessageRecord,
    pub in_range: Vec<MessageRecord>,
    pub user_in_range: Vec<MessageRecord>,
}

/// Locates the earliest message matching any target uuid and materializes the
/// range from it to the end of history. `None` when no target matches.
pub fn build_rewind_range(
    messages: &[MessageRecord],
    target_uuids: &[String],
) -> Option<RewindRange> {
    let earliest_index = messages
        .iter()
        .position(|message| target_uuids.iter().any(|uuid| uuid == &message.uuid))?;

    let in_range: Vec<MessageRecord> = messages[earliest_index..].to_vec();
    let user_in_range: Vec<MessageRecord> = in_range
        .iter()
        .filter(|message| message.is_user())
        .cloned()
        .collect();

    Some(RewindRange {
        earliest: in_range[0].clone(),
        in_range,
        user_in_range,
    })
}

/// Pure classification, no side effects. `messages_in_range` is ordered oldest
/// first and starts at `earliest`.
pub fn analyze_rewind_case(
    earliest: &MessageRecord,
    messages_in_range: &[MessageRecord],
    user_messages_in_range: &[MessageRecord],
) -> RewindCase {
    if earliest.is_user() {
        return RewindCase::SdkNative;
    }

    let Some(oldest_user) = user_messages_in_range.first() else {
        return RewindCase::DiffBased {
            messages_before_user: messages_in_range.to_vec(),
        };
    };

    let messages_before_user: Vec<MessageRecord> = messages_in_range
        .iter()
        .take_while(|message| message.uuid != oldest_user.uuid)
        .cloned()
        .collect();

    RewindCase::Hybrid {
        oldest_user_message: oldest_user.clone(),
        messages_before_user,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn message(uuid: &str, message_type: &str, offset_ms: i64) -> MessageRecord {
        MessageRecord {
            uuid: uuid.to_string(),
            session_id: "s1".to_string(),
            message_type: message_type.to_string(),
            content: json!({ "content": [] }),
            timestamp: Utc::now() + Duration::milliseconds(offset_ms),
        }
    }

    #[test]
    fn user_earliest_is_always_sdk_native() {
        let messages = vec![
            message("u1", "user", 0),
            message("a1", "assistant", 10),
            message("u2", "user", 20),
        ];
        let case = analyze_rewind_case(&messages[0], &messages, &[messages[0].clone()]);
        assert_eq!(case, RewindCase::SdkNative);
    }

    #[test]
    fn no_user_in_range_is_diff_based_over_everything() {
        let messages = vec![message("a1", "assistant", 0), message("a2", "assistant", 10)];
        let case = analyze_rewind_case(&messages[0], &messages, &[]);
        match case {
            RewindCase::DiffBased {
                messages_before_user,
            } => {
                assert_eq!(messages_before_user.len(), 2);
            }
            other => panic!("expected diff-based, got {other:?}"),
        }
    }

    #[test]
    fn assistant_earliest_with_later_user_is_hybrid() {
        let messages = vec![
            message("a1", "assistant", 0),
            message("a2", "assistant", 10),
            message("u1", "user", 20),
            message("a3", "assistant", 30),
        ];
        let users = vec![messages[2].clone()];

        let case = analyze_rewind_case(&messages[0], &messages, &users);
        match case {
            RewindCase::Hybrid {
                oldest_user_message,
                messages_before_user,
            } => {
                assert_eq!(oldest_user_message.uuid, "u1");
                let before: Vec<&str> = messages_before_user
                    .iter()
                    .map(|m| m.uuid.as_str())
                    .collect();
                assert_eq!(before, vec!["a1", "a2"]);
            }
            other => panic!("expected hybrid, got {other:?}"),
        }
    }

    #[test]
    fn range_starts_at_earliest_matching_target() {
        let messages = vec![
            message("u1", "user", 0),
            message("a1", "assistant", 10),
            message("u2", "user", 20),
            message("a2", "assistant", 30),
        ];

        let range =
            build_rewind_range(&messages, &["a2".to_string(), "a1".to_string()]).unwrap();
        assert_eq!(range.earliest.uuid, "a1");
        assert_eq!(range.in_range.len(), 3);
        assert_eq!(range.user_in_range.len(), 1);
        assert_eq!(range.user_in_range[0].uuid, "u2");
    }

    #[test]
    fn no_matching_target_yields_none() {
        let messages = vec![message("u1", "user", 0)];
        assert!(build_rewind_range(&messages, &["missing".to_string()]).is_none());
    }

    #[test]
    fn case_kind_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_value(RewindCaseKind::SdkNative).unwrap(),
            "sdk-native"
        );
        assert_eq!(
            serde_json::to_value(RewindCaseKind::DiffBased).unwrap(),
            "diff-based"
        );
        assert_eq!(serde_json::to_value(RewindCaseKind::Hybrid).unwrap(), "hybrid");
    }
}
