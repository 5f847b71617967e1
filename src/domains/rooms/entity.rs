use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Blocked,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            "blocked" => Some(TaskStatus::Blocked),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Variant order is scheduling order: `Urgent` beats `High` beats `Normal`
/// beats `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Normal => "normal",
            TaskPriority::High => "high",
            TaskPriority::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(TaskPriority::Low),
            "normal" => Some(TaskPriority::Normal),
            "high" => Some(TaskPriority::High),
            "urgent" => Some(TaskPriority::Urgent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub room_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateTaskParams {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<TaskPriority>,
    pub depends_on: Vec<String>,
    pub session_id: Option<String>,
}

/// Extra fields merged in by `update_task_status`.
#[derive(Debug, Clone, Default)]
pub struct TaskStatusExtras {
    pub result: Option<Value>,
    pub error: Option<String>,
    pub session_id: Option<String>,
    pub current_step: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomAgentLifecycleState {
    Idle,
    Planning,
    Executing,
    Waiting,
    Reviewing,
    Error,
    Paused,
}

impl RoomAgentLifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomAgentLifecycleState::Idle => "idle",
            RoomAgentLifecycleState::Planning => "planning",
            RoomAgentLifecycleState::Executing => "executing",
            RoomAgentLifecycleState::Waiting => "waiting",
            RoomAgentLifecycleState::Reviewing => "reviewing",
            RoomAgentLifecycleState::Error => "error",
            RoomAgentLifecycleState::Paused => "paused",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(RoomAgentLifecycleState::Idle),
            "planning" => Some(RoomAgentLifecycleState::Planning),
            "executing" => Some(RoomAgentLifecycleState::Executing),
            "waiting" => Some(RoomAgentLifecycleState::Waiting),
            "reviewing" => Some(RoomAgentLifecycleState::Reviewing),
            "error" => Some(RoomAgentLifecycleState::Error),
            "paused" => Some(RoomAgentLifecycleState::Paused),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomAgentState {
    pub room_id: String,
    pub lifecycle_state: RoomAgentLifecycleState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_goal_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_task_id: Option<String>,
    #[serde(default)]
    pub active_session_pair_ids: Vec<String>,
    pub error_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub pending_actions: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl RoomAgentState {
    pub fn fresh(room_id: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            lifecycle_state: RoomAgentLifecycleState::Idle,
            current_goal_id: None,
            current_task_id: None,
            active_session_pair_ids: Vec::new(),
            error_count: 0,
            last_error: None,
            pending_actions: Vec::new(),
            last_activity_at: None,
        }
    }
}
