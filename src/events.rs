use serde::{Deserialize, Serialize};

/// Canonical event names emitted by the daemon core. The dotted names are part
/// of the client protocol and must never change silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DaemonEvent {
    SessionCreated,
    SessionUpdated,
    SessionDeleted,
    RewindStarted,
    RewindCompleted,
    RewindFailed,
    RoomAgentStateChanged,
    RoomAgentIdle,
    RoomAgentError,
    RoomTaskUpdate,
}

impl DaemonEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            DaemonEvent::SessionCreated => "session.created",
            DaemonEvent::SessionUpdated => "session.updated",
            DaemonEvent::SessionDeleted => "session.deleted",
            DaemonEvent::RewindStarted => "rewind.started",
            DaemonEvent::RewindCompleted => "rewind.completed",
            DaemonEvent::RewindFailed => "rewind.failed",
            DaemonEvent::RoomAgentStateChanged => "roomAgent.stateChanged",
            DaemonEvent::RoomAgentIdle => "roomAgent.idle",
            DaemonEvent::RoomAgentError => "roomAgent.error",
            DaemonEvent::RoomTaskUpdate => "room.task.update",
        }
    }
}
