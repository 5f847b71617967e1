use crate::domains::rooms::entity::{RoomAgentLifecycleState, RoomAgentState, TaskStatus};
use crate::errors::DaemonError;
use crate::events::DaemonEvent;
use crate::infrastructure::database::{Database, RoomAgentMethods, TaskMethods};
use crate::infrastructure::events::DaemonHub;
use chrono::Utc;
use serde_json::json;
use std::sync::Mutex;

/// Persisted state machine gating what a room's autonomous loop may do.
///
/// Validated transitions write through to storage, bump `last_activity_at`
/// and emit `roomAgent.stateChanged`; entering `idle` or `error` emits the
/// matching extra event. Invalid transitions return `None` and change
/// nothing. `paused` resumes only to `idle`, and `error` is left only via
/// `clear_error`.
pub struct RoomAgentLifecycleManager {
    db: Database,
    room_id: String,
    state: Mutex<RoomAgentState>,
    hub: DaemonHub,
}

fn allowed(from: RoomAgentLifecycleState, to: RoomAgentLifecycleState) -> bool {
    use RoomAgentLifecycleState::*;
    match from {
        Idle => matches!(to, Planning | Paused | Error),
        Planning => matches!(to, Executing | Waiting | Paused | Error),
        Executing => matches!(to, Reviewing | Waiting | Paused | Error),
        Waiting => matches!(to, Planning | Paused | Error),
        Reviewing => matches!(to, Idle | Planning | Paused | Error),
        Paused => matches!(to, Idle),
        Error => false,
    }
}

impl RoomAgentLifecycleManager {
    /// Restores the persisted state for the room, or starts fresh in `Idle`
    /// if none was saved yet.
    pub fn new(db: Database, room_id: impl Into<String>, hub: DaemonHub) -> Result<Self, DaemonError> {
        let room_id = room_id.into();
        let state = db
            .get_room_agent_state(&room_id)
            .map_err(DaemonError::db)?
            .unwrap_or_else(|| RoomAgentState::fresh(&room_id));

        Ok(Self {
            db,
            room_id,
            state: Mutex::new(state),
            hub,
        })
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn current_state(&self) -> RoomAgentLifecycleState {
        self.state.lock().unwrap().lifecycle_state
    }

    pub fn state_snapshot(&self) -> RoomAgentState {
        self.state.lock().unwrap().clone()
    }

    /// Validated transition. Returns the new snapshot, or `None` if the
    /// table does not allow `target` from the current state.
    pub fn transition_to(
        &self,
        target: RoomAgentLifecycleState,
        reason: Option<&str>,
    ) -> Result<Option<RoomAgentState>, DaemonError> {
        let mut guard = self.state.lock().unwrap();
        let previous = guard.lifecycle_state;
        if !allowed(previous, target) {
            log::debug!(
                "Room {}: rejected transition {} -> {}",
                self.room_id,
                previous.as_str(),
                target.as_str()
            );
            return Ok(None);
        }

        let previous_activity = guard.last_activity_at;
        guard.lifecycle_state = target;
        guard.last_activity_at = Some(Utc::now());
        if let Err(e) = self.db.save_room_agent_state(&guard) {
            guard.lifecycle_state = previous;
            guard.last_activity_at = previous_activity;
            return Err(DaemonError::db(e));
        }
        let snapshot = guard.clone();
        drop(guard);

        log::info!(
            "Room {}: {} -> {}{}",
            self.room_id,
            previous.as_str(),
            target.as_str(),
            reason.map(|r| format!(" ({r})")).unwrap_or_default()
        );
        self.emit_state_changed(previous, target, reason);
        self.emit_entry_event(&snapshot);
        Ok(Some(snapshot))
    }

    /// Overwrites the state without validation or events. Recovery and test
    /// setup only.
    pub fn force_state(
        &self,
        target: RoomAgentLifecycleState,
    ) -> Result<RoomAgentState, DaemonError> {
        let mut guard = self.state.lock().unwrap();
        let previous = guard.lifecycle_state;
        guard.lifecycle_state = target;
        if let Err(e) = self.db.save_room_agent_state(&guard) {
            guard.lifecycle_state = previous;
            return Err(DaemonError::db(e));
        }
        log::info!(
            "Room {}: forced {} -> {}",
            self.room_id,
            previous.as_str(),
            target.as_str()
        );
        Ok(guard.clone())
    }

    /// Counts the error and stores it as `last_error`. With
    /// `transition_to_error` the machine also enters `Error`;
    /// `roomAgent.error` is emitted exactly once per call either way.
    pub fn record_error(
        &self,
        error: &str,
        transition_to_error: bool,
    ) -> Result<RoomAgentState, DaemonError> {
        {
            let mut guard = self.state.lock().unwrap();
            guard.error_count += 1;
            guard.last_error = Some(error.to_string());
            guard.last_activity_at = Some(Utc::now());
            self.db.save_room_agent_state(&guard).map_err(DaemonError::db)?;
            log::warn!(
                "Room {}: error #{}: {error}",
                self.room_id,
                guard.error_count
            );
        }

        if transition_to_error
            && let Some(snapshot) = self.transition_to(RoomAgentLifecycleState::Error, Some(error))?
        {
            return Ok(snapshot);
        }

        // Not transitioning (or already in Error): emit directly.
        let snapshot = self.state_snapshot();
        self.emit_error(&snapshot);
        Ok(snapshot)
    }

    /// Leaves `Error` by resetting the error bookkeeping and returning to
    /// `Idle`. In any other state this is a no-op returning `None`.
    pub fn clear_error(&self) -> Result<Option<RoomAgentState>, DaemonError> {
        let mut guard = self.state.lock().unwrap();
        if guard.lifecycle_state != RoomAgentLifecycleState::Error {
            return Ok(None);
        }

        let rollback = guard.clone();
        guard.lifecycle_state = RoomAgentLifecycleState::Idle;
        guard.error_count = 0;
        guard.last_error = None;
        guard.last_activity_at = Some(Utc::now());
        if let Err(e) = self.db.save_room_agent_state(&guard) {
            *guard = rollback;
            return Err(DaemonError::db(e));
        }
        let snapshot = guard.clone();
        drop(guard);

        log::info!("Room {}: error cleared, back to idle", self.room_id);
        self.emit_state_changed(
            RoomAgentLifecycleState::Error,
            RoomAgentLifecycleState::Idle,
            Some("error cleared"),
        );
        self.emit_entry_event(&snapshot);
        Ok(Some(snapshot))
    }

    pub fn can_process_event(&self) -> bool {
        use RoomAgentLifecycleState::*;
        matches!(self.current_state(), Idle | Planning | Executing)
    }

    pub fn can_start_planning(&self) -> bool {
        use RoomAgentLifecycleState::*;
        matches!(self.current_state(), Idle | Reviewing)
    }

    pub fn can_spawn_worker(&self) -> bool {
        use RoomAgentLifecycleState::*;
        matches!(self.current_state(), Planning | Executing)
    }

    pub fn is_waiting_for_input(&self) -> bool {
        self.current_state() == RoomAgentLifecycleState::Waiting
    }

    pub fn is_in_error_state(&self) -> bool {
        self.current_state() == RoomAgentLifecycleState::Error
    }

    pub fn is_paused(&self) -> bool {
        self.current_state() == RoomAgentLifecycleState::Paused
    }

    pub fn is_idle(&self) -> bool {
        self.current_state() == RoomAgentLifecycleState::Idle
    }

    pub fn is_executing(&self) -> bool {
        self.current_state() == RoomAgentLifecycleState::Executing
    }

    /// Adds a session pair id to the tracked set. Returns whether it was new.
    pub fn add_active_session_pair(&self, pair_id: &str) -> Result<bool, DaemonError> {
        let mut guard = self.state.lock().unwrap();
        if guard.active_session_pair_ids.iter().any(|id| id == pair_id) {
            return Ok(false);
        }
        guard.active_session_pair_ids.push(pair_id.to_string());
        self.db.save_room_agent_state(&guard).map_err(DaemonError::db)?;
        Ok(true)
    }

    pub fn remove_active_session_pair(&self, pair_id: &str) -> Result<bool, DaemonError> {
        let mut guard = self.state.lock().unwrap();
        let before = guard.active_session_pair_ids.len();
        guard.active_session_pair_ids.retain(|id| id != pair_id);
        if guard.active_session_pair_ids.len() == before {
            return Ok(false);
        }
        self.db.save_room_agent_state(&guard).map_err(DaemonError::db)?;
        Ok(true)
    }

    fn emit_state_changed(
        &self,
        previous: RoomAgentLifecycleState,
        new: RoomAgentLifecycleState,
        reason: Option<&str>,
    ) {
        self.hub.emit(
            DaemonEvent::RoomAgentStateChanged,
            &json!({
                "roomId": self.room_id,
                "previousState": previous,
                "newState": new,
                "reason": reason,
            }),
        );
    }

    fn emit_entry_event(&self, state: &RoomAgentState) {
        match state.lifecycle_state {
            RoomAgentLifecycleState::Idle => {
                let has_pending_tasks = match self
                    .db
                    .count_tasks_with_status(&self.room_id, TaskStatus::Pending)
                {
                    Ok(count) => count > 0,
                    Err(e) => {
                        log::warn!("Room {}: could not count pending tasks: {e}", self.room_id);
                        false
                    }
                };
                self.hub.emit(
                    DaemonEvent::RoomAgentIdle,
                    &json!({
                        "roomId": self.room_id,
                        "hasPendingTasks": has_pending_tasks,
                        "hasIncompleteGoals": state.current_goal_id.is_some(),
                    }),
                );
            }
            RoomAgentLifecycleState::Error => self.emit_error(state),
            _ => {}
        }
    }

    fn emit_error(&self, state: &RoomAgentState) {
        self.hub.emit(
            DaemonEvent::RoomAgentError,
            &json!({
                "roomId": self.room_id,
                "error": state.last_error,
                "errorCount": state.error_count,
            }),
        );
    }
}
