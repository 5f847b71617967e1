use super::connection::Database;
use super::timestamps::utc_from_epoch_millis_lossy_opt;
use crate::domains::rooms::entity::{RoomAgentLifecycleState, RoomAgentState};
use anyhow::Result;
use chrono::Utc;
use rusqlite::{Row, params};

fn row_to_agent_state(row: &Row) -> rusqlite::Result<RoomAgentState> {
    let state_str: String = row.get(1)?;
    let lifecycle_state = RoomAgentLifecycleState::parse(&state_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unknown lifecycle state: {state_str}"),
            )),
        )
    })?;

    let pair_ids_json: String = row.get(4)?;
    let active_session_pair_ids = serde_json::from_str(&pair_ids_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let pending_json: String = row.get(7)?;
    let pending_actions = serde_json::from_str(&pending_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let last_activity_at: Option<i64> = row.get(8)?;

    Ok(RoomAgentState {
        room_id: row.get(0)?,
        lifecycle_state,
        current_goal_id: row.get(2)?,
        current_task_id: row.get(3)?,
        active_session_pair_ids,
        error_count: row.get::<_, i64>(5)?.max(0) as u32,
        last_error: row.get(6)?,
        pending_actions,
        last_activity_at: utc_from_epoch_millis_lossy_opt(last_activity_at),
    })
}

pub trait RoomAgentMethods {
    fn get_room_agent_state(&self, room_id: &str) -> Result<Option<RoomAgentState>>;
    fn save_room_agent_state(&self, state: &RoomAgentState) -> Result<()>;
}

impl RoomAgentMethods for Database {
    fn get_room_agent_state(&self, room_id: &str) -> Result<Option<RoomAgentState>> {
        let conn = self.get_conn()?;
        let result = conn.query_row(
            "SELECT room_id, lifecycle_state, current_goal_id, current_task_id,
                    active_session_pair_ids, error_count, last_error, pending_actions,
                    last_activity_at
                FROM room_agent_states WHERE room_id = ?1",
            params![room_id],
            row_to_agent_state,
        );

        match result {
            Ok(state) => Ok(Some(state)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save_room_agent_state(&self, state: &RoomAgentState) -> Result<()> {
        let conn = self.get_conn()?;
        let pair_ids = serde_json::to_string(&state.active_session_pair_ids)?;
        let pending = serde_json::to_string(&state.pending_actions)?;
        let now = Utc::now().timestamp_millis();

        conn.execute(
            "INSERT INTO room_agent_states (
                room_id, lifecycle_state, current_goal_id, current_task_id,
                active_session_pair_ids, error_count, last_error, pending_actions,
                last_activity_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(room_id) DO UPDATE SET
                lifecycle_state = excluded.lifecycle_state,
                current_goal_id = excluded.current_goal_id,
                current_task_id = excluded.current_task_id,
                active_session_pair_ids = excluded.active_session_pair_ids,
                error_count = excluded.error_count,
                last_error = excluded.last_error,
                pending_actions = excluded.pending_actions,
                last_activity_at = excluded.last_activity_at,
                updated_at = excluded.updated_at",
            params![
                state.room_id,
                state.lifecycle_state.as_str(),
                state.current_goal_id,
                state.current_task_id,
                pair_ids,
                i64::from(state.error_count),
                state.last_error,
                pending,
                state.last_activity_at.map(|t| t.timestamp_millis()),
                now,
            ],
        )?;
        Ok(())
    }
}
