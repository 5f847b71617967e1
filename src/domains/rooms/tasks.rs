use crate::domains::rooms::entity::{
    CreateTaskParams, Task, TaskPriority, TaskStatus, TaskStatusExtras,
};
use crate::errors::DaemonError;
use crate::events::DaemonEvent;
use crate::infrastructure::database::{Database, TaskMethods};
use crate::infrastructure::events::{Channel, MessageHub};
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

/// Task CRUD and scheduling for one room.
///
/// A manager is bound to a single room id and every storage query filters on
/// it, so two managers over the same database never see each other's tasks.
/// Each mutation broadcasts `room.task.update` with the task snapshot on the
/// room's channel.
pub struct TaskManager {
    db: Database,
    room_id: String,
    messages: MessageHub,
}

impl TaskManager {
    pub fn new(db: Database, room_id: impl Into<String>, messages: MessageHub) -> Self {
        Self {
            db,
            room_id: room_id.into(),
            messages,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn create_task(&self, params: CreateTaskParams) -> Result<Task, DaemonError> {
        let task = Task {
            id: Uuid::new_v4().to_string(),
            room_id: self.room_id.clone(),
            title: params.title,
            description: params.description,
            status: TaskStatus::Pending,
            priority: params.priority.unwrap_or(TaskPriority::Normal),
            progress: 0,
            current_step: None,
            result: None,
            error: None,
            depends_on: params.depends_on,
            session_id: params.session_id,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };

        self.db.create_task(&task).map_err(DaemonError::db)?;
        log::info!("Created task {} in room {}", task.id, self.room_id);
        self.emit_update(&task);
        Ok(task)
    }

    pub fn get_task(&self, task_id: &str) -> Result<Task, DaemonError> {
        self.db
            .get_task(&self.room_id, task_id)
            .map_err(DaemonError::db)?
            .ok_or_else(|| DaemonError::TaskNotFound {
                task_id: task_id.to_string(),
            })
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>, DaemonError> {
        self.db.list_tasks(&self.room_id).map_err(DaemonError::db)
    }

    pub fn delete_task(&self, task_id: &str) -> Result<(), DaemonError> {
        let task = self.get_task(task_id)?;
        self.db
            .delete_task(&self.room_id, task_id)
            .map_err(DaemonError::db)?;
        log::info!("Deleted task {task_id} in room {}", self.room_id);
        self.emit_update(&task);
        Ok(())
    }

    /// Applies a status change with its timestamp side effects: entering
    /// `InProgress` stamps `started_at` once, terminal states stamp
    /// `completed_at`, `Blocked` drops the current step. Extras merge in
    /// afterwards, so an explicit step from the caller wins.
    pub fn update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        extras: Option<TaskStatusExtras>,
    ) -> Result<Task, DaemonError> {
        let mut task = self.get_task(task_id)?;
        task.status = status;

        match status {
            TaskStatus::InProgress => {
                if task.started_at.is_none() {
                    task.started_at = Some(Utc::now());
                }
            }
            TaskStatus::Completed | TaskStatus::Failed => {
                task.completed_at = Some(Utc::now());
            }
            TaskStatus::Blocked => {
                task.current_step = None;
            }
            TaskStatus::Pending => {}
        }

        if let Some(extras) = extras {
            if let Some(result) = extras.result {
                task.result = Some(result);
            }
            if let Some(error) = extras.error {
                task.error = Some(error);
            }
            if let Some(session_id) = extras.session_id {
                task.session_id = Some(session_id);
            }
            if let Some(step) = extras.current_step {
                task.current_step = Some(step);
            }
        }

        self.db.update_task(&task).map_err(DaemonError::db)?;
        log::info!(
            "Task {task_id} in room {} is now {}",
            self.room_id,
            status.as_str()
        );
        self.emit_update(&task);
        Ok(task)
    }

    pub fn update_task_progress(
        &self,
        task_id: &str,
        value: i64,
        step: Option<&str>,
    ) -> Result<Task, DaemonError> {
        let mut task = self.get_task(task_id)?;
        task.progress = value.clamp(0, 100) as u8;
        if let Some(step) = step {
            task.current_step = Some(step.to_string());
        }

        self.db.update_task(&task).map_err(DaemonError::db)?;
        self.emit_update(&task);
        Ok(task)
    }

    /// Scheduler query: among pending tasks whose dependencies are all
    /// completed, the most urgent wins and ties go to the oldest.
    pub fn get_next_pending_task(&self) -> Result<Option<Task>, DaemonError> {
        let tasks = self.list_tasks()?;
        let index = status_index(&tasks);

        Ok(tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Pending)
            .filter(|task| dependencies_met(task, &index))
            .max_by_key(|task| (task.priority, std::cmp::Reverse(task.created_at)))
            .cloned())
    }

    pub fn are_dependencies_met(&self, task: &Task) -> Result<bool, DaemonError> {
        let tasks = self.list_tasks()?;
        Ok(dependencies_met(task, &status_index(&tasks)))
    }

    fn emit_update(&self, task: &Task) {
        self.messages.event(
            DaemonEvent::RoomTaskUpdate,
            &json!({ "roomId": self.room_id, "task": task }),
            Channel::Room(self.room_id.clone()),
        );
    }
}

fn status_index(tasks: &[Task]) -> HashMap<&str, TaskStatus> {
    tasks
        .iter()
        .map(|task| (task.id.as_str(), task.status))
        .collect()
}

/// A dependency on a missing task never resolves.
fn dependencies_met(task: &Task, index: &HashMap<&str, TaskStatus>) -> bool {
    task.depends_on
        .iter()
        .all(|dep| index.get(dep.as_str()).copied() == Some(TaskStatus::Completed))
}
