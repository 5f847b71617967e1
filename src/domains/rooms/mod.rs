pub mod agent_state;
pub mod entity;
pub mod tasks;

pub use agent_state::RoomAgentLifecycleManager;
pub use entity::{
    CreateTaskParams, RoomAgentLifecycleState, RoomAgentState, Task, TaskPriority, TaskStatus,
    TaskStatusExtras,
};
pub use tasks::TaskManager;
