pub mod connection;
pub mod db_messages;
pub mod db_room_agents;
pub mod db_schema;
pub mod db_sessions;
pub mod db_tasks;
pub mod timestamps;

pub use connection::Database;
pub use db_messages::{MessageMethods, SdkMessagePage, SdkMessageQuery};
pub use db_room_agents::RoomAgentMethods;
pub use db_schema::initialize_schema;
pub use db_sessions::SessionMethods;
pub use db_tasks::TaskMethods;
