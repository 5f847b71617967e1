pub mod agents;
pub mod git;
pub mod rooms;
pub mod sessions;
