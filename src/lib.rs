pub mod cli;
pub mod config;
pub mod domains;
pub mod errors;
pub mod events;
pub mod infrastructure;
