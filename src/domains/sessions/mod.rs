pub mod cache;
pub mod entity;
pub mod handle;
pub mod lifecycle;
pub mod repository;
pub mod rewind;
pub mod service;
pub mod utils;

pub use cache::SessionCache;
pub use entity::{CreateSessionParams, Session, SessionPatch, SessionStatus};
pub use handle::{AgentSession, DetachedHandleFactory, SessionHandleFactory};
pub use repository::SessionStore;
pub use rewind::{RewindHandler, RewindMode};
pub use service::{LifecycleSettings, SessionLifecycle};
