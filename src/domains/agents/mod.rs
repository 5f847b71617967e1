pub mod runtime;
pub mod sdk;

pub use runtime::{DetachedRuntime, SessionRuntime, StaticToolsConfig, ToolsConfigSource};
pub use sdk::{RewindFilesOutcome, SdkQuery};
