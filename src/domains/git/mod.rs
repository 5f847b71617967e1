pub mod branches;
pub mod provisioner;
pub mod repository;
pub mod worktrees;

pub use provisioner::{GitWorktreeManager, WorktreeProvisioner, WorktreeRequest};
pub use repository::GitSupport;
