use super::{branches, repository, worktrees};
use crate::domains::sessions::entity::WorktreeInfo;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub use super::repository::GitSupport;

pub const WORKTREES_DIR: &str = ".leitwerk/worktrees";

/// Inputs for provisioning a session worktree.
#[derive(Debug, Clone)]
pub struct WorktreeRequest {
    pub repo_root: PathBuf,
    pub session_id: String,
    pub branch: String,
    pub base_branch: Option<String>,
}

/// Git side of the session lifecycle. The lifecycle treats every call as
/// best-effort except where noted; implementations must not assume the
/// worktree or branch still exists when asked to remove or rename it.
#[async_trait]
pub trait WorktreeProvisioner: Send + Sync {
    async fn detect_git_support(&self, path: &Path) -> GitSupport;

    async fn create_worktree(&self, request: WorktreeRequest) -> Result<WorktreeInfo>;

    async fn remove_worktree(&self, info: &WorktreeInfo, force: bool) -> Result<()>;

    async fn get_current_branch(&self, path: &Path) -> Result<String>;

    /// Rename the session branch and repoint the worktree at the new name.
    /// Rolls the rename back if the worktree cannot be updated.
    async fn rename_branch(&self, info: &WorktreeInfo, new_branch: &str) -> Result<()>;
}

fn worktree_dir_name(branch: &str, session_id: &str) -> String {
    branch
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.to_string())
        .unwrap_or_else(|| session_id.chars().take(8).collect())
}

/// libgit2-backed provisioner. Worktrees live under
/// `<repo>/.leitwerk/worktrees/<branch tail>`; libgit2 calls run on the
/// blocking pool.
pub struct GitWorktreeManager;

#[async_trait]
impl WorktreeProvisioner for GitWorktreeManager {
    async fn detect_git_support(&self, path: &Path) -> GitSupport {
        let path = path.to_path_buf();
        match tokio::task::spawn_blocking(move || repository::detect_git_support(&path)).await {
            Ok(support) => support,
            Err(e) => {
                log::warn!("Git detection task failed: {e}");
                GitSupport::default()
            }
        }
    }

    async fn create_worktree(&self, request: WorktreeRequest) -> Result<WorktreeInfo> {
        let dir_name = worktree_dir_name(&request.branch, &request.session_id);
        let worktree_path = request.repo_root.join(WORKTREES_DIR).join(dir_name);

        let base_branch = match request.base_branch.clone() {
            Some(base) => base,
            None => self.get_current_branch(&request.repo_root).await?,
        };

        let repo_root = request.repo_root.clone();
        let branch = request.branch.clone();
        let target_path = worktree_path.clone();
        tokio::task::spawn_blocking(move || {
            worktrees::create_worktree_from_base(&repo_root, &branch, &target_path, &base_branch)
        })
        .await
        .map_err(|e| anyhow!("Task join error: {e}"))??;

        Ok(WorktreeInfo {
            worktree_path,
            main_repo_path: request.repo_root,
            branch: request.branch,
        })
    }

    async fn remove_worktree(&self, info: &WorktreeInfo, force: bool) -> Result<()> {
        let repo_root = info.main_repo_path.clone();
        let worktree_path = info.worktree_path.clone();
        tokio::task::spawn_blocking(move || {
            worktrees::remove_worktree(&repo_root, &worktree_path, force)
        })
        .await
        .map_err(|e| anyhow!("Task join error: {e}"))?
    }

    async fn get_current_branch(&self, path: &Path) -> Result<String> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || repository::get_current_branch(&path))
            .await
            .map_err(|e| anyhow!("Task join error: {e}"))?
    }

    async fn rename_branch(&self, info: &WorktreeInfo, new_branch: &str) -> Result<()> {
        let repo_root = info.main_repo_path.clone();
        let worktree_path = info.worktree_path.clone();
        let old = info.branch.clone();
        let new = new_branch.to_string();
        tokio::task::spawn_blocking(move || {
            branches::rename_branch(&repo_root, &old, &new)?;
            if let Err(e) = worktrees::point_worktree_at_branch(&worktree_path, &new) {
                let _ = branches::rename_branch(&repo_root, &new, &old);
                return Err(e);
            }
            Ok(())
        })
        .await
        .map_err(|e| anyhow!("Task join error: {e}"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Repository;
    use tempfile::TempDir;

    fn init_repo(dir: &Path) {
        let repo = Repository::init(dir).unwrap();
        {
            let mut cfg = repo.config().unwrap();
            cfg.set_str("user.name", "Test").unwrap();
            cfg.set_str("user.email", "test@example.com").unwrap();
        }
        let mut index = repo.index().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = repo.signature().unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[])
            .unwrap();
    }

    #[test]
    fn dir_name_uses_branch_tail() {
        assert_eq!(
            worktree_dir_name("session/fix-login-bug-abc12345", "abc12345-def6"),
            "fix-login-bug-abc12345"
        );
        assert_eq!(worktree_dir_name("plain-branch", "id"), "plain-branch");
        assert_eq!(worktree_dir_name("trailing/", "abc12345-def6"), "abc12345");
    }

    #[tokio::test]
    async fn provision_and_remove_round_trip() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path());

        let manager = GitWorktreeManager;
        let info = manager
            .create_worktree(WorktreeRequest {
                repo_root: tmp.path().to_path_buf(),
                session_id: "abc12345-def6-7890".to_string(),
                branch: "session/fix-login-bug-abc12345".to_string(),
                base_branch: None,
            })
            .await
            .unwrap();

        assert!(info.worktree_path.exists());
        assert_eq!(info.branch, "session/fix-login-bug-abc12345");

        manager.remove_worktree(&info, true).await.unwrap();
        assert!(!info.worktree_path.exists());
    }

    #[tokio::test]
    async fn rename_updates_branch_and_worktree_head() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path());

        let manager = GitWorktreeManager;
        let info = manager
            .create_worktree(WorktreeRequest {
                repo_root: tmp.path().to_path_buf(),
                session_id: "abc12345-def6-7890".to_string(),
                branch: "session/old-name-abc12345".to_string(),
                base_branch: None,
            })
            .await
            .unwrap();

        manager
            .rename_branch(&info, "session/new-name-abc12345")
            .await
            .unwrap();

        let wt_repo = Repository::open(&info.worktree_path).unwrap();
        assert_eq!(
            wt_repo.head().unwrap().shorthand(),
            Some("session/new-name-abc12345")
        );
    }

    #[tokio::test]
    async fn detect_reports_non_repo() {
        let tmp = TempDir::new().unwrap();
        let manager = GitWorktreeManager;
        let support = manager.detect_git_support(tmp.path()).await;
        assert!(!support.is_git_repo);
    }

    #[tokio::test]
    async fn create_in_non_repo_fails() {
        let tmp = TempDir::new().unwrap();
        let manager = GitWorktreeManager;
        let result = manager
            .create_worktree(WorktreeRequest {
                repo_root: tmp.path().to_path_buf(),
                session_id: "abc".to_string(),
                branch: "session/x-abc".to_string(),
                base_branch: Some("main".to_string()),
            })
            .await;
        assert!(result.is_err());
    }
}
