use super::branches::ensure_branch_at_head;
use super::repository::get_commit_hash;
use anyhow::{Result, anyhow};
use git2::{BranchType, Repository, WorktreeAddOptions, WorktreePruneOptions, build::CheckoutBuilder};
use std::path::Path;

pub fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(anyhow!("Branch name cannot be empty"));
    }
    if name.contains("..") || name.contains('\0') || name.contains('\\') {
        return Err(anyhow!("Invalid branch name"));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.');
    if !name.chars().all(allowed) {
        return Err(anyhow!("Branch name contains invalid characters"));
    }
    Ok(())
}

/// Creates a worktree at `worktree_path` on a fresh branch pointing at
/// `base_branch`. A missing base branch is bootstrapped from HEAD so an
/// otherwise empty repository can still host sessions.
pub fn create_worktree_from_base(
    repo_path: &Path,
    branch_name: &str,
    worktree_path: &Path,
    base_branch: &str,
) -> Result<()> {
    validate_branch_name(branch_name)?;

    let base_commit_hash = match get_commit_hash(repo_path, base_branch) {
        Ok(hash) => hash,
        Err(err) => {
            log::warn!(
                "Base branch '{base_branch}' missing when creating worktree: {err}. Attempting to bootstrap from HEAD."
            );
            ensure_branch_at_head(repo_path, base_branch)?;
            get_commit_hash(repo_path, base_branch).map_err(|e| {
                anyhow!(
                    "Base branch '{base_branch}' does not exist in the repository after bootstrap attempt: {e}"
                )
            })?
        }
    };

    log::info!("Creating worktree from commit {base_commit_hash} ({base_branch})");

    if let Some(parent) = worktree_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let repo = Repository::open(repo_path)?;

    if let Ok(mut branch) = repo.find_branch(branch_name, BranchType::Local) {
        log::info!("Deleting existing branch: {branch_name}");
        branch.delete()?;
    }

    let base_oid = git2::Oid::from_str(&base_commit_hash)?;
    let base_commit = repo.find_commit(base_oid)?;

    let new_branch = repo.branch(branch_name, &base_commit, false)?;
    let branch_ref = new_branch.into_reference();

    let mut opts = WorktreeAddOptions::new();
    opts.reference(Some(&branch_ref));

    repo.worktree(
        worktree_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(branch_name),
        worktree_path,
        Some(&opts),
    )?;

    log::info!("Created worktree at: {}", worktree_path.display());
    Ok(())
}

fn has_uncommitted_changes(worktree_path: &Path) -> Result<bool> {
    let repo = Repository::open(worktree_path)?;
    let statuses = repo.statuses(None)?;
    Ok(!statuses.is_empty())
}

/// Removes a worktree directory and prunes its registration. With
/// `force: false` a dirty worktree is left alone and an error returned.
pub fn remove_worktree(repo_path: &Path, worktree_path: &Path, force: bool) -> Result<()> {
    if !force && worktree_path.exists() && has_uncommitted_changes(worktree_path)? {
        return Err(anyhow!(
            "Worktree has uncommitted changes: {}",
            worktree_path.display()
        ));
    }

    let repo = Repository::open(repo_path)?;

    let canonical_target_path = worktree_path
        .canonicalize()
        .unwrap_or_else(|_| worktree_path.to_path_buf());

    let worktrees = repo.worktrees()?;
    for wt_name in worktrees.iter().flatten() {
        if let Ok(wt) = repo.find_worktree(wt_name) {
            let wt_path = wt.path();
            let canonical_wt_path = wt_path
                .canonicalize()
                .unwrap_or_else(|_| wt_path.to_path_buf());
            if canonical_wt_path == canonical_target_path || wt_path == worktree_path {
                // Remove the directory first so the registration becomes prunable
                if worktree_path.exists()
                    && let Err(e) = std::fs::remove_dir_all(worktree_path)
                {
                    return Err(anyhow!("Failed to remove worktree directory: {e}"));
                }

                if let Err(e) = wt.prune(Some(&mut WorktreePruneOptions::new())) {
                    log::warn!("Failed to prune worktree from git registry: {e}");
                }
                return Ok(());
            }
        }
    }

    if worktree_path.exists() {
        std::fs::remove_dir_all(worktree_path)?;
        Ok(())
    } else {
        Err(anyhow!("Worktree not found: {worktree_path:?}"))
    }
}

/// Points a worktree's HEAD at `branch_name` after the branch was renamed
/// underneath it. Both refs resolve to the same commit, so the checkout is a
/// formality that keeps the symbolic ref consistent.
pub fn point_worktree_at_branch(worktree_path: &Path, branch_name: &str) -> Result<()> {
    validate_branch_name(branch_name)?;

    let repo = Repository::open(worktree_path)?;
    repo.set_head(&format!("refs/heads/{branch_name}"))
        .map_err(|e| anyhow!("Failed to update worktree HEAD to '{branch_name}': {e}"))?;

    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.checkout_head(Some(&mut checkout))
        .map_err(|e| anyhow!("Failed to checkout '{branch_name}' in worktree: {e}"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::git::branches::{branch_exists, rename_branch};
    use crate::domains::git::repository::get_current_branch;
    use tempfile::TempDir;

    fn init_repo(dir: &Path) -> Repository {
        let repo = Repository::init(dir).unwrap();
        {
            let mut cfg = repo.config().unwrap();
            cfg.set_str("user.name", "Test").unwrap();
            cfg.set_str("user.email", "test@example.com").unwrap();
        }
        {
            let mut index = repo.index().unwrap();
            let tree_id = index.write_tree().unwrap();
            let tree = repo.find_tree(tree_id).unwrap();
            let sig = repo.signature().unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[])
                .unwrap();
        }
        repo
    }

    #[test]
    fn branch_name_validation() {
        assert!(validate_branch_name("main").is_ok());
        assert!(validate_branch_name("session/fix-login-bug-abc12345").is_ok());
        assert!(validate_branch_name("release-1.2.3").is_ok());
        assert!(validate_branch_name("..bad").is_err());
        assert!(validate_branch_name("bad\\name").is_err());
        assert!(validate_branch_name("").is_err());
    }

    #[test]
    fn create_and_remove_worktree() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path());
        let base = get_current_branch(tmp.path()).unwrap();
        let wt_path = tmp.path().join(".leitwerk/worktrees/fix-login-bug-abc12345");

        create_worktree_from_base(
            tmp.path(),
            "session/fix-login-bug-abc12345",
            &wt_path,
            &base,
        )
        .unwrap();

        assert!(wt_path.exists());
        assert!(branch_exists(tmp.path(), "session/fix-login-bug-abc12345").unwrap());
        assert_eq!(
            get_current_branch(&wt_path).unwrap(),
            "session/fix-login-bug-abc12345"
        );

        remove_worktree(tmp.path(), &wt_path, true).unwrap();
        assert!(!wt_path.exists());
    }

    #[test]
    fn remove_without_force_refuses_dirty_worktree() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path());
        let base = get_current_branch(tmp.path()).unwrap();
        let wt_path = tmp.path().join(".leitwerk/worktrees/dirty");

        create_worktree_from_base(tmp.path(), "session/dirty-wt", &wt_path, &base).unwrap();
        std::fs::write(wt_path.join("scratch.txt"), "uncommitted").unwrap();

        let err = remove_worktree(tmp.path(), &wt_path, false).unwrap_err();
        assert!(err.to_string().contains("uncommitted changes"));
        assert!(wt_path.exists());

        remove_worktree(tmp.path(), &wt_path, true).unwrap();
        assert!(!wt_path.exists());
    }

    #[test]
    fn rename_then_point_worktree_at_new_branch() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path());
        let base = get_current_branch(tmp.path()).unwrap();
        let wt_path = tmp.path().join(".leitwerk/worktrees/old-name");

        create_worktree_from_base(tmp.path(), "session/old-name", &wt_path, &base).unwrap();
        rename_branch(tmp.path(), "session/old-name", "session/new-name").unwrap();
        point_worktree_at_branch(&wt_path, "session/new-name").unwrap();

        assert_eq!(get_current_branch(&wt_path).unwrap(), "session/new-name");
    }

    #[test]
    fn create_bootstraps_missing_base_branch() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path());
        let wt_path = tmp.path().join(".leitwerk/worktrees/boot");

        create_worktree_from_base(tmp.path(), "session/boot", &wt_path, "nonexistent-base")
            .unwrap();

        assert!(wt_path.exists());
        assert!(branch_exists(tmp.path(), "nonexistent-base").unwrap());
    }
}
