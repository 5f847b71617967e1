use anyhow::{Result, anyhow};
use git2::{ErrorCode, Repository};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// What a workspace path offers in terms of git, as seen by session creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GitSupport {
    pub is_git_repo: bool,
    pub is_bare: bool,
    pub git_root: Option<PathBuf>,
}

/// Probes `path` for a usable git repository. Never fails; a path outside any
/// repository simply reports `is_git_repo: false`.
pub fn detect_git_support(path: &Path) -> GitSupport {
    match Repository::discover(path) {
        Ok(repo) => {
            let is_bare = repo.is_bare();
            let git_root = repo
                .workdir()
                .map(|p| p.to_path_buf())
                .or_else(|| Some(repo.path().to_path_buf()));
            GitSupport {
                is_git_repo: true,
                is_bare,
                git_root,
            }
        }
        Err(e) => {
            log::debug!("No git repository at {}: {e}", path.display());
            GitSupport::default()
        }
    }
}

pub fn get_current_branch(repo_path: &Path) -> Result<String> {
    let repo = Repository::open(repo_path)?;

    match repo.head() {
        Ok(head) => head
            .shorthand()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("HEAD does not point to a branch")),
        Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
            let head_ref = repo.find_reference("HEAD")?;
            let target = head_ref
                .symbolic_target()
                .ok_or_else(|| anyhow!("HEAD has no symbolic target"))?;
            Ok(target
                .strip_prefix("refs/heads/")
                .unwrap_or(target)
                .to_string())
        }
        Err(e) => Err(anyhow!("Failed to read HEAD: {e}")),
    }
}

pub fn get_commit_hash(repo_path: &Path, reference: &str) -> Result<String> {
    let repo = Repository::open(repo_path)?;
    let obj = repo
        .revparse_single(reference)
        .map_err(|e| anyhow!("Failed to resolve '{reference}': {e}"))?;
    let commit = obj
        .peel_to_commit()
        .map_err(|e| anyhow!("'{reference}' does not point to a commit: {e}"))?;
    Ok(commit.id().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Repository;
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
    fn detects_repository_and_root() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path());

        let support = detect_git_support(tmp.path());
        assert!(support.is_git_repo);
        assert!(!support.is_bare);
        let root = support.git_root.unwrap().canonicalize().unwrap();
        assert_eq!(root, tmp.path().canonicalize().unwrap());
    }

    #[test]
    fn plain_directory_is_not_a_repo() {
        let tmp = TempDir::new().unwrap();
        let support = detect_git_support(tmp.path());
        assert!(!support.is_git_repo);
        assert!(support.git_root.is_none());
    }

    #[test]
    fn current_branch_of_fresh_repo() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path());
        let branch = get_current_branch(tmp.path()).unwrap();
        assert!(!branch.is_empty());
    }

    #[test]
    fn current_branch_before_first_commit_reads_unborn_head() {
        let tmp = TempDir::new().unwrap();
        Repository::init(tmp.path()).unwrap();
        let branch = get_current_branch(tmp.path()).unwrap();
        assert!(!branch.is_empty());
        assert!(!branch.starts_with("refs/"));
    }

    #[test]
    fn commit_hash_resolves_head() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path());
        let hash = get_commit_hash(tmp.path(), "HEAD").unwrap();
        assert_eq!(hash.len(), 40);
    }
}
