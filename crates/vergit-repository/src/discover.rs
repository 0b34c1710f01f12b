use std::path::{Path, PathBuf};

use crate::RepoError;

/// Result of repository discovery before the stores are opened.
#[derive(Debug)]
pub(crate) struct DiscoveredRepo {
    /// The working directory the repository was found from (None when the
    /// starting path was a bare git dir).
    pub work_dir: Option<PathBuf>,
    /// The directory holding HEAD.
    pub git_dir: PathBuf,
    /// The shared directory (differs from `git_dir` in linked worktrees).
    pub common_dir: PathBuf,
}

/// Discover a git repository by walking up from `start`.
///
/// At each level: a `.git` directory wins, then a `.git` file containing a
/// `gitdir: <path>` redirect, then the directory itself being a bare git
/// dir.
pub(crate) fn discover(start: &Path) -> Result<DiscoveredRepo, RepoError> {
    let start = std::fs::canonicalize(start)
        .map_err(|_| RepoError::NotFound(start.to_path_buf()))?;

    let mut current = start.clone();
    loop {
        let dot_git = current.join(".git");

        if dot_git.is_dir() {
            let common_dir = resolve_common_dir(&dot_git);
            return Ok(DiscoveredRepo {
                work_dir: Some(current),
                git_dir: dot_git,
                common_dir,
            });
        }

        if dot_git.is_file() {
            // .git file — read the gitdir: redirect (linked worktrees and
            // submodule checkouts).
            let target = parse_gitdir_file(&dot_git)?;
            let target = if target.is_absolute() {
                target
            } else {
                current.join(&target)
            };
            let git_dir = std::fs::canonicalize(&target).map_err(|e| {
                RepoError::InvalidGitDir {
                    path: dot_git.clone(),
                    reason: format!("cannot resolve gitdir target: {e}"),
                }
            })?;
            let common_dir = resolve_common_dir(&git_dir);
            return Ok(DiscoveredRepo {
                work_dir: Some(current),
                git_dir,
                common_dir,
            });
        }

        // The directory itself may be a bare repository.
        if is_git_dir(&current) {
            let common_dir = resolve_common_dir(&current);
            return Ok(DiscoveredRepo {
                work_dir: None,
                git_dir: current,
                common_dir,
            });
        }

        match current.parent() {
            Some(parent) if parent != current => {
                current = parent.to_path_buf();
            }
            _ => {
                return Err(RepoError::NotFound(start));
            }
        }
    }
}

/// Check if a directory looks like a git dir (has HEAD and objects/).
pub(crate) fn is_git_dir(path: &Path) -> bool {
    path.join("HEAD").is_file() && path.join("objects").is_dir()
}

/// Parse a `.git` file containing `gitdir: <path>`.
fn parse_gitdir_file(path: &Path) -> Result<PathBuf, RepoError> {
    let content = std::fs::read_to_string(path).map_err(|e| RepoError::InvalidGitDir {
        path: path.to_path_buf(),
        reason: format!("cannot read .git file: {e}"),
    })?;
    let content = content.trim();
    let target = content.strip_prefix("gitdir: ").ok_or_else(|| {
        RepoError::InvalidGitDir {
            path: path.to_path_buf(),
            reason: format!("expected 'gitdir: <path>', got: {content}"),
        }
    })?;
    Ok(PathBuf::from(target))
}

/// Resolve the common dir for a git directory.
///
/// If the git dir has a `commondir` file, it points to the shared
/// directory; otherwise the git dir is its own common dir.
pub(crate) fn resolve_common_dir(git_dir: &Path) -> PathBuf {
    let commondir_file = git_dir.join("commondir");
    if commondir_file.is_file() {
        if let Ok(content) = std::fs::read_to_string(&commondir_file) {
            let relative = content.trim();
            let resolved = git_dir.join(relative);
            if let Ok(canonical) = std::fs::canonicalize(&resolved) {
                return canonical;
            }
            return resolved;
        }
    }
    git_dir.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn make_git_dir(path: &Path) {
        fs::create_dir_all(path.join("objects")).unwrap();
        fs::create_dir_all(path.join("refs").join("heads")).unwrap();
        fs::write(path.join("HEAD"), "ref: refs/heads/main\n").unwrap();
    }

    #[test]
    fn discover_from_work_tree_root() {
        let dir = tempfile::tempdir().unwrap();
        make_git_dir(&dir.path().join(".git"));

        let found = discover(dir.path()).unwrap();
        assert_eq!(found.git_dir, found.common_dir);
        assert!(found.work_dir.is_some());
    }

    #[test]
    fn discover_walks_up_from_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        make_git_dir(&dir.path().join(".git"));
        let nested = dir.path().join("src").join("deep").join("deeper");
        fs::create_dir_all(&nested).unwrap();

        let found = discover(&nested).unwrap();
        assert_eq!(
            found.work_dir.unwrap(),
            fs::canonicalize(dir.path()).unwrap()
        );
    }

    #[test]
    fn discover_bare_repository() {
        let dir = tempfile::tempdir().unwrap();
        make_git_dir(dir.path());

        let found = discover(dir.path()).unwrap();
        assert!(found.work_dir.is_none());
        assert_eq!(found.git_dir, fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn discover_through_gitdir_file() {
        let dir = tempfile::tempdir().unwrap();
        let real_git = dir.path().join("elsewhere").join("repo.git");
        make_git_dir(&real_git);

        let work = dir.path().join("checkout");
        fs::create_dir_all(&work).unwrap();
        fs::write(
            work.join(".git"),
            format!("gitdir: {}\n", real_git.display()),
        )
        .unwrap();

        let found = discover(&work).unwrap();
        assert_eq!(found.git_dir, fs::canonicalize(&real_git).unwrap());
    }

    #[test]
    fn commondir_file_redirects_shared_dir() {
        let dir = tempfile::tempdir().unwrap();
        let main_git = dir.path().join("main").join(".git");
        make_git_dir(&main_git);

        // Linked worktree layout: its git dir holds HEAD + commondir.
        let wt_git = main_git.join("worktrees").join("wt1");
        fs::create_dir_all(&wt_git).unwrap();
        fs::write(wt_git.join("HEAD"), "ref: refs/heads/topic\n").unwrap();
        fs::write(wt_git.join("commondir"), "../..\n").unwrap();

        let wt = dir.path().join("wt1-checkout");
        fs::create_dir_all(&wt).unwrap();
        fs::write(wt.join(".git"), format!("gitdir: {}\n", wt_git.display())).unwrap();

        let found = discover(&wt).unwrap();
        assert_eq!(found.git_dir, fs::canonicalize(&wt_git).unwrap());
        assert_eq!(found.common_dir, fs::canonicalize(&main_git).unwrap());
    }

    #[test]
    fn discover_fails_outside_any_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover(dir.path()),
            Err(RepoError::NotFound(_))
        ));
    }

    #[test]
    fn malformed_gitdir_file_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("checkout");
        fs::create_dir_all(&work).unwrap();
        fs::write(work.join(".git"), "not a gitdir line\n").unwrap();

        assert!(matches!(
            discover(&work),
            Err(RepoError::InvalidGitDir { .. })
        ));
    }
}
