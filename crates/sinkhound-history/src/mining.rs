//! Commit sources: the boundary between the scanner and a commit history.
//!
//! [`GitHistory`] walks a git2 repository oldest-first; anything else that
//! yields [`CommitHandle`]s in chronological order can be scanned as well.

use std::path::Path;

use git2::{Delta, DiffFindOptions, DiffOptions, Patch, Repository, Revwalk, Sort};
use sinkhound_core::SinkhoundError;

/// Unified diff text for one file of a commit.
///
/// # Examples
///
/// ```
/// use sinkhound_history::mining::FilePatch;
///
/// let patch = FilePatch {
///     path: Some("index.php".into()),
///     patch: b"@@ -0,0 +1 @@\n+eval($x);\n".to_vec(),
/// };
/// assert_eq!(patch.path.as_deref(), Some("index.php"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePatch {
    /// Destination path, `None` when the file was deleted.
    pub path: Option<String>,
    /// Raw unified diff bytes; not necessarily valid UTF-8.
    pub patch: Vec<u8>,
}

/// A commit as seen by the scanner.
pub trait CommitHandle {
    /// Full hex digest.
    fn id(&self) -> &str;

    /// First line of the commit message.
    fn summary(&self) -> &str;

    /// Parent digests in order; empty for a root commit.
    fn parent_ids(&self) -> &[String];

    /// Per-file patches of this commit against the parent at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkhoundError::Git`] if the diff cannot be computed.
    fn diff_with_parent(&self, index: usize) -> Result<Vec<FilePatch>, SinkhoundError>;
}

/// Lazily walks the commits of a branch, oldest first.
///
/// Commits are only looked up as the iterator is advanced, so a consumer
/// that stops early never touches the rest of the history.
///
/// # Examples
///
/// ```no_run
/// use git2::Repository;
/// use sinkhound_history::mining::{CommitHandle, GitHistory};
///
/// let repo = Repository::open(".").unwrap();
/// for commit in GitHistory::new(&repo, Some("main")).unwrap() {
///     let commit = commit.unwrap();
///     println!("{} {}", &commit.id()[..7], commit.summary());
/// }
/// ```
pub struct GitHistory<'repo> {
    repo: &'repo Repository,
    revwalk: Revwalk<'repo>,
}

impl<'repo> GitHistory<'repo> {
    /// Start a walk at `branch`, or at HEAD when `branch` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkhoundError::Git`] if the branch cannot be resolved or
    /// the walk cannot be set up.
    pub fn new(repo: &'repo Repository, branch: Option<&str>) -> Result<Self, SinkhoundError> {
        let mut revwalk = repo
            .revwalk()
            .map_err(|e| SinkhoundError::Git(format!("failed to create revwalk: {e}")))?;

        // Parents before children, oldest first.
        revwalk
            .set_sorting(Sort::TOPOLOGICAL | Sort::TIME | Sort::REVERSE)
            .map_err(|e| SinkhoundError::Git(format!("failed to set sorting: {e}")))?;

        if let Some(branch) = branch {
            let reference = repo
                .resolve_reference_from_short_name(branch)
                .map_err(|e| {
                    SinkhoundError::Git(format!("failed to resolve branch '{branch}': {e}"))
                })?;
            let oid = reference
                .peel_to_commit()
                .map_err(|e| SinkhoundError::Git(format!("branch '{branch}' has no commit: {e}")))?
                .id();
            revwalk
                .push(oid)
                .map_err(|e| SinkhoundError::Git(format!("failed to push oid: {e}")))?;
        } else {
            revwalk
                .push_head()
                .map_err(|e| SinkhoundError::Git(format!("failed to push HEAD: {e}")))?;
        }

        Ok(Self { repo, revwalk })
    }
}

impl<'repo> Iterator for GitHistory<'repo> {
    type Item = Result<GitCommit<'repo>, SinkhoundError>;

    fn next(&mut self) -> Option<Self::Item> {
        let oid = match self.revwalk.next()? {
            Ok(oid) => oid,
            Err(e) => return Some(Err(SinkhoundError::Git(format!("revwalk error: {e}")))),
        };
        Some(GitCommit::find(self.repo, oid))
    }
}

/// A commit read from a git2 repository.
pub struct GitCommit<'repo> {
    repo: &'repo Repository,
    commit: git2::Commit<'repo>,
    id: String,
    summary: String,
    parents: Vec<String>,
}

impl<'repo> GitCommit<'repo> {
    fn find(repo: &'repo Repository, oid: git2::Oid) -> Result<Self, SinkhoundError> {
        let commit = repo
            .find_commit(oid)
            .map_err(|e| SinkhoundError::Git(format!("failed to find commit {oid}: {e}")))?;

        let summary = String::from_utf8_lossy(commit.message_bytes())
            .lines()
            .next()
            .unwrap_or("")
            .trim()
            .to_string();
        let parents = commit.parent_ids().map(|p| p.to_string()).collect();

        Ok(Self {
            repo,
            commit,
            id: oid.to_string(),
            summary,
            parents,
        })
    }
}

impl CommitHandle for GitCommit<'_> {
    fn id(&self) -> &str {
        &self.id
    }

    fn summary(&self) -> &str {
        &self.summary
    }

    fn parent_ids(&self) -> &[String] {
        &self.parents
    }

    fn diff_with_parent(&self, index: usize) -> Result<Vec<FilePatch>, SinkhoundError> {
        let commit_tree = self
            .commit
            .tree()
            .map_err(|e| SinkhoundError::Git(format!("failed to get commit tree: {e}")))?;
        let parent = self
            .commit
            .parent(index)
            .map_err(|e| SinkhoundError::Git(format!("failed to get parent {index}: {e}")))?;
        let parent_tree = parent
            .tree()
            .map_err(|e| SinkhoundError::Git(format!("failed to get parent tree: {e}")))?;

        let mut diff_opts = DiffOptions::new();
        let mut diff = self
            .repo
            .diff_tree_to_tree(Some(&parent_tree), Some(&commit_tree), Some(&mut diff_opts))
            .map_err(|e| SinkhoundError::Git(format!("failed to compute diff: {e}")))?;

        // Enable rename detection
        let mut find_opts = DiffFindOptions::new();
        find_opts.renames(true);
        diff.find_similar(Some(&mut find_opts))
            .map_err(|e| SinkhoundError::Git(format!("failed to find renames: {e}")))?;

        let mut patches = Vec::new();
        for idx in 0..diff.deltas().len() {
            let Some(delta) = diff.get_delta(idx) else {
                continue;
            };
            if delta.flags().is_binary() {
                continue;
            }
            let path = match delta.status() {
                Delta::Deleted => None,
                _ => delta
                    .new_file()
                    .path()
                    .map(|p: &Path| p.to_string_lossy().to_string()),
            };

            let Some(mut patch) = Patch::from_diff(&diff, idx)
                .map_err(|e| SinkhoundError::Git(format!("failed to build patch: {e}")))?
            else {
                continue;
            };
            let buf = patch
                .to_buf()
                .map_err(|e| SinkhoundError::Git(format!("failed to render patch: {e}")))?;

            patches.push(FilePatch {
                path,
                patch: buf.to_vec(),
            });
        }

        Ok(patches)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use git2::{Signature, Time};

    use super::*;

    fn commit(repo: &Repository, path: &str, content: Option<&str>, message: &str, time: i64) {
        let workdir = repo.workdir().unwrap();
        let mut index = repo.index().unwrap();
        match content {
            Some(content) => {
                std::fs::write(workdir.join(path), content).unwrap();
                index.add_path(Path::new(path)).unwrap();
            }
            None => {
                std::fs::remove_file(workdir.join(path)).unwrap();
                index.remove_path(Path::new(path)).unwrap();
            }
        }
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::new("Test", "test@example.com", &Time::new(time, 0)).unwrap();
        let parents = match repo.head() {
            Ok(head) => vec![head.peel_to_commit().unwrap()],
            Err(_) => vec![],
        };
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .unwrap();
    }

    #[test]
    fn walks_oldest_first_with_parents() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        commit(&repo, "a.py", Some("print('hello')\n"), "initial commit", 1_700_000_000);
        commit(&repo, "a.py", Some("eval('danger')\n"), "add eval\n\nbody", 1_700_000_100);

        let commits: Vec<_> = GitHistory::new(&repo, None)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].summary(), "initial commit");
        assert!(commits[0].parent_ids().is_empty());
        assert_eq!(commits[1].summary(), "add eval");
        assert_eq!(commits[1].parent_ids(), &[commits[0].id().to_string()]);
        assert_eq!(commits[1].id().len(), 40);
    }

    #[test]
    fn diff_against_parent_renders_patch() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        commit(&repo, "a.py", Some("print('hello')\n"), "one", 1_700_000_000);
        commit(&repo, "a.py", Some("eval('danger')\n"), "two", 1_700_000_100);

        let commits: Vec<_> = GitHistory::new(&repo, None)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        let patches = commits[1].diff_with_parent(0).unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].path.as_deref(), Some("a.py"));
        let text = String::from_utf8_lossy(&patches[0].patch);
        assert!(text.contains("+eval('danger')"));
        assert!(text.contains("-print('hello')"));
    }

    #[test]
    fn deleted_file_has_no_destination() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        commit(&repo, "keep.php", Some("<?php\n"), "one", 1_700_000_000);
        commit(&repo, "gone.php", Some("<?php eval($x);\n"), "two", 1_700_000_100);
        commit(&repo, "gone.php", None, "three", 1_700_000_200);

        let commits: Vec<_> = GitHistory::new(&repo, None)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        let patches = commits[2].diff_with_parent(0).unwrap();
        assert_eq!(patches.len(), 1);
        assert!(patches[0].path.is_none());
    }

    #[test]
    fn unknown_branch_is_a_git_error() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        commit(&repo, "a.py", Some("x\n"), "one", 1_700_000_000);
        let err = GitHistory::new(&repo, Some("does-not-exist")).err().unwrap();
        assert!(matches!(err, SinkhoundError::Git(_)));
    }

    #[test]
    fn named_branch_is_walked() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        commit(&repo, "a.py", Some("x\n"), "one", 1_700_000_000);
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        repo.branch("audit", &head, false).unwrap();

        let ids: Vec<String> = GitHistory::new(&repo, Some("audit"))
            .unwrap()
            .map(|c| c.unwrap().id().to_string())
            .collect();
        assert_eq!(ids, vec![head.id().to_string()]);
    }
}
