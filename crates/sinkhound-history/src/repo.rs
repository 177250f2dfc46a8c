//! Repository acquisition: open a local checkout or clone a remote one.

use std::path::Path;
use std::process::Command;

use git2::Repository;
use sinkhound_core::SinkhoundError;
use tempfile::TempDir;

/// A repository ready to be walked.
///
/// Remote repositories are cloned into a temporary directory that is removed
/// when the checkout is dropped.
pub struct Checkout {
    repo: Repository,
    // Declared after `repo` so the repository is closed before the directory is removed.
    tempdir: Option<TempDir>,
}

impl Checkout {
    /// Open `location` in place when it is a local path, clone it otherwise.
    ///
    /// When cloning, `branch` selects the branch to fetch.
    ///
    /// # Errors
    ///
    /// Returns [`SinkhoundError::FileNotFound`] for a local path that does
    /// not exist and [`SinkhoundError::Git`] if opening or cloning fails.
    pub fn acquire(location: &str, branch: Option<&str>) -> Result<Self, SinkhoundError> {
        if is_remote(location) {
            Self::clone_remote(location, branch)
        } else {
            Self::open_local(Path::new(location))
        }
    }

    /// Open an existing local repository.
    ///
    /// # Errors
    ///
    /// Returns [`SinkhoundError::FileNotFound`] if `path` does not exist and
    /// [`SinkhoundError::Git`] if it is not a git repository.
    pub fn open_local(path: &Path) -> Result<Self, SinkhoundError> {
        if !path.exists() {
            return Err(SinkhoundError::FileNotFound(path.to_path_buf()));
        }
        let repo = Repository::open(path)
            .map_err(|e| SinkhoundError::Git(format!("failed to open repository: {e}")))?;
        Ok(Self {
            repo,
            tempdir: None,
        })
    }

    /// Clone `url` into a fresh temporary directory with the `git` CLI.
    ///
    /// # Errors
    ///
    /// Returns [`SinkhoundError::Git`] if `git clone` fails.
    pub fn clone_remote(url: &str, branch: Option<&str>) -> Result<Self, SinkhoundError> {
        let tempdir = tempfile::Builder::new().prefix("sinkhound-").tempdir()?;
        tracing::info!(url, dir = %tempdir.path().display(), "cloning repository");

        let mut cmd = Command::new("git");
        cmd.args(["clone", "--quiet", "--no-checkout"]);
        if let Some(branch) = branch {
            cmd.args(["--branch", branch, "--single-branch"]);
        }
        cmd.arg("--").arg(url).arg(tempdir.path());

        let output = cmd
            .output()
            .map_err(|e| SinkhoundError::Git(format!("failed to run git clone: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SinkhoundError::Git(format!(
                "git clone failed: {}",
                stderr.trim()
            )));
        }

        let repo = Repository::open(tempdir.path())
            .map_err(|e| SinkhoundError::Git(format!("failed to open clone: {e}")))?;
        Ok(Self {
            repo,
            tempdir: Some(tempdir),
        })
    }

    /// The opened repository.
    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Whether this checkout lives in a temporary clone.
    pub fn is_temporary(&self) -> bool {
        self.tempdir.is_some()
    }
}

/// Whether `location` names a remote repository rather than a local path.
///
/// # Examples
///
/// ```
/// use sinkhound_history::repo::is_remote;
///
/// assert!(is_remote("https://github.com/org/repo.git"));
/// assert!(is_remote("git@github.com:org/repo.git"));
/// assert!(!is_remote("./checkout"));
/// ```
pub fn is_remote(location: &str) -> bool {
    location.contains("://") || location.starts_with("git@")
}
