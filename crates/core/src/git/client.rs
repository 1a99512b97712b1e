//! Local Git repository operations via `git2`.
//!
//! This is the only place the engine talks to Git. It performs init, stage,
//! remove, and commit against one local repository; nothing else.

use std::path::{Path, PathBuf};

use chrono::Utc;
use git2::{ConfigLevel, IndexAddOption, Oid, Repository, Signature, Time};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use super::status::{self, ChangeSet};
use crate::errors::GitError;

/// High-level Git client wrapping a `git2::Repository`.
pub struct GitClient {
    repo: Repository,
    repo_path: PathBuf,
}

/// Information about a single Git commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitCommitInfo {
    pub sha: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub author_time: i64,
    pub committer_name: String,
    pub committer_email: String,
}

impl GitClient {
    /// Open an existing Git repository at `repo_path`.
    pub fn new<P: AsRef<Path>>(repo_path: P) -> Result<Self, GitError> {
        let path = repo_path.as_ref();
        debug!(path = %path.display(), "opening git repository");
        let repo = Repository::open(path)
            .map_err(|_| GitError::RepositoryNotFound(path.display().to_string()))?;
        Ok(Self {
            repo,
            repo_path: path.to_path_buf(),
        })
    }

    /// Create `path` and initialize an empty repository in it.
    ///
    /// Fails with [`GitError::AlreadyExists`] if the directory already exists;
    /// an existing directory is never adopted.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn init(path: &Path) -> Result<Self, GitError> {
        if path.exists() {
            return Err(GitError::AlreadyExists(path.display().to_string()));
        }
        std::fs::create_dir_all(path)?;
        let repo = Repository::init(path)?;
        info!("initialized git repository");
        Ok(Self {
            repo,
            repo_path: path.to_path_buf(),
        })
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Set `user.name` and `user.email` in this repository's own config.
    /// Global and system config are left alone.
    #[instrument(skip(self))]
    pub fn configure_identity(&self, name: &str, email: &str) -> Result<(), GitError> {
        let mut config = self.repo.config()?.open_level(ConfigLevel::Local)?;
        config.set_str("user.name", name)?;
        config.set_str("user.email", email)?;
        info!("configured repository identity");
        Ok(())
    }

    /// Read back the repository-local identity, if set.
    pub fn identity(&self) -> Result<(Option<String>, Option<String>), GitError> {
        let config = self.repo.config()?.open_level(ConfigLevel::Local)?;
        Ok((
            config.get_string("user.name").ok(),
            config.get_string("user.email").ok(),
        ))
    }

    /// Stage the file(s) matching `pathspec` (a path relative to the
    /// repository root, or a glob).
    #[instrument(skip(self))]
    pub fn stage_path(&self, pathspec: &str) -> Result<(), GitError> {
        let mut index = self.repo.index()?;
        index.add_all([pathspec].iter(), IndexAddOption::DEFAULT, None)?;
        index.write()?;
        debug!("staged path");
        Ok(())
    }

    /// Stage every new, modified, and deleted path in the working tree.
    #[instrument(skip(self))]
    pub fn stage_all(&self) -> Result<(), GitError> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        debug!("staged all paths");
        Ok(())
    }

    /// Delete `file` from the working tree and stage the deletion.
    #[instrument(skip_all, fields(file = %file.display()))]
    pub fn remove_path(&self, file: &Path) -> Result<(), GitError> {
        let full = self.repo_path.join(file);
        if full.exists() {
            std::fs::remove_file(&full)?;
        }
        let mut index = self.repo.index()?;
        index.remove_path(file)?;
        index.write()?;
        debug!("removed path");
        Ok(())
    }

    /// Commit the index with `name <email>` as both author and committer,
    /// stamped with the current time.
    ///
    /// Returns [`GitError::NothingToCommit`] when the index tree equals the
    /// HEAD tree.
    #[instrument(skip(self, message))]
    pub fn commit(&self, message: &str, name: &str, email: &str) -> Result<Oid, GitError> {
        let mut index = self.repo.index()?;
        let tree_oid = index.write_tree()?;
        let parent_commit = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(_) => None,
        };
        let unchanged = match &parent_commit {
            Some(parent) => parent.tree_id() == tree_oid,
            None => index.is_empty(),
        };
        if unchanged {
            debug!("index matches HEAD");
            return Err(GitError::NothingToCommit);
        }

        let tree = self.repo.find_tree(tree_oid)?;
        let now = Utc::now();
        let signature = Signature::new(name, email, &Time::new(now.timestamp(), 0))?;
        let parents: Vec<&git2::Commit> = parent_commit.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
        info!(sha = %oid, "created commit");
        Ok(oid)
    }

    /// Summarize the working tree against the last commit.
    pub fn change_set(&self) -> Result<ChangeSet, GitError> {
        status::detect(&self.repo)
    }

    /// True when the working tree or index differs from the last commit.
    pub fn is_dirty(&self) -> Result<bool, GitError> {
        Ok(self.change_set()?.is_dirty())
    }

    /// Return the SHA of HEAD, or `None` on an unborn branch.
    pub fn head_sha(&self) -> Result<Option<String>, GitError> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?.id().to_string())),
            Err(e)
                if matches!(
                    e.code(),
                    git2::ErrorCode::UnbornBranch | git2::ErrorCode::NotFound
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Walk history from HEAD, newest first, up to `limit` commits.
    pub fn recent_commits(&self, limit: usize) -> Result<Vec<GitCommitInfo>, GitError> {
        if self.head_sha()?.is_none() {
            return Ok(Vec::new());
        }
        let mut revwalk = self.repo.revwalk()?;
        revwalk.push_head()?;
        revwalk.set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::TIME)?;
        let mut commits = Vec::new();
        for oid_result in revwalk.take(limit) {
            let oid = oid_result?;
            let commit = self.repo.find_commit(oid)?;
            commits.push(GitCommitInfo {
                sha: oid.to_string(),
                message: commit.message().unwrap_or("").to_string(),
                author_name: commit.author().name().unwrap_or("").to_string(),
                author_email: commit.author().email().unwrap_or("").to_string(),
                author_time: commit.author().when().seconds(),
                committer_name: commit.committer().name().unwrap_or("").to_string(),
                committer_email: commit.committer().email().unwrap_or("").to_string(),
            });
        }
        debug!(count = commits.len(), "collected commits");
        Ok(commits)
    }

    /// Number of commits reachable from HEAD.
    pub fn commit_count(&self) -> Result<usize, GitError> {
        if self.head_sha()?.is_none() {
            return Ok(0);
        }
        let mut revwalk = self.repo.revwalk()?;
        revwalk.push_head()?;
        Ok(revwalk.count())
    }

    /// Paths tracked in the HEAD tree, sorted.
    pub fn tracked_files(&self) -> Result<Vec<String>, GitError> {
        if self.head_sha()?.is_none() {
            return Ok(Vec::new());
        }
        let tree = self.repo.head()?.peel_to_tree()?;
        let mut files = Vec::new();
        tree.walk(git2::TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(git2::ObjectType::Blob) {
                files.push(format!("{}{}", root, entry.name().unwrap_or("")));
            }
            git2::TreeWalkResult::Ok
        })?;
        files.sort();
        Ok(files)
    }

    /// Recursively delete the repository directory at `path`.
    ///
    /// Read-only flags are cleared on every file first; Git writes its object
    /// files read-only, which would otherwise block removal on some platforms.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn destroy(path: &Path) -> Result<(), GitError> {
        if !path.exists() {
            debug!("nothing to destroy");
            return Ok(());
        }
        for entry in WalkDir::new(path) {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let mut perms = entry.metadata().map_err(std::io::Error::from)?.permissions();
            if perms.readonly() {
                #[allow(clippy::permissions_set_readonly_false)]
                perms.set_readonly(false);
                if let Err(e) = std::fs::set_permissions(entry.path(), perms) {
                    warn!(file = %entry.path().display(), error = %e, "could not clear read-only flag");
                }
            }
        }
        std::fs::remove_dir_all(path)?;
        info!("destroyed repository");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_in(dir: &tempfile::TempDir) -> GitClient {
        GitClient::init(&dir.path().join("repo")).unwrap()
    }

    #[test]
    fn test_init_refuses_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("keep.txt"), "mine").unwrap();
        let result = GitClient::init(dir.path());
        assert!(matches!(result, Err(GitError::AlreadyExists(_))));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("keep.txt")).unwrap(),
            "mine"
        );
        assert!(!dir.path().join(".git").exists());
    }

    #[test]
    fn test_init_stage_and_commit() {
        let dir = tempfile::tempdir().unwrap();
        let client = init_in(&dir);
        std::fs::write(client.repo_path().join("hello.sql"), "SELECT 1").unwrap();
        client.stage_path("hello.sql").unwrap();
        assert!(client.is_dirty().unwrap());

        let oid = client.commit("initial", "Test", "test@test.com").unwrap();
        assert!(!oid.is_zero());
        assert_eq!(client.head_sha().unwrap(), Some(oid.to_string()));
        assert!(!client.is_dirty().unwrap());

        let log = client.recent_commits(10).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].author_name, "Test");
        assert_eq!(log[0].committer_email, "test@test.com");
    }

    #[test]
    fn test_commit_without_changes_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let client = init_in(&dir);
        assert!(matches!(
            client.commit("empty", "T", "t@t.com"),
            Err(GitError::NothingToCommit)
        ));

        std::fs::write(client.repo_path().join("a.sql"), "a").unwrap();
        client.stage_all().unwrap();
        client.commit("first", "T", "t@t.com").unwrap();
        client.stage_all().unwrap();
        assert!(matches!(
            client.commit("again", "T", "t@t.com"),
            Err(GitError::NothingToCommit)
        ));
        assert_eq!(client.commit_count().unwrap(), 1);
    }

    #[test]
    fn test_identity_is_repository_local() {
        let dir = tempfile::tempdir().unwrap();
        let client = init_in(&dir);
        client.configure_identity("Backup Bot", "bot@example.com").unwrap();
        let (name, email) = client.identity().unwrap();
        assert_eq!(name.as_deref(), Some("Backup Bot"));
        assert_eq!(email.as_deref(), Some("bot@example.com"));

        let config = std::fs::read_to_string(client.repo_path().join(".git/config")).unwrap();
        assert!(config.contains("bot@example.com"));
    }

    #[test]
    fn test_remove_path_stages_deletion() {
        let dir = tempfile::tempdir().unwrap();
        let client = init_in(&dir);
        std::fs::write(client.repo_path().join("gone.sql"), "x").unwrap();
        client.stage_path("gone.sql").unwrap();
        client.commit("add", "T", "t@t.com").unwrap();

        client.remove_path(Path::new("gone.sql")).unwrap();
        assert!(!client.repo_path().join("gone.sql").exists());
        let changes = client.change_set().unwrap();
        assert_eq!(changes.deleted, vec!["gone.sql".to_string()]);

        client.commit("remove", "T", "t@t.com").unwrap();
        assert!(client.tracked_files().unwrap().is_empty());
    }

    #[test]
    fn test_destroy_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let client = init_in(&dir);
        std::fs::write(client.repo_path().join("a.sql"), "a").unwrap();
        client.stage_all().unwrap();
        client.commit("first", "T", "t@t.com").unwrap();
        let path = client.repo_path().to_path_buf();
        drop(client);

        GitClient::destroy(&path).unwrap();
        assert!(!path.exists());
        // A second destroy is a no-op.
        GitClient::destroy(&path).unwrap();
    }

    #[test]
    fn test_repo_not_found() {
        assert!(matches!(
            GitClient::new("/nonexistent/topics"),
            Err(GitError::RepositoryNotFound(_))
        ));
    }
}
