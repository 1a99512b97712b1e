//! Working-tree change detection.
//!
//! Commits are only attempted when the repository actually differs from the
//! last committed snapshot, so re-rendering identical content never produces
//! an empty commit.

use std::path::Path;

use git2::{Repository, Status, StatusOptions};
use tracing::debug;

use crate::errors::GitError;

/// Paths that differ from HEAD, grouped by kind. Index and working-tree
/// changes are merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl ChangeSet {
    pub fn is_dirty(&self) -> bool {
        !(self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty())
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.is_dirty()
    }
}

/// Query the status of every path in `repo`, untracked files included.
pub fn detect(repo: &Repository) -> Result<ChangeSet, GitError> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false)
        .exclude_submodules(true);

    let statuses = repo.statuses(Some(&mut opts))?;
    let mut changes = ChangeSet::default();
    for entry in statuses.iter() {
        let status = entry.status();
        let path = entry.path().unwrap_or("").to_string();
        if status.intersects(Status::INDEX_DELETED | Status::WT_DELETED) {
            changes.deleted.push(path);
        } else if status.intersects(Status::INDEX_NEW | Status::WT_NEW) {
            changes.added.push(path);
        } else if status.intersects(
            Status::INDEX_MODIFIED
                | Status::INDEX_RENAMED
                | Status::INDEX_TYPECHANGE
                | Status::WT_MODIFIED
                | Status::WT_RENAMED
                | Status::WT_TYPECHANGE,
        ) {
            changes.modified.push(path);
        }
    }
    debug!(
        added = changes.added.len(),
        modified = changes.modified.len(),
        deleted = changes.deleted.len(),
        "working tree status"
    );
    Ok(changes)
}

/// Open the repository at `repo_path` and report whether it is dirty.
pub fn is_dirty(repo_path: &Path) -> Result<bool, GitError> {
    let repo = Repository::open(repo_path)
        .map_err(|_| GitError::RepositoryNotFound(repo_path.display().to_string()))?;
    Ok(detect(&repo)?.is_dirty())
}
