//! Backup coordinator.
//!
//! Each public operation is a short transaction against the configured
//! repository:
//!
//! - **save**: render the topic, overwrite `<repo>/<SystemName>.sql`, stage it,
//!   commit if the tree is dirty.
//! - **delete**: remove the topic's file and commit the removal.
//! - **backup_all**: rewrite every topic's file, stage everything, commit once
//!   if anything changed.
//! - **install / uninstall / update_user_info**: repository lifecycle and
//!   committer identity.
//!
//! Settings are read fresh from the [`SettingsStore`] on every call, and all
//! writes to one repository are serialized by [`RepositoryLock`].

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::errors::{BackupError, GitError};
use crate::git::GitClient;
use crate::host::{LocalizationLookup, SettingsStore, TopicLookup};
use crate::lock::RepositoryLock;
use crate::models::{BackupSettings, Topic};
use crate::serializer::{Document, TopicSerializer};

/// Extension of every backup file.
pub const BACKUP_FILE_EXTENSION: &str = "sql";

// ---------------------------------------------------------------------------
// Commit messages
// ---------------------------------------------------------------------------

/// Commit message after a topic was created or updated.
pub fn saved_message(system_name: &str) -> String {
    format!("Topic {} has created/updated", system_name)
}

/// Commit message after a topic was deleted.
pub fn removed_message(system_name: &str) -> String {
    format!("Topic {} has been removed", system_name)
}

/// Commit message for a full resync.
pub const BACKED_UP_ALL_MESSAGE: &str = "Backed up all topics";

/// File name (relative to the repository root) holding `system_name`.
pub fn backup_file_name(system_name: &str) -> Result<String, BackupError> {
    let usable = !system_name.trim().is_empty()
        && system_name != "."
        && system_name != ".."
        && !system_name.contains(['/', '\\', '\0']);
    if !usable {
        return Err(BackupError::InvalidSystemName(system_name.to_string()));
    }
    Ok(format!("{}.{}", system_name, BACKUP_FILE_EXTENSION))
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What a coordinator operation did to the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// A commit was created.
    Committed { sha: String },
    /// Files were rewritten but the tree matched the last commit.
    Unchanged,
    /// Delete of a topic that has no backup file.
    NothingToRemove,
}

impl BackupOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

/// Result of a full resync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupAllSummary {
    pub topics_written: usize,
    pub outcome: BackupOutcome,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Orchestrates topic backups against the configured repository.
#[derive(Clone)]
pub struct BackupCoordinator {
    settings: Arc<dyn SettingsStore>,
    topics: Arc<dyn TopicLookup>,
    localization: Arc<dyn LocalizationLookup>,
    store_id: i64,
}

impl BackupCoordinator {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        topics: Arc<dyn TopicLookup>,
        localization: Arc<dyn LocalizationLookup>,
    ) -> Self {
        Self {
            settings,
            topics,
            localization,
            store_id: 0,
        }
    }

    /// Restrict `backup_all` lookups to one store (0 means all stores).
    pub fn with_store_id(mut self, store_id: i64) -> Self {
        self.store_id = store_id;
        self
    }

    pub fn topics(&self) -> &Arc<dyn TopicLookup> {
        &self.topics
    }

    // -----------------------------------------------------------------------
    // Topic operations
    // -----------------------------------------------------------------------

    /// Write the topic's document and commit it if the tree changed.
    #[instrument(skip_all, fields(system_name = %topic.system_name))]
    pub fn save(&self, topic: &Topic) -> Result<BackupOutcome, BackupError> {
        let settings = self.live_settings()?;
        let file_name = backup_file_name(&topic.system_name)?;
        let repo_path = settings.repository_path();

        let _lock = RepositoryLock::acquire(&repo_path);
        let document = self.serializer().render(topic)?;
        let git = GitClient::new(&repo_path)?;
        write_document(&repo_path, &file_name, &document)?;
        git.stage_path(&file_name)?;

        if !git.is_dirty()? {
            debug!("backup file unchanged");
            return Ok(BackupOutcome::Unchanged);
        }
        commit(&git, &saved_message(&topic.system_name), &settings)
    }

    /// Remove the topic's file and commit the removal. A topic that was
    /// never backed up is a no-op.
    #[instrument(skip_all, fields(system_name = %topic.system_name))]
    pub fn delete(&self, topic: &Topic) -> Result<BackupOutcome, BackupError> {
        let settings = self.live_settings()?;
        let file_name = backup_file_name(&topic.system_name)?;
        let repo_path = settings.repository_path();

        let _lock = RepositoryLock::acquire(&repo_path);
        if !repo_path.join(&file_name).exists() {
            debug!("no backup file to remove");
            return Ok(BackupOutcome::NothingToRemove);
        }
        let git = GitClient::new(&repo_path)?;
        git.remove_path(Path::new(&file_name))?;
        commit(&git, &removed_message(&topic.system_name), &settings)
    }

    /// Rewrite every topic, hidden ones included, and commit once if
    /// anything changed.
    #[instrument(skip_all)]
    pub fn backup_all(&self) -> Result<BackupAllSummary, BackupError> {
        let settings = self.live_settings()?;
        let repo_path = settings.repository_path();

        let _lock = RepositoryLock::acquire(&repo_path);
        let topics = self.topics.all_topics(self.store_id, true, true)?;
        let serializer = self.serializer();
        // Render everything before touching the tree so a lookup failure
        // leaves no partial state behind.
        let mut rendered = Vec::with_capacity(topics.len());
        for topic in &topics {
            let file_name = backup_file_name(&topic.system_name)?;
            rendered.push((file_name, serializer.render(topic)?));
        }

        let git = GitClient::new(&repo_path)?;
        for (file_name, document) in &rendered {
            write_document(&repo_path, file_name, document)?;
        }
        git.stage_all()?;
        info!(topics = rendered.len(), "wrote all topic documents");

        let outcome = if git.is_dirty()? {
            commit(&git, BACKED_UP_ALL_MESSAGE, &settings)?
        } else {
            debug!("repository unchanged after full backup");
            BackupOutcome::Unchanged
        };
        Ok(BackupAllSummary {
            topics_written: rendered.len(),
            outcome,
        })
    }

    // -----------------------------------------------------------------------
    // Repository lifecycle
    // -----------------------------------------------------------------------

    /// Create the repository directory, initialize it, and set the
    /// committer identity.
    ///
    /// No rollback happens here; a failing caller is expected to run
    /// [`uninstall`](Self::uninstall) with the same settings.
    #[instrument(skip_all, fields(repository = %settings.repository))]
    pub fn install(&self, settings: &BackupSettings) -> Result<(), BackupError> {
        settings.validate()?;
        let repo_path = settings.repository_path();
        if repo_path.exists() {
            return Err(BackupError::AlreadyExists(settings.repository.clone()));
        }

        let _lock = RepositoryLock::acquire(&repo_path);
        let git = GitClient::init(&repo_path).map_err(|e| match e {
            GitError::AlreadyExists(path) => BackupError::AlreadyExists(path),
            other => BackupError::Git(other),
        })?;
        git.configure_identity(&settings.name, &settings.email)?;
        info!("backup repository installed");
        Ok(())
    }

    /// Delete the repository directory. Unset or missing paths are a no-op.
    #[instrument(skip_all, fields(repository = %settings.repository))]
    pub fn uninstall(&self, settings: &BackupSettings) -> Result<(), BackupError> {
        if settings.repository.trim().is_empty() {
            debug!("no repository configured");
            return Ok(());
        }
        let repo_path = settings.repository_path();
        if !repo_path.exists() {
            debug!("repository already gone");
            return Ok(());
        }

        let _lock = RepositoryLock::acquire(&repo_path);
        GitClient::destroy(&repo_path)?;
        info!("backup repository removed");
        Ok(())
    }

    /// Re-point the committer identity of an existing repository. History is
    /// left untouched.
    #[instrument(skip_all, fields(repository = %settings.repository))]
    pub fn update_user_info(&self, settings: &BackupSettings) -> Result<(), BackupError> {
        settings.validate()?;
        let repo_path = settings.repository_path();
        ensure_exists(&repo_path)?;

        let _lock = RepositoryLock::acquire(&repo_path);
        GitClient::new(&repo_path)?.configure_identity(&settings.name, &settings.email)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Load settings and check they point at a usable repository.
    pub fn live_settings(&self) -> Result<BackupSettings, BackupError> {
        let settings = self
            .settings
            .load()?
            .ok_or_else(|| BackupError::NotConfigured("no backup settings saved".into()))?;
        if settings.repository.trim().is_empty() {
            return Err(BackupError::NotConfigured(
                "repository path is empty".into(),
            ));
        }
        if settings.name.trim().is_empty() || settings.email.trim().is_empty() {
            return Err(BackupError::NotConfigured(
                "committer name and email are required".into(),
            ));
        }
        ensure_exists(&settings.repository_path())?;
        Ok(settings)
    }

    /// Absolute path of the topic's backup file under the live settings.
    pub fn backup_file_path(&self, topic: &Topic) -> Result<PathBuf, BackupError> {
        let settings = self.live_settings()?;
        Ok(settings
            .repository_path()
            .join(backup_file_name(&topic.system_name)?))
    }

    fn serializer(&self) -> TopicSerializer<'_> {
        TopicSerializer::new(self.localization.as_ref())
    }
}

fn ensure_exists(repo_path: &Path) -> Result<(), BackupError> {
    if !repo_path.is_dir() {
        return Err(BackupError::RepositoryMissing(
            repo_path.display().to_string(),
        ));
    }
    Ok(())
}

/// Replace `<repo>/<file_name>` with `document` in one rename, so a failed
/// write never leaves a truncated file behind.
fn write_document(repo_path: &Path, file_name: &str, document: &Document) -> Result<(), BackupError> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".topicsgit-")
        .tempfile_in(repo_path)?;
    tmp.write_all(document.as_bytes())?;
    tmp.flush()?;
    tmp.persist(repo_path.join(file_name))
        .map_err(|e| BackupError::Io(e.error))?;
    Ok(())
}

/// Commit the index; an index identical to HEAD is reported as unchanged.
fn commit(
    git: &GitClient,
    message: &str,
    settings: &BackupSettings,
) -> Result<BackupOutcome, BackupError> {
    match git.commit(message, &settings.name, &settings.email) {
        Ok(oid) => Ok(BackupOutcome::Committed {
            sha: oid.to_string(),
        }),
        Err(GitError::NothingToCommit) => {
            debug!(message, "nothing staged, skipping commit");
            Ok(BackupOutcome::Unchanged)
        }
        Err(e) => Err(e.into()),
    }
}
