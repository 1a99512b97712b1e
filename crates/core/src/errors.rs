//! Error types for the TopicsGit core library.
//!
//! Each subsystem has its own error type derived with `thiserror`. Lower
//! layers nest into higher ones through `#[from]`: database errors surface
//! as lookup errors, and git and lookup errors surface as backup errors.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Backup coordinator errors
// ---------------------------------------------------------------------------

/// Errors surfaced by the backup coordinator to its callers.
#[derive(Debug, Error)]
pub enum BackupError {
    /// No settings record, or the repository path is empty.
    #[error("topic backup is not configured: {0}")]
    NotConfigured(String),

    /// The configured repository path no longer exists on disk.
    #[error("backup repository not found at '{0}'")]
    RepositoryMissing(String),

    /// Install was attempted against a pre-existing directory.
    #[error("{0} already exists. Please choose another directory for topics backup.")]
    AlreadyExists(String),

    /// A caller-supplied value was rejected before touching the filesystem.
    #[error("invalid argument '{field}': {detail}")]
    InvalidArgument { field: String, detail: String },

    /// The topic's system name cannot be used as a backup file name.
    #[error("topic system name '{0}' cannot be used as a backup file name")]
    InvalidSystemName(String),

    #[error("backup git error: {0}")]
    Git(#[from] GitError),

    #[error("backup lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("backup I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackupError {
    /// True for the configuration family: settings absent, empty repository
    /// path, or repository missing on disk.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::NotConfigured(_) | Self::RepositoryMissing(_))
    }
}

// ---------------------------------------------------------------------------
// Git errors
// ---------------------------------------------------------------------------

/// Errors from local Git (git2) operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// The repository path does not exist or is not a git repo.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// `init` refuses to adopt an existing directory.
    #[error("directory already exists at '{0}'")]
    AlreadyExists(String),

    /// The index matches HEAD; a commit would be empty.
    #[error("nothing to commit")]
    NothingToCommit,

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Collaborator lookup errors
// ---------------------------------------------------------------------------

/// Errors from the host collaborators (topics, localization, settings).
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("lookup database error: {0}")]
    Database(#[from] DatabaseError),

    /// A collaborator could not answer for a reason of its own.
    #[error("lookup unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Database errors
// ---------------------------------------------------------------------------

/// Errors from the SQLite host store.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Underlying rusqlite error.
    #[error("database error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// A migration failed.
    #[error("database migration failed (version {version}): {detail}")]
    MigrationFailed { version: u32, detail: String },

    /// A record was not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Generic I/O error (e.g. file permissions).
    #[error("database I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = BackupError::AlreadyExists("/srv/TopicsBackup".into());
        assert_eq!(
            err.to_string(),
            "/srv/TopicsBackup already exists. Please choose another directory for topics backup."
        );

        let err = GitError::RepositoryNotFound("/tmp/repo".into());
        assert_eq!(err.to_string(), "git repository not found at '/tmp/repo'");

        let err = BackupError::InvalidArgument {
            field: "email".into(),
            detail: "must not be empty".into(),
        };
        assert!(err.to_string().contains("email"));
    }

    #[test]
    fn test_configuration_family() {
        assert!(BackupError::NotConfigured("no settings".into()).is_configuration_error());
        assert!(BackupError::RepositoryMissing("/x".into()).is_configuration_error());
        assert!(!BackupError::AlreadyExists("/x".into()).is_configuration_error());
        assert!(!BackupError::Git(GitError::NothingToCommit).is_configuration_error());
    }

    #[test]
    fn test_errors_nest_into_backup_error() {
        let git: BackupError = GitError::NothingToCommit.into();
        assert!(matches!(git, BackupError::Git(GitError::NothingToCommit)));

        let db_err = DatabaseError::NotFound {
            entity: "topic".into(),
            id: "7".into(),
        };
        let lookup: LookupError = db_err.into();
        let backup: BackupError = lookup.into();
        assert!(matches!(backup, BackupError::Lookup(LookupError::Database(_))));
    }
}
