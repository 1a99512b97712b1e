//! TopicsGit core library.
//!
//! Backs up content-management "topics" into a local git repository: each
//! topic becomes one canonical SQL document, and every change is committed
//! with a configured identity. The crate provides the document serializer,
//! the git gateway and change-set detector, the backup coordinator, the
//! event plumbing that drives it, and a SQLite host store implementing the
//! collaborator interfaces.

pub mod backup;
pub mod config;
pub mod db;
pub mod errors;
pub mod events;
pub mod git;
pub mod host;
pub mod lock;
pub mod models;
pub mod serializer;

// Re-exports for convenience.
pub use backup::{BackupAllSummary, BackupCoordinator, BackupOutcome};
pub use config::AppConfig;
pub use db::{Database, LocalizedPropertyWriter};
pub use errors::BackupError;
pub use events::{TopicEvent, TopicEventListener, TopicResaveObserver};
pub use git::{ChangeSet, GitClient};
pub use models::{BackupSettings, Language, LocalizedField, LocalizedProperty, Topic};
pub use serializer::{Document, TopicSerializer};
