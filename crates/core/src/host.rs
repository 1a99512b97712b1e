//! Interfaces to the host application's services.
//!
//! The backup engine never reaches into the host directly. Topic lookup,
//! localization lookup, and settings persistence are injected behind these
//! traits; [`crate::db::Database`] is the SQLite implementation shipped with
//! the CLI.

use crate::errors::LookupError;
use crate::models::{BackupSettings, Language, LocalizedProperty, Topic};

/// Read access to topics.
pub trait TopicLookup: Send + Sync {
    /// All topics visible to `store_id` (0 means every store).
    ///
    /// `show_hidden` includes unpublished topics; `include_all` ignores
    /// store limitations.
    fn all_topics(
        &self,
        store_id: i64,
        show_hidden: bool,
        include_all: bool,
    ) -> Result<Vec<Topic>, LookupError>;

    fn topic_by_id(&self, id: i64) -> Result<Option<Topic>, LookupError>;
}

/// Read access to languages and localized values.
pub trait LocalizationLookup: Send + Sync {
    /// Every language, hidden ones included, in a stable order.
    fn all_languages(&self) -> Result<Vec<Language>, LookupError>;

    /// The override for one field, or `None` when the base value applies.
    fn localized_value(
        &self,
        language_id: i64,
        entity_id: i64,
        locale_key_group: &str,
        locale_key: &str,
    ) -> Result<Option<String>, LookupError>;
}

/// Persistence of the single backup settings record.
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<Option<BackupSettings>, LookupError>;
    fn save(&self, settings: &BackupSettings) -> Result<(), LookupError>;
    fn delete(&self) -> Result<(), LookupError>;
}

/// Notified synchronously after a localized property has been written.
pub trait LocalizedPropertyObserver: Send + Sync {
    fn localized_property_written(&self, property: &LocalizedProperty);
}
