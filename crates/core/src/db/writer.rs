//! Write path for localized properties.
//!
//! Writes go through [`LocalizedPropertyWriter`] so that an observer can react
//! once the row is stored. The backup engine uses this to re-save a topic
//! whose translation changed.

use std::sync::Arc;

use tracing::debug;

use super::Database;
use crate::errors::DatabaseError;
use crate::host::LocalizedPropertyObserver;
use crate::models::LocalizedProperty;

pub struct LocalizedPropertyWriter {
    db: Arc<Database>,
    observer: Option<Arc<dyn LocalizedPropertyObserver>>,
}

impl LocalizedPropertyWriter {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db, observer: None }
    }

    /// Attach the observer notified after each successful write.
    pub fn with_observer(mut self, observer: Arc<dyn LocalizedPropertyObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Insert or update `property` and notify the observer with the stored
    /// row. The observer is not called when the write fails.
    pub fn write(&self, property: &LocalizedProperty) -> Result<LocalizedProperty, DatabaseError> {
        let (id, inserted) = self.db.upsert_localized_property(property)?;
        let stored = LocalizedProperty {
            id,
            ..property.clone()
        };
        debug!(
            id,
            inserted,
            entity_id = stored.entity_id,
            language_id = stored.language_id,
            key = %stored.locale_key,
            "localized property written"
        );
        if let Some(observer) = &self.observer {
            observer.localized_property_written(&stored);
        }
        Ok(stored)
    }
}
