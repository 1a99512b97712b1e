//! Entity-change events and the components that turn them into backups.
//!
//! [`TopicEventListener`] is registered against whatever delivers host events
//! (the CLI feeds it through a `tokio` channel). [`TopicResaveObserver`] is
//! handed to the localized-property write path so a translation change
//! re-saves its topic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::backup::{BackupCoordinator, BackupOutcome};
use crate::errors::BackupError;
use crate::host::{LocalizedPropertyObserver, TopicLookup};
use crate::models::{LocalizedProperty, Topic, TOPIC_LOCALE_KEY_GROUP};

/// A topic was inserted, updated, or deleted in the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicEvent {
    Inserted(Topic),
    Updated(Topic),
    Deleted(Topic),
}

impl TopicEvent {
    pub fn topic(&self) -> &Topic {
        match self {
            Self::Inserted(t) | Self::Updated(t) | Self::Deleted(t) => t,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Inserted(_) => "inserted",
            Self::Updated(_) => "updated",
            Self::Deleted(_) => "deleted",
        }
    }
}

/// Counters for a listener's lifetime.
#[derive(Debug, Default)]
pub struct ListenerStats {
    pub handled: AtomicU64,
    pub failed: AtomicU64,
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// Routes topic events to the coordinator.
pub struct TopicEventListener {
    coordinator: Arc<BackupCoordinator>,
    stats: Arc<ListenerStats>,
}

impl TopicEventListener {
    pub fn new(coordinator: Arc<BackupCoordinator>) -> Self {
        Self {
            coordinator,
            stats: Arc::new(ListenerStats::default()),
        }
    }

    pub fn stats(&self) -> &ListenerStats {
        &self.stats
    }

    /// Handle one event synchronously. Failures are logged and returned.
    pub fn handle(&self, event: &TopicEvent) -> Result<BackupOutcome, BackupError> {
        dispatch(&self.coordinator, &self.stats, event)
    }

    /// Consume events until every sender is dropped. Each coordinator call
    /// runs on the blocking pool, one event at a time, in arrival order.
    pub async fn run(&self, mut rx: mpsc::Receiver<TopicEvent>) {
        info!("topic event listener started");
        while let Some(event) = rx.recv().await {
            let coordinator = self.coordinator.clone();
            let stats = self.stats.clone();
            let kind = event.kind();
            let system_name = event.topic().system_name.clone();

            let joined =
                tokio::task::spawn_blocking(move || dispatch(&coordinator, &stats, &event)).await;
            if let Err(e) = joined {
                self.stats.failed.fetch_add(1, Ordering::SeqCst);
                error!(kind, system_name = %system_name, error = %e, "event handler panicked");
            }
        }
        info!(
            handled = self.stats.handled.load(Ordering::SeqCst),
            failed = self.stats.failed.load(Ordering::SeqCst),
            "topic event listener stopped"
        );
    }
}

fn dispatch(
    coordinator: &BackupCoordinator,
    stats: &ListenerStats,
    event: &TopicEvent,
) -> Result<BackupOutcome, BackupError> {
    let topic = event.topic();
    let result = match event {
        TopicEvent::Inserted(_) | TopicEvent::Updated(_) => coordinator.save(topic),
        TopicEvent::Deleted(_) => coordinator.delete(topic),
    };
    match &result {
        Ok(outcome) => {
            stats.handled.fetch_add(1, Ordering::SeqCst);
            debug!(kind = event.kind(), system_name = %topic.system_name, ?outcome, "event handled");
        }
        Err(e) => {
            stats.failed.fetch_add(1, Ordering::SeqCst);
            error!(
                kind = event.kind(),
                system_name = %topic.system_name,
                error = %e,
                "topic backup failed"
            );
        }
    }
    result
}

// ---------------------------------------------------------------------------
// Localization observer
// ---------------------------------------------------------------------------

/// Re-saves the owning topic after one of its localized values is written.
pub struct TopicResaveObserver {
    topics: Arc<dyn TopicLookup>,
    coordinator: Arc<BackupCoordinator>,
}

impl TopicResaveObserver {
    pub fn new(topics: Arc<dyn TopicLookup>, coordinator: Arc<BackupCoordinator>) -> Self {
        Self {
            topics,
            coordinator,
        }
    }

    /// The re-save itself, with errors returned instead of logged.
    pub fn resave(&self, property: &LocalizedProperty) -> Result<Option<BackupOutcome>, BackupError> {
        if property.locale_key_group != TOPIC_LOCALE_KEY_GROUP {
            return Ok(None);
        }
        match self.topics.topic_by_id(property.entity_id)? {
            Some(topic) => self.coordinator.save(&topic).map(Some),
            None => {
                warn!(entity_id = property.entity_id, "localized value for unknown topic");
                Ok(None)
            }
        }
    }
}

impl LocalizedPropertyObserver for TopicResaveObserver {
    fn localized_property_written(&self, property: &LocalizedProperty) {
        if let Err(e) = self.resave(property) {
            error!(
                entity_id = property.entity_id,
                key = %property.locale_key,
                error = %e,
                "re-save after localization change failed"
            );
        }
    }
}
