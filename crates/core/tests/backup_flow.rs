//! End-to-end tests for topic backups.
//!
//! These tests wire the real pieces together:
//! - a file-backed SQLite host store
//! - the backup coordinator over a real git repository
//! - the event listener and the localization re-save observer
//!
//! Everything lives in a temporary directory; no network I/O.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::mpsc;

use topicsgit_core::backup::{saved_message, removed_message, BACKED_UP_ALL_MESSAGE};
use topicsgit_core::db::{Database, LocalizedPropertyWriter};
use topicsgit_core::events::{TopicEvent, TopicEventListener, TopicResaveObserver};
use topicsgit_core::git::GitClient;
use topicsgit_core::host::SettingsStore;
use topicsgit_core::models::{BackupSettings, LocalizedField, LocalizedProperty, Topic};
use topicsgit_core::{BackupCoordinator, BackupOutcome};

// ===========================================================================
// Helpers
// ===========================================================================

struct Host {
    _dir: TempDir,
    repo: PathBuf,
    db: Arc<Database>,
    coordinator: Arc<BackupCoordinator>,
}

impl Host {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("data").join("host.db")).unwrap();
        db.initialize().unwrap();
        let db = Arc::new(db);
        let coordinator = Arc::new(BackupCoordinator::new(db.clone(), db.clone(), db.clone()));
        let repo = dir.path().join("TopicsBackup");
        Self {
            _dir: dir,
            repo,
            db,
            coordinator,
        }
    }

    fn settings(&self, name: &str) -> BackupSettings {
        BackupSettings::for_user(
            self.repo.display().to_string(),
            Some(name),
            "backup@example.com",
        )
    }

    fn installed() -> Self {
        let host = Self::new();
        let settings = host.settings("admin");
        host.coordinator.install(&settings).unwrap();
        host.db.save(&settings).unwrap();
        host
    }

    fn add_topic(&self, name: &str, title: &str) -> Topic {
        let mut topic = Topic {
            title: Some(title.into()),
            body: Some(format!("<p>{}</p>", title)),
            published: true,
            include_in_sitemap: true,
            ..Topic::new(name)
        };
        topic.id = self.db.insert_topic(&topic).unwrap();
        topic
    }

    fn git(&self) -> GitClient {
        GitClient::new(&self.repo).unwrap()
    }

    fn messages(&self) -> Vec<String> {
        self.git()
            .recent_commits(100)
            .unwrap()
            .into_iter()
            .map(|c| c.message.trim().to_string())
            .collect()
    }

    fn read(&self, file: &str) -> String {
        std::fs::read_to_string(self.repo.join(file)).unwrap()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[test]
fn test_backup_all_then_incremental_events() {
    let host = Host::installed();
    host.add_topic("about-us", "About us");
    host.add_topic("shipping", "Shipping");
    let hidden = Topic {
        published: false,
        ..Topic::new("draft")
    };
    host.db.insert_topic(&hidden).unwrap();

    let summary = host.coordinator.backup_all().unwrap();
    assert_eq!(summary.topics_written, 3);
    assert!(summary.outcome.is_committed());
    assert_eq!(
        host.git().tracked_files().unwrap(),
        vec!["about-us.sql", "draft.sql", "shipping.sql"]
    );

    // Nothing changed since: no second commit.
    let again = host.coordinator.backup_all().unwrap();
    assert_eq!(again.outcome, BackupOutcome::Unchanged);

    let listener = TopicEventListener::new(host.coordinator.clone());
    let mut shipping = host.db.get_topic_by_system_name("shipping").unwrap().unwrap();
    shipping.body = Some("<p>Free over $50</p>".into());
    host.db.update_topic(&shipping).unwrap();
    listener.handle(&TopicEvent::Updated(shipping.clone())).unwrap();

    host.db.delete_topic(shipping.id).unwrap();
    listener.handle(&TopicEvent::Deleted(shipping)).unwrap();

    assert_eq!(
        host.messages(),
        vec![
            removed_message("shipping"),
            saved_message("shipping"),
            BACKED_UP_ALL_MESSAGE.to_string(),
        ]
    );
    assert!(!host.repo.join("shipping.sql").exists());
    assert!(!host.git().is_dirty().unwrap());
}

#[test]
fn test_translation_change_resaves_topic() {
    let host = Host::installed();
    let french = host.db.insert_language("French", "fr-FR", true, 1).unwrap();
    let german = host.db.insert_language("German", "de-DE", false, 2).unwrap();
    let topic = host.add_topic("faq", "FAQ");
    host.coordinator.save(&topic).unwrap();
    assert!(!host.read("faq.sql").contains("LocalizedProperty"));

    let observer = TopicResaveObserver::new(host.db.clone(), host.coordinator.clone());
    let writer = LocalizedPropertyWriter::new(host.db.clone()).with_observer(Arc::new(observer));
    writer
        .write(&LocalizedProperty::for_topic(topic.id, french, LocalizedField::Title, "Questions fréquentes"))
        .unwrap();
    // Unpublished languages are backed up too.
    writer
        .write(&LocalizedProperty::for_topic(topic.id, german, LocalizedField::Body, "Häufige Fragen"))
        .unwrap();

    let doc = host.read("faq.sql");
    assert!(doc.contains("'Questions fréquentes'"));
    assert!(doc.contains("'Häufige Fragen'"));
    assert!(doc.contains("SCOPE_IDENTITY()"));
    assert_eq!(host.git().commit_count().unwrap(), 3);

    // Writing the same value again renders an identical document.
    writer
        .write(&LocalizedProperty::for_topic(topic.id, french, LocalizedField::Title, "Questions fréquentes"))
        .unwrap();
    assert_eq!(host.git().commit_count().unwrap(), 3);
}

#[tokio::test]
async fn test_listener_processes_channel_in_order() {
    let host = Host::installed();
    let listener = TopicEventListener::new(host.coordinator.clone());
    let (tx, rx) = mpsc::channel(16);

    let producer = {
        let topics: Vec<Topic> = (0..5)
            .map(|i| host.add_topic(&format!("topic-{}", i), &format!("Topic {}", i)))
            .collect();
        tokio::spawn(async move {
            for topic in &topics {
                tx.send(TopicEvent::Inserted(topic.clone())).await.unwrap();
            }
            tx.send(TopicEvent::Deleted(topics[0].clone())).await.unwrap();
        })
    };

    listener.run(rx).await;
    producer.await.unwrap();

    let messages = host.messages();
    assert_eq!(messages.len(), 6);
    assert_eq!(messages[0], removed_message("topic-0"));
    assert_eq!(messages[5], saved_message("topic-0"));
    assert_eq!(host.git().tracked_files().unwrap().len(), 4);
}

#[test]
fn test_reconfigure_changes_author_only() {
    let host = Host::installed();
    let topic = host.add_topic("contact", "Contact");
    host.coordinator.save(&topic).unwrap();

    let settings = host.settings("editor");
    host.db.save(&settings).unwrap();
    host.coordinator.update_user_info(&settings).unwrap();

    let updated = Topic {
        title: Some("Contact us".into()),
        ..topic
    };
    host.db.update_topic(&updated).unwrap();
    host.coordinator.save(&updated).unwrap();

    let commits = host.git().recent_commits(10).unwrap();
    assert_eq!(commits.len(), 2);
    assert_eq!(commits[0].author_name, "editor");
    assert_eq!(commits[0].committer_name, "editor");
    assert_eq!(commits[1].author_name, "admin");
    assert_eq!(
        host.git().identity().unwrap(),
        (Some("editor".to_string()), Some("backup@example.com".to_string()))
    );
}

#[test]
fn test_uninstall_then_events_fail_as_unconfigured() {
    let host = Host::installed();
    let topic = host.add_topic("legal", "Legal");
    host.coordinator.save(&topic).unwrap();

    let settings = host.db.load().unwrap().unwrap();
    host.coordinator.uninstall(&settings).unwrap();
    assert!(!host.repo.exists());

    // Settings still point at the deleted repository.
    let err = host.coordinator.save(&topic).unwrap_err();
    assert!(err.is_configuration_error());

    host.db.delete().unwrap();
    let err = host.coordinator.save(&topic).unwrap_err();
    assert!(err.is_configuration_error());

    // A second uninstall of a missing repository is a no-op.
    host.coordinator.uninstall(&settings).unwrap();
}

#[test]
fn test_install_refuses_existing_directory() {
    let host = Host::new();
    std::fs::create_dir_all(&host.repo).unwrap();
    std::fs::write(host.repo.join("keep.txt"), "mine").unwrap();

    let err = host.coordinator.install(&host.settings("admin")).unwrap_err();
    assert!(err.to_string().contains("already exists"));
    assert_eq!(std::fs::read_to_string(host.repo.join("keep.txt")).unwrap(), "mine");
}
