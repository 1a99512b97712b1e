//! Domain model types used throughout TopicsGit.
//!
//! These types bridge the host store, the serializer, and the backup
//! coordinator.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::BackupError;

/// Locale key group under which topic overrides are stored.
pub const TOPIC_LOCALE_KEY_GROUP: &str = "Topic";

// ---------------------------------------------------------------------------
// Topic
// ---------------------------------------------------------------------------

/// A content topic: the record being backed up.
///
/// `system_name` is the stable unique key; `id` is the host's numeric
/// identifier and only correlates localized values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Topic {
    pub id: i64,
    pub system_name: String,
    pub include_in_sitemap: bool,
    pub include_in_top_menu: bool,
    pub include_in_footer_column1: bool,
    pub include_in_footer_column2: bool,
    pub include_in_footer_column3: bool,
    pub display_order: i32,
    pub accessible_when_store_closed: bool,
    pub is_password_protected: bool,
    pub password: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub published: bool,
    pub topic_template_id: i32,
    pub meta_keywords: Option<String>,
    pub meta_description: Option<String>,
    pub meta_title: Option<String>,
    pub subject_to_acl: bool,
    pub limited_to_stores: bool,
}

impl Topic {
    /// A blank topic with the given system name.
    pub fn new(system_name: impl Into<String>) -> Self {
        Self {
            system_name: system_name.into(),
            ..Default::default()
        }
    }
}

/// Topic fields that carry per-language overrides, in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocalizedField {
    Title,
    Body,
}

impl LocalizedField {
    pub const ALL: [LocalizedField; 2] = [LocalizedField::Title, LocalizedField::Body];

    /// The locale key used by the host store.
    pub fn key(self) -> &'static str {
        match self {
            Self::Title => "Title",
            Self::Body => "Body",
        }
    }

    /// Parse a locale key, case-insensitively.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|field| field.key().eq_ignore_ascii_case(key))
    }
}

impl std::fmt::Display for LocalizedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

// ---------------------------------------------------------------------------
// Localization
// ---------------------------------------------------------------------------

/// A language known to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub id: i64,
    pub name: String,
    pub language_culture: String,
    pub published: bool,
    pub display_order: i32,
}

/// A per-language override of one field of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedProperty {
    pub id: i64,
    pub entity_id: i64,
    pub language_id: i64,
    pub locale_key_group: String,
    pub locale_key: String,
    pub locale_value: String,
}

impl LocalizedProperty {
    /// A new (unsaved) override of a topic field.
    pub fn for_topic(
        entity_id: i64,
        language_id: i64,
        field: LocalizedField,
        value: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            entity_id,
            language_id,
            locale_key_group: TOPIC_LOCALE_KEY_GROUP.to_string(),
            locale_key: field.key().to_string(),
            locale_value: value.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Backup settings
// ---------------------------------------------------------------------------

/// Where topics are backed up and who commits them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSettings {
    /// Filesystem path of the repository root.
    pub repository: String,
    /// Committer display name.
    pub name: String,
    /// Committer email.
    pub email: String,
}

impl BackupSettings {
    /// Settings derived from the acting user at install time. The display
    /// name falls back to the email when the user has no username.
    pub fn for_user(
        repository: impl Into<String>,
        username: Option<&str>,
        email: impl Into<String>,
    ) -> Self {
        let email = email.into();
        let name = match username.map(str::trim) {
            Some(u) if !u.is_empty() => u.to_string(),
            _ => email.clone(),
        };
        Self {
            repository: repository.into(),
            name,
            email,
        }
    }

    pub fn repository_path(&self) -> PathBuf {
        PathBuf::from(&self.repository)
    }

    /// Reject settings with an empty repository, name, or email.
    pub fn validate(&self) -> Result<(), BackupError> {
        let fields = [
            ("repository", &self.repository),
            ("name", &self.name),
            ("email", &self.email),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(BackupError::InvalidArgument {
                    field: field.into(),
                    detail: format!("{} is required", field),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_user_prefers_username() {
        let s = BackupSettings::for_user("/srv/backup", Some("alice"), "alice@example.com");
        assert_eq!(s.name, "alice");
        assert_eq!(s.email, "alice@example.com");
    }

    #[test]
    fn test_for_user_falls_back_to_email() {
        let s = BackupSettings::for_user("/srv/backup", Some("  "), "bob@example.com");
        assert_eq!(s.name, "bob@example.com");

        let s = BackupSettings::for_user("/srv/backup", None, "bob@example.com");
        assert_eq!(s.name, "bob@example.com");
    }

    #[test]
    fn test_validate_names_the_empty_field() {
        let mut s = BackupSettings::for_user("/srv/backup", Some("a"), "a@example.com");
        assert!(s.validate().is_ok());

        s.email = String::new();
        assert!(matches!(
            s.validate(),
            Err(BackupError::InvalidArgument { ref field, .. }) if field == "email"
        ));

        s.repository = String::new();
        assert!(matches!(
            s.validate(),
            Err(BackupError::InvalidArgument { ref field, .. }) if field == "repository"
        ));
    }

    #[test]
    fn test_localized_field_keys() {
        assert_eq!(LocalizedField::from_key("title"), Some(LocalizedField::Title));
        assert_eq!(LocalizedField::from_key("Body"), Some(LocalizedField::Body));
        assert_eq!(LocalizedField::from_key("MetaTitle"), None);
        assert_eq!(LocalizedField::Body.to_string(), "Body");
    }

    #[test]
    fn test_topic_deserializes_with_defaults() {
        let topic: Topic = toml::from_str(
            r#"
system_name = "about-us"
title = "About"
published = true
"#,
        )
        .unwrap();
        assert_eq!(topic.system_name, "about-us");
        assert!(topic.published);
        assert_eq!(topic.body, None);
        assert_eq!(topic.topic_template_id, 0);
    }
}
