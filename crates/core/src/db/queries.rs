//! Typed query helpers for every table in the host store, and the
//! collaborator trait implementations built on them.

use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use super::Database;
use crate::errors::{DatabaseError, LookupError};
use crate::host::{LocalizationLookup, SettingsStore, TopicLookup};
use crate::models::{BackupSettings, Language, LocalizedProperty, Topic, TOPIC_LOCALE_KEY_GROUP};

const TOPIC_SELECT: &str = "SELECT id, system_name, include_in_sitemap, include_in_top_menu,
        include_in_footer_column1, include_in_footer_column2, include_in_footer_column3,
        display_order, accessible_when_store_closed, is_password_protected, password,
        title, body, published, topic_template_id, meta_keywords, meta_description,
        meta_title, subject_to_acl, limited_to_stores
     FROM topic";

const SETTING_REPOSITORY: &str = "topicsgitsettings.repository";
const SETTING_NAME: &str = "topicsgitsettings.name";
const SETTING_EMAIL: &str = "topicsgitsettings.email";

fn row_to_topic(row: &Row<'_>) -> rusqlite::Result<Topic> {
    Ok(Topic {
        id: row.get(0)?,
        system_name: row.get(1)?,
        include_in_sitemap: row.get(2)?,
        include_in_top_menu: row.get(3)?,
        include_in_footer_column1: row.get(4)?,
        include_in_footer_column2: row.get(5)?,
        include_in_footer_column3: row.get(6)?,
        display_order: row.get(7)?,
        accessible_when_store_closed: row.get(8)?,
        is_password_protected: row.get(9)?,
        password: row.get(10)?,
        title: row.get(11)?,
        body: row.get(12)?,
        published: row.get(13)?,
        topic_template_id: row.get(14)?,
        meta_keywords: row.get(15)?,
        meta_description: row.get(16)?,
        meta_title: row.get(17)?,
        subject_to_acl: row.get(18)?,
        limited_to_stores: row.get(19)?,
    })
}

fn row_to_language(row: &Row<'_>) -> rusqlite::Result<Language> {
    Ok(Language {
        id: row.get(0)?,
        name: row.get(1)?,
        language_culture: row.get(2)?,
        published: row.get(3)?,
        display_order: row.get(4)?,
    })
}

// ---------------------------------------------------------------------------
// Query implementations
// ---------------------------------------------------------------------------

impl Database {
    // -- topic --------------------------------------------------------------

    /// Insert a topic and return its new id. `topic.id` is ignored.
    pub fn insert_topic(&self, topic: &Topic) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO topic (system_name, include_in_sitemap, include_in_top_menu,
                include_in_footer_column1, include_in_footer_column2, include_in_footer_column3,
                display_order, accessible_when_store_closed, is_password_protected, password,
                title, body, published, topic_template_id, meta_keywords, meta_description,
                meta_title, subject_to_acl, limited_to_stores)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
            params![
                topic.system_name,
                topic.include_in_sitemap,
                topic.include_in_top_menu,
                topic.include_in_footer_column1,
                topic.include_in_footer_column2,
                topic.include_in_footer_column3,
                topic.display_order,
                topic.accessible_when_store_closed,
                topic.is_password_protected,
                topic.password,
                topic.title,
                topic.body,
                topic.published,
                topic.topic_template_id,
                topic.meta_keywords,
                topic.meta_description,
                topic.meta_title,
                topic.subject_to_acl,
                topic.limited_to_stores,
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, system_name = %topic.system_name, "inserted topic");
        Ok(id)
    }

    /// Overwrite every column of the topic with `topic.id`.
    pub fn update_topic(&self, topic: &Topic) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE topic SET system_name = ?2, include_in_sitemap = ?3, include_in_top_menu = ?4,
                include_in_footer_column1 = ?5, include_in_footer_column2 = ?6,
                include_in_footer_column3 = ?7, display_order = ?8,
                accessible_when_store_closed = ?9, is_password_protected = ?10, password = ?11,
                title = ?12, body = ?13, published = ?14, topic_template_id = ?15,
                meta_keywords = ?16, meta_description = ?17, meta_title = ?18,
                subject_to_acl = ?19, limited_to_stores = ?20
             WHERE id = ?1",
            params![
                topic.id,
                topic.system_name,
                topic.include_in_sitemap,
                topic.include_in_top_menu,
                topic.include_in_footer_column1,
                topic.include_in_footer_column2,
                topic.include_in_footer_column3,
                topic.display_order,
                topic.accessible_when_store_closed,
                topic.is_password_protected,
                topic.password,
                topic.title,
                topic.body,
                topic.published,
                topic.topic_template_id,
                topic.meta_keywords,
                topic.meta_description,
                topic.meta_title,
                topic.subject_to_acl,
                topic.limited_to_stores,
            ],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "topic".into(),
                id: topic.id.to_string(),
            });
        }
        debug!(id = topic.id, "updated topic");
        Ok(())
    }

    /// Delete a topic together with its localized properties and store
    /// mappings.
    pub fn delete_topic(&self, id: i64) -> Result<(), DatabaseError> {
        self.transaction(|conn| {
            conn.execute(
                "DELETE FROM localized_property WHERE locale_key_group = ?1 AND entity_id = ?2",
                params![TOPIC_LOCALE_KEY_GROUP, id],
            )?;
            conn.execute(
                "DELETE FROM store_mapping WHERE entity_name = ?1 AND entity_id = ?2",
                params![TOPIC_LOCALE_KEY_GROUP, id],
            )?;
            let changed = conn.execute("DELETE FROM topic WHERE id = ?1", params![id])?;
            if changed == 0 {
                return Err(DatabaseError::NotFound {
                    entity: "topic".into(),
                    id: id.to_string(),
                });
            }
            Ok(())
        })?;
        debug!(id, "deleted topic");
        Ok(())
    }

    pub fn get_topic(&self, id: i64) -> Result<Option<Topic>, DatabaseError> {
        let conn = self.conn();
        let sql = format!("{} WHERE id = ?1", TOPIC_SELECT);
        Ok(conn.query_row(&sql, params![id], row_to_topic).optional()?)
    }

    pub fn get_topic_by_system_name(&self, system_name: &str) -> Result<Option<Topic>, DatabaseError> {
        let conn = self.conn();
        let sql = format!("{} WHERE system_name = ?1", TOPIC_SELECT);
        Ok(conn
            .query_row(&sql, params![system_name], row_to_topic)
            .optional()?)
    }

    /// List topics ordered by display order, then system name.
    ///
    /// Unpublished topics are skipped unless `show_hidden`. With a non-zero
    /// `store_id` and `include_all == false`, store-limited topics not mapped
    /// to that store are skipped.
    pub fn list_topics(
        &self,
        store_id: i64,
        show_hidden: bool,
        include_all: bool,
    ) -> Result<Vec<Topic>, DatabaseError> {
        let conn = self.conn();
        let sql = format!(
            "{} WHERE (?1 OR published = 1)
               AND (?2 OR ?3 = 0 OR limited_to_stores = 0
                    OR EXISTS (SELECT 1 FROM store_mapping sm
                               WHERE sm.entity_name = ?4 AND sm.entity_id = topic.id
                                 AND sm.store_id = ?3))
             ORDER BY display_order, system_name",
            TOPIC_SELECT
        );
        let mut stmt = conn.prepare(&sql)?;
        let topics = stmt
            .query_map(
                params![show_hidden, include_all, store_id, TOPIC_LOCALE_KEY_GROUP],
                row_to_topic,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(topics)
    }

    // -- store_mapping ------------------------------------------------------

    /// Make a store-limited topic visible in `store_id`.
    pub fn map_topic_to_store(&self, topic_id: i64, store_id: i64) -> Result<(), DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO store_mapping (entity_name, entity_id, store_id) VALUES (?1, ?2, ?3)",
            params![TOPIC_LOCALE_KEY_GROUP, topic_id, store_id],
        )?;
        Ok(())
    }

    // -- language -----------------------------------------------------------

    pub fn insert_language(
        &self,
        name: &str,
        language_culture: &str,
        published: bool,
        display_order: i32,
    ) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO language (name, language_culture, published, display_order)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, language_culture, published, display_order],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, name, "inserted language");
        Ok(id)
    }

    /// Every language, published or not, ordered by display order then id.
    pub fn list_languages(&self) -> Result<Vec<Language>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, language_culture, published, display_order
             FROM language ORDER BY display_order, id",
        )?;
        let languages = stmt
            .query_map([], row_to_language)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(languages)
    }

    // -- localized_property -------------------------------------------------

    pub fn get_localized_value(
        &self,
        language_id: i64,
        entity_id: i64,
        locale_key_group: &str,
        locale_key: &str,
    ) -> Result<Option<String>, DatabaseError> {
        let conn = self.conn();
        Ok(conn
            .query_row(
                "SELECT locale_value FROM localized_property
                 WHERE language_id = ?1 AND entity_id = ?2
                   AND locale_key_group = ?3 AND locale_key = ?4",
                params![language_id, entity_id, locale_key_group, locale_key],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Insert or update one override. Returns the row id and whether a new
    /// row was inserted.
    pub fn upsert_localized_property(
        &self,
        property: &LocalizedProperty,
    ) -> Result<(i64, bool), DatabaseError> {
        self.transaction(|conn| {
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT id FROM localized_property
                     WHERE entity_id = ?1 AND language_id = ?2
                       AND locale_key_group = ?3 AND locale_key = ?4",
                    params![
                        property.entity_id,
                        property.language_id,
                        property.locale_key_group,
                        property.locale_key
                    ],
                    |row| row.get(0),
                )
                .optional()?;
            match existing {
                Some(id) => {
                    conn.execute(
                        "UPDATE localized_property SET locale_value = ?2 WHERE id = ?1",
                        params![id, property.locale_value],
                    )?;
                    Ok((id, false))
                }
                None => {
                    conn.execute(
                        "INSERT INTO localized_property
                            (entity_id, language_id, locale_key_group, locale_key, locale_value)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            property.entity_id,
                            property.language_id,
                            property.locale_key_group,
                            property.locale_key,
                            property.locale_value
                        ],
                    )?;
                    Ok((conn.last_insert_rowid(), true))
                }
            }
        })
    }

    /// All overrides of one entity, ordered by language then key.
    pub fn list_localized_properties(
        &self,
        locale_key_group: &str,
        entity_id: i64,
    ) -> Result<Vec<LocalizedProperty>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, entity_id, language_id, locale_key_group, locale_key, locale_value
             FROM localized_property
             WHERE locale_key_group = ?1 AND entity_id = ?2
             ORDER BY language_id, locale_key",
        )?;
        let props = stmt
            .query_map(params![locale_key_group, entity_id], |row| {
                Ok(LocalizedProperty {
                    id: row.get(0)?,
                    entity_id: row.get(1)?,
                    language_id: row.get(2)?,
                    locale_key_group: row.get(3)?,
                    locale_key: row.get(4)?,
                    locale_value: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(props)
    }

    // -- setting ------------------------------------------------------------

    fn get_setting(&self, name: &str) -> Result<Option<String>, DatabaseError> {
        let conn = self.conn();
        Ok(conn
            .query_row(
                "SELECT value FROM setting WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Load the backup settings record, if any part of it was saved.
    pub fn load_backup_settings(&self) -> Result<Option<BackupSettings>, DatabaseError> {
        let repository = self.get_setting(SETTING_REPOSITORY)?;
        let name = self.get_setting(SETTING_NAME)?;
        let email = self.get_setting(SETTING_EMAIL)?;
        if repository.is_none() && name.is_none() && email.is_none() {
            return Ok(None);
        }
        Ok(Some(BackupSettings {
            repository: repository.unwrap_or_default(),
            name: name.unwrap_or_default(),
            email: email.unwrap_or_default(),
        }))
    }

    pub fn save_backup_settings(&self, settings: &BackupSettings) -> Result<(), DatabaseError> {
        self.transaction(|conn| {
            for (name, value) in [
                (SETTING_REPOSITORY, &settings.repository),
                (SETTING_NAME, &settings.name),
                (SETTING_EMAIL, &settings.email),
            ] {
                conn.execute(
                    "INSERT INTO setting (name, value) VALUES (?1, ?2)
                     ON CONFLICT(name) DO UPDATE SET value = excluded.value",
                    params![name, value],
                )?;
            }
            Ok(())
        })?;
        debug!(repository = %settings.repository, "saved backup settings");
        Ok(())
    }

    pub fn delete_backup_settings(&self) -> Result<(), DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM setting WHERE name IN (?1, ?2, ?3)",
            params![SETTING_REPOSITORY, SETTING_NAME, SETTING_EMAIL],
        )?;
        debug!("deleted backup settings");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

impl TopicLookup for Database {
    fn all_topics(
        &self,
        store_id: i64,
        show_hidden: bool,
        include_all: bool,
    ) -> Result<Vec<Topic>, LookupError> {
        Ok(self.list_topics(store_id, show_hidden, include_all)?)
    }

    fn topic_by_id(&self, id: i64) -> Result<Option<Topic>, LookupError> {
        Ok(self.get_topic(id)?)
    }
}

impl LocalizationLookup for Database {
    fn all_languages(&self) -> Result<Vec<Language>, LookupError> {
        Ok(self.list_languages()?)
    }

    fn localized_value(
        &self,
        language_id: i64,
        entity_id: i64,
        locale_key_group: &str,
        locale_key: &str,
    ) -> Result<Option<String>, LookupError> {
        Ok(self.get_localized_value(language_id, entity_id, locale_key_group, locale_key)?)
    }
}

impl SettingsStore for Database {
    fn load(&self) -> Result<Option<BackupSettings>, LookupError> {
        Ok(self.load_backup_settings()?)
    }

    fn save(&self, settings: &BackupSettings) -> Result<(), LookupError> {
        Ok(self.save_backup_settings(settings)?)
    }

    fn delete(&self) -> Result<(), LookupError> {
        Ok(self.delete_backup_settings()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LocalizedField;

    fn db() -> Database {
        let db = Database::in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[test]
    fn test_topic_round_trip_and_update() {
        let db = db();
        let mut topic = Topic {
            title: Some("About".into()),
            published: true,
            topic_template_id: 1,
            ..Topic::new("about-us")
        };
        topic.id = db.insert_topic(&topic).unwrap();
        assert_eq!(db.get_topic(topic.id).unwrap().as_ref(), Some(&topic));

        topic.body = Some("Hello".into());
        db.update_topic(&topic).unwrap();
        let loaded = db.get_topic_by_system_name("about-us").unwrap().unwrap();
        assert_eq!(loaded.body.as_deref(), Some("Hello"));

        assert!(matches!(
            db.update_topic(&Topic { id: 999, ..topic }),
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[test]
    fn test_list_topics_filters() {
        let db = db();
        let visible = Topic {
            published: true,
            display_order: 2,
            ..Topic::new("b-visible")
        };
        let hidden = Topic {
            published: false,
            display_order: 1,
            ..Topic::new("a-hidden")
        };
        let limited = Topic {
            published: true,
            limited_to_stores: true,
            display_order: 3,
            ..Topic::new("c-limited")
        };
        db.insert_topic(&visible).unwrap();
        db.insert_topic(&hidden).unwrap();
        let limited_id = db.insert_topic(&limited).unwrap();
        db.map_topic_to_store(limited_id, 5).unwrap();

        let names = |topics: Vec<Topic>| -> Vec<String> {
            topics.into_iter().map(|t| t.system_name).collect()
        };

        assert_eq!(
            names(db.list_topics(0, true, false).unwrap()),
            vec!["a-hidden", "b-visible", "c-limited"]
        );
        assert_eq!(
            names(db.list_topics(0, false, false).unwrap()),
            vec!["b-visible", "c-limited"]
        );
        assert_eq!(
            names(db.list_topics(7, false, false).unwrap()),
            vec!["b-visible"]
        );
        assert_eq!(
            names(db.list_topics(5, false, false).unwrap()),
            vec!["b-visible", "c-limited"]
        );
        assert_eq!(db.list_topics(7, true, true).unwrap().len(), 3);
    }

    #[test]
    fn test_localized_values() {
        let db = db();
        let fr = db.insert_language("French", "fr-FR", true, 2).unwrap();
        let de = db.insert_language("German", "de-DE", false, 1).unwrap();
        let topic_id = db.insert_topic(&Topic::new("faq")).unwrap();

        let langs: Vec<i64> = db.list_languages().unwrap().iter().map(|l| l.id).collect();
        assert_eq!(langs, vec![de, fr]);

        let prop = LocalizedProperty::for_topic(topic_id, fr, LocalizedField::Title, "Questions");
        let (id, inserted) = db.upsert_localized_property(&prop).unwrap();
        assert!(inserted);
        let (again, inserted) = db
            .upsert_localized_property(&LocalizedProperty {
                locale_value: "FAQ".into(),
                ..prop
            })
            .unwrap();
        assert_eq!(id, again);
        assert!(!inserted);

        assert_eq!(
            db.get_localized_value(fr, topic_id, "Topic", "Title").unwrap().as_deref(),
            Some("FAQ")
        );
        assert_eq!(db.get_localized_value(de, topic_id, "Topic", "Title").unwrap(), None);
        assert_eq!(db.list_localized_properties("Topic", topic_id).unwrap().len(), 1);

        db.delete_topic(topic_id).unwrap();
        assert!(db.list_localized_properties("Topic", topic_id).unwrap().is_empty());
        assert!(db.get_topic(topic_id).unwrap().is_none());
    }

    #[test]
    fn test_settings_store() {
        let db = db();
        assert_eq!(SettingsStore::load(&db).unwrap(), None);

        let settings = BackupSettings::for_user("/srv/topics", Some("admin"), "admin@example.com");
        SettingsStore::save(&db, &settings).unwrap();
        assert_eq!(SettingsStore::load(&db).unwrap(), Some(settings.clone()));

        let changed = BackupSettings {
            email: "ops@example.com".into(),
            ..settings
        };
        SettingsStore::save(&db, &changed).unwrap();
        assert_eq!(SettingsStore::load(&db).unwrap(), Some(changed));

        SettingsStore::delete(&db).unwrap();
        assert_eq!(SettingsStore::load(&db).unwrap(), None);
    }
}
