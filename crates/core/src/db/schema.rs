//! Host store schema definitions and migration runner.
//!
//! Migrations are simple SQL strings applied in order. The `user_version`
//! pragma tracks which migrations have already been applied.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::DatabaseError;

/// All migrations, in order. Each entry is `(version, description, sql)`.
static MIGRATIONS: &[(u32, &str, &str)] = &[
    (
        1,
        "initial schema",
        r#"
        CREATE TABLE IF NOT EXISTS topic (
            id                            INTEGER PRIMARY KEY AUTOINCREMENT,
            system_name                   TEXT    NOT NULL UNIQUE,
            include_in_sitemap            INTEGER NOT NULL DEFAULT 0,
            include_in_top_menu           INTEGER NOT NULL DEFAULT 0,
            include_in_footer_column1     INTEGER NOT NULL DEFAULT 0,
            include_in_footer_column2     INTEGER NOT NULL DEFAULT 0,
            include_in_footer_column3     INTEGER NOT NULL DEFAULT 0,
            display_order                 INTEGER NOT NULL DEFAULT 0,
            accessible_when_store_closed  INTEGER NOT NULL DEFAULT 0,
            is_password_protected         INTEGER NOT NULL DEFAULT 0,
            password                      TEXT,
            title                         TEXT,
            body                          TEXT,
            published                     INTEGER NOT NULL DEFAULT 1,
            topic_template_id             INTEGER NOT NULL DEFAULT 1,
            meta_keywords                 TEXT,
            meta_description              TEXT,
            meta_title                    TEXT,
            subject_to_acl                INTEGER NOT NULL DEFAULT 0,
            limited_to_stores             INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS language (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            name              TEXT    NOT NULL,
            language_culture  TEXT    NOT NULL,
            published         INTEGER NOT NULL DEFAULT 1,
            display_order     INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS localized_property (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_id         INTEGER NOT NULL,
            language_id       INTEGER NOT NULL REFERENCES language (id) ON DELETE CASCADE,
            locale_key_group  TEXT    NOT NULL,
            locale_key        TEXT    NOT NULL,
            locale_value      TEXT    NOT NULL,
            UNIQUE (entity_id, language_id, locale_key_group, locale_key)
        );

        CREATE INDEX IF NOT EXISTS idx_localized_property_entity
            ON localized_property (locale_key_group, entity_id);

        CREATE TABLE IF NOT EXISTS store_mapping (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_name  TEXT    NOT NULL,
            entity_id    INTEGER NOT NULL,
            store_id     INTEGER NOT NULL,
            UNIQUE (entity_name, entity_id, store_id)
        );

        CREATE TABLE IF NOT EXISTS setting (
            name   TEXT PRIMARY KEY,
            value  TEXT NOT NULL
        );
        "#,
    ),
];

/// Run all pending migrations against `conn`.
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_schema_version(conn)?;
    info!(
        current_version,
        target_version = MIGRATIONS.last().map(|m| m.0).unwrap_or(0),
        "checking database migrations"
    );

    for &(version, description, sql) in MIGRATIONS {
        if version > current_version {
            info!(version, description, "applying migration");
            conn.execute_batch(sql)
                .map_err(|e| DatabaseError::MigrationFailed {
                    version,
                    detail: e.to_string(),
                })?;
            set_schema_version(conn, version)?;
            debug!(version, "migration applied successfully");
        }
    }

    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: u32) -> Result<(), DatabaseError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}
