//! Canonical document rendering for topics.
//!
//! A topic and its localized overrides are rendered as one conditional upsert
//! script keyed by `SystemName`. The script is modelled as column/value lists
//! and every literal goes through [`SqlValue::literal`], so escaping is applied
//! in exactly one place. Rendering is deterministic: the same topic and
//! localized state always produce byte-identical output.

use tracing::debug;

use crate::errors::LookupError;
use crate::host::LocalizationLookup;
use crate::models::{LocalizedField, Topic, TOPIC_LOCALE_KEY_GROUP};

const TOPIC_TABLE: &str = "Topic";
const LOCALIZED_TABLE: &str = "LocalizedProperty";
const KEY_COLUMN: &str = "SystemName";
const TOPIC_ID_VAR: &str = "@TopicId";
const INDENT: &str = "    ";

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A value embedded in the rendered script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    /// Text; `None` renders as an empty literal.
    Text(Option<String>),
    Bool(bool),
    Int(i64),
    /// A script variable such as `@TopicId`, emitted verbatim.
    Variable(&'static str),
}

impl SqlValue {
    fn text(value: &Option<String>) -> Self {
        Self::Text(value.clone())
    }

    fn str(value: &str) -> Self {
        Self::Text(Some(value.to_string()))
    }

    /// Format the value as it appears in the script.
    pub fn literal(&self) -> String {
        match self {
            Self::Text(text) => quote(text.as_deref().unwrap_or("")),
            Self::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Self::Int(n) => n.to_string(),
            Self::Variable(name) => (*name).to_string(),
        }
    }
}

/// Wrap `s` in single quotes, doubling any embedded single quote.
pub fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

type Columns = Vec<(&'static str, SqlValue)>;

/// The topic's columns, excluding the key, in document order.
///
/// Both branches of the script read this list so that the update and insert
/// variants never drift apart.
fn topic_columns(topic: &Topic) -> Columns {
    vec![
        ("IncludeInSitemap", SqlValue::Bool(topic.include_in_sitemap)),
        ("IncludeInTopMenu", SqlValue::Bool(topic.include_in_top_menu)),
        ("IncludeInFooterColumn1", SqlValue::Bool(topic.include_in_footer_column1)),
        ("IncludeInFooterColumn2", SqlValue::Bool(topic.include_in_footer_column2)),
        ("IncludeInFooterColumn3", SqlValue::Bool(topic.include_in_footer_column3)),
        ("DisplayOrder", SqlValue::Int(topic.display_order.into())),
        ("AccessibleWhenStoreClosed", SqlValue::Bool(topic.accessible_when_store_closed)),
        ("IsPasswordProtected", SqlValue::Bool(topic.is_password_protected)),
        ("Password", SqlValue::text(&topic.password)),
        ("Title", SqlValue::text(&topic.title)),
        ("Body", SqlValue::text(&topic.body)),
        ("Published", SqlValue::Bool(topic.published)),
        ("TopicTemplateId", SqlValue::Int(topic.topic_template_id.into())),
        ("MetaKeywords", SqlValue::text(&topic.meta_keywords)),
        ("MetaDescription", SqlValue::text(&topic.meta_description)),
        ("MetaTitle", SqlValue::text(&topic.meta_title)),
        ("SubjectToAcl", SqlValue::Bool(topic.subject_to_acl)),
        ("LimitedToStores", SqlValue::Bool(topic.limited_to_stores)),
    ]
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// The rendered file content for one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document(String);

impl Document {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One language's override of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalizedOverride {
    pub language_id: i64,
    pub field: LocalizedField,
    pub value: String,
}

impl LocalizedOverride {
    fn key_columns(&self) -> Columns {
        vec![
            ("EntityId", SqlValue::Variable(TOPIC_ID_VAR)),
            ("LanguageId", SqlValue::Int(self.language_id)),
            ("LocaleKeyGroup", SqlValue::str(TOPIC_LOCALE_KEY_GROUP)),
            ("LocaleKey", SqlValue::str(self.field.key())),
        ]
    }

    fn insert_statement(&self) -> String {
        let mut columns = self.key_columns();
        columns.push(("LocaleValue", SqlValue::str(&self.value)));
        insert_into(LOCALIZED_TABLE, &columns)
    }
}

// ---------------------------------------------------------------------------
// Serializer
// ---------------------------------------------------------------------------

/// Renders topics using the injected localization collaborator.
pub struct TopicSerializer<'a> {
    localization: &'a dyn LocalizationLookup,
}

impl<'a> TopicSerializer<'a> {
    pub fn new(localization: &'a dyn LocalizationLookup) -> Self {
        Self { localization }
    }

    /// Render the canonical document for `topic`.
    ///
    /// Collaborator failures propagate before any text is produced.
    pub fn render(&self, topic: &Topic) -> Result<Document, LookupError> {
        let overrides = self.collect_overrides(topic)?;
        debug!(
            system_name = %topic.system_name,
            overrides = overrides.len(),
            "rendering topic document"
        );
        Ok(render_document(topic, &overrides))
    }

    /// Every non-empty override, per language in lookup order, Title then Body.
    pub fn collect_overrides(&self, topic: &Topic) -> Result<Vec<LocalizedOverride>, LookupError> {
        let mut overrides = Vec::new();
        for language in self.localization.all_languages()? {
            for field in LocalizedField::ALL {
                let value = self.localization.localized_value(
                    language.id,
                    topic.id,
                    TOPIC_LOCALE_KEY_GROUP,
                    field.key(),
                )?;
                if let Some(value) = value.filter(|v| !v.is_empty()) {
                    overrides.push(LocalizedOverride {
                        language_id: language.id,
                        field,
                        value,
                    });
                }
            }
        }
        Ok(overrides)
    }
}

/// Assemble the script from an already-resolved topic and its overrides.
pub fn render_document(topic: &Topic, overrides: &[LocalizedOverride]) -> Document {
    let key = SqlValue::str(&topic.system_name);
    let key_filter = format!("[{}] = {}", KEY_COLUMN, key.literal());
    let columns = topic_columns(topic);
    let mut lines: Vec<String> = Vec::new();

    if !overrides.is_empty() {
        lines.push(format!("DECLARE {} int", TOPIC_ID_VAR));
        lines.push(String::new());
    }

    // Update branch.
    lines.push(format!(
        "IF EXISTS (SELECT 1 FROM [{}] WHERE {})",
        TOPIC_TABLE, key_filter
    ));
    lines.push("BEGIN".into());
    lines.push(format!("{}UPDATE [{}] SET", INDENT, TOPIC_TABLE));
    let last = columns.len().saturating_sub(1);
    for (i, (name, value)) in columns.iter().enumerate() {
        let sep = if i == last { "" } else { "," };
        lines.push(format!("{0}{0}[{1}] = {2}{3}", INDENT, name, value.literal(), sep));
    }
    lines.push(format!("{}WHERE {}", INDENT, key_filter));
    if !overrides.is_empty() {
        lines.push(String::new());
        lines.push(format!(
            "{}SELECT {} = [Id] FROM [{}] WHERE {}",
            INDENT, TOPIC_ID_VAR, TOPIC_TABLE, key_filter
        ));
        for o in overrides {
            let filter = where_clause(&o.key_columns());
            lines.push(String::new());
            lines.push(format!(
                "{}IF EXISTS (SELECT 1 FROM [{}] WHERE {})",
                INDENT, LOCALIZED_TABLE, filter
            ));
            lines.push(format!(
                "{0}{0}UPDATE [{1}] SET [LocaleValue] = {2} WHERE {3}",
                INDENT,
                LOCALIZED_TABLE,
                SqlValue::str(&o.value).literal(),
                filter
            ));
            lines.push(format!("{}ELSE", INDENT));
            lines.push(format!("{0}{0}{1}", INDENT, o.insert_statement()));
        }
    }
    lines.push("END".into());

    // Insert branch.
    lines.push("ELSE".into());
    lines.push("BEGIN".into());
    let mut insert_columns = vec![(KEY_COLUMN, key.clone())];
    insert_columns.extend(columns);
    lines.push(format!("{}{}", INDENT, insert_into(TOPIC_TABLE, &insert_columns)));
    if !overrides.is_empty() {
        lines.push(String::new());
        lines.push(format!("{}SET {} = SCOPE_IDENTITY()", INDENT, TOPIC_ID_VAR));
        lines.push(String::new());
        for o in overrides {
            lines.push(format!("{}{}", INDENT, o.insert_statement()));
        }
    }
    lines.push("END".into());

    let mut text = lines.join("\n");
    text.push('\n');
    Document(text)
}

fn insert_into(table: &str, columns: &[(&'static str, SqlValue)]) -> String {
    let names: Vec<String> = columns.iter().map(|(n, _)| format!("[{}]", n)).collect();
    let values: Vec<String> = columns.iter().map(|(_, v)| v.literal()).collect();
    format!(
        "INSERT INTO [{}] ({}) VALUES ({})",
        table,
        names.join(", "),
        values.join(", ")
    )
}

fn where_clause(columns: &[(&'static str, SqlValue)]) -> String {
    columns
        .iter()
        .map(|(n, v)| format!("[{}] = {}", n, v.literal()))
        .collect::<Vec<_>>()
        .join(" AND ")
}
