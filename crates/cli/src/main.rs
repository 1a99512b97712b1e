//! TopicsGit command-line admin tool.
//!
//! Installs and configures the backup repository, edits topics and
//! translations in the host store (publishing the same events the host
//! would), runs a full resync, and reports status.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use topicsgit_core::config::AppConfig;
use topicsgit_core::db::{Database, LocalizedPropertyWriter};
use topicsgit_core::events::{TopicEvent, TopicEventListener, TopicResaveObserver};
use topicsgit_core::git::GitClient;
use topicsgit_core::host::{SettingsStore, TopicLookup};
use topicsgit_core::models::{
    BackupSettings, LocalizedField, LocalizedProperty, Topic, TOPIC_LOCALE_KEY_GROUP,
};
use topicsgit_core::BackupCoordinator;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// TopicsGit command-line admin tool.
#[derive(Parser, Debug)]
#[command(
    name = "topicsgit",
    version,
    about = "Back up content topics into a local git repository"
)]
struct Cli {
    /// Path to the TOML configuration file.
    /// Defaults to `<config dir>/topicsgit/config.toml` when present.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a default configuration file.
    InitConfig {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./topicsgit.toml")]
        output: PathBuf,
    },

    /// Create the backup repository and save the backup settings.
    Install {
        /// Repository directory; must not exist yet.
        #[arg(long)]
        repository: Option<PathBuf>,

        /// Committer name. Defaults to the email.
        #[arg(long)]
        name: Option<String>,

        /// Committer email.
        #[arg(long)]
        email: String,
    },

    /// Delete the backup repository and the backup settings.
    Uninstall,

    /// Change the repository path or committer identity.
    Configure {
        #[arg(long)]
        repository: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        email: String,
    },

    /// Rewrite every topic's backup file and commit once.
    BackupAll,

    /// Edit topics in the host store.
    Topic {
        #[command(subcommand)]
        action: TopicAction,
    },

    /// Manage host languages.
    Language {
        #[command(subcommand)]
        action: LanguageAction,
    },

    /// Show backup settings, repository state, and topics.
    Status {
        /// Number of recent commits to show.
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
enum TopicAction {
    /// Insert or update a topic from a JSON file, keyed by system name.
    Put {
        /// JSON object with the topic's fields.
        file: PathBuf,
    },
    /// Delete a topic.
    Remove {
        system_name: String,
    },
    /// Show a topic's fields and translations.
    Show {
        system_name: String,
    },
    /// Make a store-limited topic visible in a store.
    MapStore {
        system_name: String,

        #[arg(long)]
        store: i64,
    },
    /// Set a per-language Title or Body override.
    Localize {
        system_name: String,

        #[arg(long)]
        language: i64,

        /// Title or Body.
        #[arg(long)]
        field: String,

        #[arg(long)]
        value: String,
    },
}

#[derive(Subcommand, Debug)]
enum LanguageAction {
    /// Register a language.
    Add {
        #[arg(long)]
        name: String,

        /// Culture code, e.g. fr-FR.
        #[arg(long)]
        culture: String,

        #[arg(long, default_value = "0")]
        display_order: i32,

        /// Register the language as unpublished.
        #[arg(long)]
        unpublished: bool,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            init_logging("warn");
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.general.log_level);

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Commands, config: AppConfig) -> Result<()> {
    if let Commands::InitConfig { output } = command {
        return cmd_init_config(&output);
    }

    let app = App::open(&config)?;
    match command {
        Commands::InitConfig { .. } => unreachable!(),
        Commands::Install {
            repository,
            name,
            email,
        } => {
            let repository = repository.unwrap_or_else(|| config.default_repository());
            cmd_install(&app, &repository, name.as_deref(), &email)
        }
        Commands::Uninstall => cmd_uninstall(&app),
        Commands::Configure {
            repository,
            name,
            email,
        } => cmd_configure(&app, repository, name, email),
        Commands::BackupAll => cmd_backup_all(&app),
        Commands::Topic { action } => cmd_topic(&app, action).await,
        Commands::Language { action } => cmd_language(&app, action),
        Commands::Status { limit } => cmd_status(&app, limit),
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("topicsgit").join("config.toml"))
}

/// An explicit `--config` must exist; the default location is optional.
fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_config_path().filter(|p| p.exists()) {
            Some(path) => path,
            None => return Ok(AppConfig::default()),
        },
    };
    AppConfig::load_and_validate(&path)
        .with_context(|| format!("failed to load configuration {}", path.display()))
}

/// The host store and the coordinator wired over it.
struct App {
    db: Arc<Database>,
    coordinator: Arc<BackupCoordinator>,
}

impl App {
    fn open(config: &AppConfig) -> Result<Self> {
        let db_path = config.database_path();
        let db = Database::new(&db_path)
            .with_context(|| format!("failed to open host store {}", db_path.display()))?;
        db.initialize().context("failed to initialize host store")?;
        let db = Arc::new(db);
        let coordinator = BackupCoordinator::new(db.clone(), db.clone(), db.clone())
            .with_store_id(config.host.store_id);
        Ok(Self {
            db,
            coordinator: Arc::new(coordinator),
        })
    }

    fn find_topic(&self, system_name: &str) -> Result<Topic> {
        self.db
            .get_topic_by_system_name(system_name)
            .context("failed to look up topic")?
            .ok_or_else(|| anyhow::anyhow!("topic '{}' not found", system_name))
    }

    /// Deliver one event through the listener, as the host's event bus would.
    async fn publish(&self, event: TopicEvent) -> Result<()> {
        let listener = TopicEventListener::new(self.coordinator.clone());
        let (tx, rx) = mpsc::channel(1);
        tx.send(event)
            .await
            .context("event listener is not running")?;
        drop(tx);
        listener.run(rx).await;

        if listener.stats().failed.load(Ordering::SeqCst) > 0 {
            anyhow::bail!("host store updated, but the topic backup failed (see log)");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init_config(output: &Path) -> Result<()> {
    let default_config = r#"# TopicsGit Configuration

[general]
# trace, debug, info, warn, error
log_level = "info"
data_dir = "/var/lib/topicsgit"

[host]
# SQLite host store. Defaults to <data_dir>/host.db.
# database = "/var/lib/topicsgit/host.db"
# Store whose topics are backed up by backup-all; 0 means every store.
store_id = 0

[install]
# Repository created by `topicsgit install` when --repository is omitted.
# Defaults to <data_dir>/TopicsBackup.
# default_repository = "/var/lib/topicsgit/TopicsBackup"
"#;

    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, default_config).context("failed to write config file")?;

    println!("Default configuration written to {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit the data directory and store id");
    println!(
        "  2. Install: topicsgit --config {} install --email you@example.com",
        output.display()
    );
    Ok(())
}

fn cmd_install(app: &App, repository: &Path, name: Option<&str>, email: &str) -> Result<()> {
    let settings = BackupSettings::for_user(repository.display().to_string(), name, email);
    let existed = repository.exists();

    let result = app
        .coordinator
        .install(&settings)
        .context("failed to install backup repository")
        .and_then(|()| {
            SettingsStore::save(app.db.as_ref(), &settings).context("failed to save settings")
        });

    if let Err(e) = result {
        // Never roll back over a directory this run did not create.
        if !existed {
            warn!(error = %e, "install failed, rolling back");
            if let Err(rollback) = app.coordinator.uninstall(&settings) {
                warn!(error = %rollback, "rollback failed");
            }
            if let Err(rollback) = SettingsStore::delete(app.db.as_ref()) {
                warn!(error = %rollback, "failed to clear settings during rollback");
            }
        }
        return Err(e);
    }

    println!("Backup repository created at {}", settings.repository);
    println!("  Committer: {} <{}>", settings.name, settings.email);
    Ok(())
}

fn cmd_uninstall(app: &App) -> Result<()> {
    let Some(settings) = SettingsStore::load(app.db.as_ref()).context("failed to load settings")?
    else {
        println!("Nothing installed.");
        return Ok(());
    };

    app.coordinator
        .uninstall(&settings)
        .context("failed to remove backup repository")?;
    SettingsStore::delete(app.db.as_ref()).context("failed to delete settings")?;

    println!("Removed backup repository {}", settings.repository);
    Ok(())
}

fn cmd_configure(app: &App, repository: String, name: String, email: String) -> Result<()> {
    let settings = BackupSettings {
        repository,
        name,
        email,
    };
    settings.validate()?;
    SettingsStore::save(app.db.as_ref(), &settings).context("failed to save settings")?;
    app.coordinator
        .update_user_info(&settings)
        .context("failed to update repository identity")?;

    println!("Settings saved.");
    Ok(())
}

fn cmd_backup_all(app: &App) -> Result<()> {
    let summary = app.coordinator.backup_all().context("full backup failed")?;
    match summary.outcome {
        topicsgit_core::BackupOutcome::Committed { sha } => {
            println!("Backed up {} topic(s) in {}", summary.topics_written, short_sha(&sha));
        }
        _ => println!(
            "Backed up {} topic(s); repository already up to date",
            summary.topics_written
        ),
    }
    Ok(())
}

async fn cmd_topic(app: &App, action: TopicAction) -> Result<()> {
    match action {
        TopicAction::Put { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let mut topic: Topic = serde_json::from_str(&raw)
                .with_context(|| format!("invalid topic JSON in {}", file.display()))?;

            let existing = app
                .db
                .get_topic_by_system_name(&topic.system_name)
                .context("failed to look up topic")?;
            let event = match existing {
                Some(current) => {
                    topic.id = current.id;
                    app.db.update_topic(&topic).context("failed to update topic")?;
                    TopicEvent::Updated(topic)
                }
                None => {
                    topic.id = app.db.insert_topic(&topic).context("failed to insert topic")?;
                    TopicEvent::Inserted(topic)
                }
            };
            info!(kind = event.kind(), system_name = %event.topic().system_name, "topic stored");
            let name = event.topic().system_name.clone();
            let kind = event.kind();
            app.publish(event).await?;
            println!("Topic {} {}", name, kind);
            Ok(())
        }

        TopicAction::Remove { system_name } => {
            let topic = app.find_topic(&system_name)?;
            app.db.delete_topic(topic.id).context("failed to delete topic")?;
            app.publish(TopicEvent::Deleted(topic)).await?;
            println!("Topic {} deleted", system_name);
            Ok(())
        }

        TopicAction::Show { system_name } => {
            let topic = app.find_topic(&system_name)?;
            let translations = app
                .db
                .list_localized_properties(TOPIC_LOCALE_KEY_GROUP, topic.id)
                .context("failed to list translations")?;
            print_topic(&topic, &translations);
            Ok(())
        }

        TopicAction::MapStore { system_name, store } => {
            if store <= 0 {
                anyhow::bail!("store id must be positive, got {}", store);
            }
            let topic = app.find_topic(&system_name)?;
            app.db
                .map_topic_to_store(topic.id, store)
                .context("failed to map topic to store")?;
            if !topic.limited_to_stores {
                warn!(system_name = %system_name, "topic is not limited to stores; mapping has no effect yet");
            }
            println!("Topic {} mapped to store {}", system_name, store);
            Ok(())
        }

        TopicAction::Localize {
            system_name,
            language,
            field,
            value,
        } => {
            let field = LocalizedField::from_key(&field)
                .ok_or_else(|| anyhow::anyhow!("invalid field '{}': use Title or Body", field))?;
            let topic = app.find_topic(&system_name)?;

            let topics: Arc<dyn TopicLookup> = app.db.clone();
            let observer = TopicResaveObserver::new(topics, app.coordinator.clone());
            let writer = LocalizedPropertyWriter::new(app.db.clone()).with_observer(Arc::new(observer));
            writer
                .write(&LocalizedProperty::for_topic(topic.id, language, field, value))
                .context("failed to write localized value")?;

            println!("{} of {} set for language {}", field, system_name, language);
            Ok(())
        }
    }
}

fn cmd_language(app: &App, action: LanguageAction) -> Result<()> {
    match action {
        LanguageAction::Add {
            name,
            culture,
            display_order,
            unpublished,
        } => {
            let id = app
                .db
                .insert_language(&name, &culture, !unpublished, display_order)
                .context("failed to add language")?;
            println!("Language {} ({}) added with id {}", name, culture, id);
            Ok(())
        }
    }
}

fn cmd_status(app: &App, limit: usize) -> Result<()> {
    println!("TopicsGit Status");
    println!("================");
    println!();

    let Some(settings) = SettingsStore::load(app.db.as_ref()).context("failed to load settings")?
    else {
        println!("  Not installed. Run `topicsgit install --email <email>`.");
        return Ok(());
    };

    println!("  Repository : {}", settings.repository);
    println!("  Committer  : {} <{}>", settings.name, settings.email);

    match GitClient::new(settings.repository_path()) {
        Ok(git) => {
            let head = git.head_sha().context("failed to read HEAD")?;
            println!(
                "  HEAD       : {}",
                head.as_deref().map(short_sha).unwrap_or("none")
            );
            println!("  Commits    : {}", git.commit_count().context("failed to count commits")?);
            println!(
                "  Working tree: {}",
                if git.is_dirty().context("failed to read status")? {
                    "dirty"
                } else {
                    "clean"
                }
            );

            let commits = git.recent_commits(limit).context("failed to read history")?;
            if !commits.is_empty() {
                println!();
                for c in &commits {
                    println!("  {} {}", short_sha(&c.sha), c.message.lines().next().unwrap_or(""));
                }
            }
        }
        Err(e) => println!("  Repository unavailable: {}", e),
    }

    let topics = app
        .coordinator
        .topics()
        .all_topics(0, true, true)
        .context("failed to list topics")?;
    println!();
    if topics.is_empty() {
        println!("No topics in the host store.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Id", "System name", "Title", "Published", "Backup"]);

    for topic in &topics {
        let backed_up = app
            .coordinator
            .backup_file_path(topic)
            .map(|path| path.exists())
            .unwrap_or(false);
        let backup_cell = if backed_up {
            Cell::new("✓ saved").fg(Color::Green)
        } else {
            Cell::new("✗ missing").fg(Color::Red)
        };
        table.add_row(vec![
            Cell::new(topic.id),
            Cell::new(&topic.system_name),
            Cell::new(truncate(topic.title.as_deref().unwrap_or(""), 40)),
            Cell::new(if topic.published { "yes" } else { "no" }),
            backup_cell,
        ]);
    }

    println!("{}", table);
    println!("{} topic(s)", topics.len());
    Ok(())
}

fn print_topic(topic: &Topic, translations: &[LocalizedProperty]) {
    println!("Topic: {}", topic.system_name);
    println!("======={}", "=".repeat(topic.system_name.len()));
    println!();
    println!("  Id            : {}", topic.id);
    println!("  Title         : {}", topic.title.as_deref().unwrap_or("-"));
    println!("  Published     : {}", if topic.published { "yes" } else { "no" });
    println!("  Display order : {}", topic.display_order);
    println!("  Template      : {}", topic.topic_template_id);
    println!(
        "  Store limited : {}",
        if topic.limited_to_stores { "yes" } else { "no" }
    );

    println!();
    if translations.is_empty() {
        println!("No translations.");
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Language", "Field", "Value"]);
    for t in translations {
        table.add_row(vec![
            Cell::new(t.language_id),
            Cell::new(&t.locale_key),
            Cell::new(truncate(&t.locale_value, 60)),
        ]);
    }
    println!("{}", table);
}

// ---------------------------------------------------------------------------
// Utilities
// ---------------------------------------------------------------------------

fn short_sha(sha: &str) -> &str {
    &sha[..sha.len().min(8)]
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
