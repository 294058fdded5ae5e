//! smartmark CLI
//!
//! Manage bookmarking rules and run them against a URL from the terminal.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use smartmark::backup::{self, DEFAULT_BACKUP_FILE};
use smartmark::bookmarks::{Folder, ReconcileOutcome, folder_name, search_folders};
use smartmark::rules::MAX_PRIORITY;
use smartmark::settings::{self, Namespace, Toggle, keys};
use smartmark::shortcut::Shortcut;
use smartmark::tabs::CloseOutcome;
use smartmark::{
    BookmarkAction, BookmarkTree, Config, Execution, FolderCache, JsonStore,
    MemoryTabs, Rule, RuleEditor, RuleEngine, SettingsStore, Tab,
};

#[derive(Parser, Debug)]
#[command(name = "smartmark")]
#[command(author, version, about = "Rule-based automatic bookmarking")]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// List all rules and global toggles (default)
    List,

    /// Validate config file and stored rules
    Check {
        /// Path to config file to validate
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Evaluate rules for a URL (dry-run by default)
    Run {
        /// Page URL
        url: String,

        /// Page title used for new bookmarks
        #[arg(short, long, default_value = "")]
        title: String,

        /// Treat as a manual trigger
        #[arg(short, long)]
        manual: bool,

        /// Actually update bookmarks (not just dry-run)
        #[arg(long)]
        apply: bool,
    },

    /// Edit the rule list
    Rule {
        #[command(subcommand)]
        command: RuleCommand,
    },

    /// Revert the last rule edit
    Undo,

    /// Re-apply the last undone rule edit
    Redo,

    /// Set a global toggle
    Toggle {
        /// extension, auto-bookmark or auto-close-tab
        name: Toggle,

        /// on or off
        #[arg(value_parser = parse_on_off)]
        state: bool,
    },

    /// List bookmark folders
    Folders {
        /// Case-insensitive title filter
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Show or set the custom keyboard shortcut (e.g. Ctrl+Shift+B)
    Shortcut {
        /// New shortcut; an empty string clears it
        value: Option<String>,
    },

    /// Write all settings to a backup file
    Backup {
        /// Destination file
        file: Option<PathBuf>,
    },

    /// Replace all settings with a backup file
    Restore {
        /// Backup file to read
        file: PathBuf,
    },
}

#[derive(clap::Subcommand, Debug)]
enum RuleCommand {
    /// Append a rule
    Add {
        /// Domain to match (www. and scheme are ignored)
        #[arg(short, long)]
        domain: Option<String>,

        /// Literal substring the URL must contain
        #[arg(long)]
        contains: Option<String>,

        /// Priority, 0-100
        #[arg(short, long, default_value_t = 0)]
        priority: u8,

        /// Target folder, by id or title
        #[arg(short, long)]
        folder: Option<String>,

        /// doNothing, replace or duplicate
        #[arg(short, long, default_value = "doNothing")]
        action: BookmarkAction,

        /// Leave the rule disabled
        #[arg(long)]
        disabled: bool,

        /// Only run on manual triggers
        #[arg(long)]
        manual_only: bool,

        /// Close the tab after bookmarking
        #[arg(long)]
        close_tab: bool,
    },

    /// Delete a rule by number
    Remove { number: usize },

    /// Enable a rule by number
    Enable { number: usize },

    /// Disable a rule by number
    Disable { number: usize },
}

fn parse_on_off(s: &str) -> Result<bool, String> {
    match s {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => Err(format!("expected on or off, got '{}'", other)),
    }
}

struct Services {
    config: Config,
    store: Arc<JsonStore>,
    tree: Arc<BookmarkTree>,
}

impl Services {
    fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load(config_path)?;
        smartmark::notifications::init(config.general.notifications_enabled);

        let storage_path = config.storage_path()?;
        let bookmarks_path = config.bookmarks_path()?;
        let store = JsonStore::open(&storage_path)
            .with_context(|| format!("Failed to open settings at {}", storage_path.display()))?;
        let tree = BookmarkTree::open(&bookmarks_path).with_context(|| {
            format!("Failed to open bookmarks at {}", bookmarks_path.display())
        })?;
        Ok(Self {
            config,
            store: Arc::new(store),
            tree: Arc::new(tree),
        })
    }

    async fn editor(&self) -> Result<RuleEditor> {
        Ok(RuleEditor::load(self.store.clone()).await?)
    }

    async fn folders(&self) -> Arc<Vec<Folder>> {
        FolderCache::new().folders(self.tree.as_ref()).await
    }
}

/// Resolve a folder given by id or (case-insensitive) title
fn resolve_folder(folders: &[Folder], wanted: &str) -> Result<String> {
    if let Some(folder) = folders.iter().find(|f| f.id == wanted) {
        return Ok(folder.id.clone());
    }
    folders
        .iter()
        .find(|f| f.title.eq_ignore_ascii_case(wanted))
        .map(|f| f.id.clone())
        .with_context(|| format!("No bookmark folder named '{}'", wanted))
}

fn rule_index(number: usize) -> Result<usize> {
    match number.checked_sub(1) {
        Some(index) => Ok(index),
        None => bail!("Rule numbers start at 1"),
    }
}

async fn set_enabled(
    editor: &mut RuleEditor,
    number: usize,
    enabled: bool,
    folders: &[Folder],
) -> Result<()> {
    let index = rule_index(number)?;
    let mut rule = editor
        .rules()
        .await?
        .get(index)
        .cloned()
        .with_context(|| format!("No rule {}", number))?;
    rule.enabled = enabled;
    print_changes(&editor.update_rule(index, rule, folders).await?);
    Ok(())
}

fn print_changes(changes: &[String]) {
    if changes.is_empty() {
        println!("No changes");
    }
    for change in changes {
        println!("  {}", change);
    }
}

async fn print_execution(execution: Execution) {
    let Execution::Applied(applied) = execution else {
        println!("No rule applied");
        return;
    };

    println!("Rule {} applied: {}", applied.rule_index + 1, applied.rule);
    match applied.bookmark {
        ReconcileOutcome::Suppressed => println!("  Bookmarking is off"),
        ReconcileOutcome::Created(record) => {
            println!("  Created bookmark {} in folder {}", record.id, record.parent_id)
        }
        ReconcileOutcome::Updated { record, moved } => println!(
            "  Updated bookmark {}{}",
            record.id,
            if moved { " and moved it" } else { "" }
        ),
        ReconcileOutcome::AlreadyBookmarked(record) => {
            println!("  Already bookmarked as {}", record.id)
        }
        ReconcileOutcome::MoveFailed { record, error } => {
            println!("  Updated bookmark {} but could not move it: {}", record.id, error)
        }
        ReconcileOutcome::Failed(reason) => println!("  ✗ Bookmark failed: {}", reason),
    }

    let close = match applied.close {
        None => return,
        Some(CloseOutcome::RetryScheduled(handle)) => match handle.await {
            Ok(result) => result,
            Err(e) => {
                println!("  ✗ Close retry task failed: {}", e);
                return;
            }
        },
        Some(CloseOutcome::Closed) => Ok(()),
        Some(CloseOutcome::Failed(e)) => Err(e),
    };
    match close {
        Ok(()) => println!("  Tab closed"),
        Err(e) => println!("  ✗ Tab left open: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        Config::load(cli.config.as_deref())
            .map(|config| config.general.log_level)
            .unwrap_or_else(|_| "info".to_string())
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("SMARTMARK_LOG").unwrap_or(log_level),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        None | Some(Commands::List) => {
            let services = Services::load(cli.config.as_deref())?;
            let snapshot = settings::load_snapshot(services.store.as_ref()).await?;
            let folders = services.folders().await;
            let mark = |on: bool| if on { "on" } else { "off" };
            println!("Extension: {}", mark(snapshot.settings.extension_enabled));
            println!("Auto bookmark: {}", mark(snapshot.settings.auto_bookmark));
            println!("Auto close tab: {}", mark(snapshot.settings.auto_close_tab));
            println!("Rules:");
            for (i, rule) in snapshot.rules.iter().enumerate() {
                let Some(rule) = rule else {
                    println!("  ? [{}] unreadable rule, ignored", i + 1);
                    continue;
                };
                let status = if rule.enabled { "✓" } else { "✗" };
                let folder = match rule.bookmark_location.as_deref() {
                    Some(id) => folder_name(&folders, id).unwrap_or(id),
                    None => "Other bookmarks",
                };
                println!(
                    "  {} [{}] {} (priority {}, {} -> {}{}{})",
                    status,
                    i + 1,
                    rule,
                    rule.priority,
                    rule.bookmark_action.label(),
                    folder,
                    if rule.auto_execute { "" } else { ", manual only" },
                    if rule.close_tab { ", closes tab" } else { "" },
                );
            }
        }
        Some(Commands::Check {
            config: config_path,
        }) => {
            let path = config_path.or(cli.config);
            match Services::load(path.as_deref()) {
                Ok(services) => {
                    println!("✓ Config is valid");
                    println!("  Settings:  {}", services.config.storage_path()?.display());
                    println!("  Bookmarks: {}", services.config.bookmarks_path()?.display());
                    match settings::load_rules(services.store.as_ref()).await {
                        Ok(rules) => println!("  {} rules", rules.len()),
                        Err(e) => {
                            eprintln!("✗ Stored rules are invalid: {}", e);
                            std::process::exit(1);
                        }
                    }
                }
                Err(e) => {
                    eprintln!("✗ Config error: {:#}", e);
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::Run {
            url,
            title,
            manual,
            apply,
        }) => {
            let services = Services::load(cli.config.as_deref())?;
            let tabs = Arc::new(MemoryTabs::new());
            let engine = RuleEngine::new(
                services.store.clone(),
                services.tree.clone(),
                tabs.clone(),
                services.config.policy,
            )
            .with_retry_delay(services.config.close_retry_delay());

            if apply {
                let tab = Tab::new(0, url, title);
                tabs.upsert(tab.clone());
                print_execution(engine.execute(&tab, manual).await).await;
            } else {
                match engine.evaluate(&url, manual).await? {
                    Some((index, rule)) => {
                        println!("[dry-run] Rule {} would apply: {}", index + 1, rule)
                    }
                    None => println!("[dry-run] No rule matches {}", url),
                }
            }
        }
        Some(Commands::Rule { command }) => {
            let services = Services::load(cli.config.as_deref())?;
            let mut editor = services.editor().await?;
            let folders = services.folders().await;
            match command {
                RuleCommand::Add {
                    domain,
                    contains,
                    priority,
                    folder,
                    action,
                    disabled,
                    manual_only,
                    close_tab,
                } => {
                    let bookmark_location = match folder {
                        Some(wanted) => Some(resolve_folder(&folders, &wanted)?),
                        None => folders.first().map(|f| f.id.clone()),
                    };
                    let rule = Rule {
                        domain: domain.filter(|d| !d.is_empty()),
                        contains: contains.filter(|c| !c.is_empty()),
                        priority: priority.min(MAX_PRIORITY),
                        bookmark_location,
                        bookmark_action: action,
                        enabled: !disabled,
                        auto_execute: !manual_only,
                        close_tab,
                    };
                    if !rule.has_pattern() {
                        bail!("A rule needs --domain or --contains");
                    }
                    let index = editor.insert_rule(rule).await?;
                    println!("✓ Added rule {}", index + 1);
                }
                RuleCommand::Remove { number } => {
                    let rule = editor.delete_rule(rule_index(number)?).await?;
                    println!("✓ Removed rule {}: {}", number, rule);
                }
                RuleCommand::Enable { number } => {
                    set_enabled(&mut editor, number, true, &folders).await?
                }
                RuleCommand::Disable { number } => {
                    set_enabled(&mut editor, number, false, &folders).await?
                }
            }
        }
        Some(Commands::Undo) => {
            let services = Services::load(cli.config.as_deref())?;
            let mut editor = services.editor().await?;
            if editor.undo().await? {
                println!("✓ Undone");
            } else {
                println!("Nothing to undo");
            }
        }
        Some(Commands::Redo) => {
            let services = Services::load(cli.config.as_deref())?;
            let mut editor = services.editor().await?;
            if editor.redo().await? {
                println!("✓ Redone");
            } else {
                println!("Nothing to redo");
            }
        }
        Some(Commands::Toggle { name, state }) => {
            let services = Services::load(cli.config.as_deref())?;
            settings::set_toggle(services.store.as_ref(), name, state).await?;
            println!(
                "{} {}",
                name.label(),
                if state { "Enabled" } else { "Disabled" }
            );
        }
        Some(Commands::Folders { search }) => {
            let services = Services::load(cli.config.as_deref())?;
            let folders = services.folders().await;
            let shown: Vec<&Folder> = match &search {
                Some(term) => search_folders(&folders, term),
                None => folders.iter().collect(),
            };
            for folder in shown {
                println!("  {:>6}  {}", folder.id, folder.title);
            }
        }
        Some(Commands::Shortcut { value }) => {
            let services = Services::load(cli.config.as_deref())?;
            match value {
                None => match settings::load_shortcut(services.store.as_ref()).await? {
                    Some(shortcut) => println!("{}", shortcut),
                    None => println!("No custom shortcut set"),
                },
                Some(value) => {
                    let stored = if value.trim().is_empty() {
                        String::new()
                    } else {
                        value.parse::<Shortcut>()?.to_string()
                    };
                    let mut items = Namespace::new();
                    items.insert(
                        keys::CUSTOM_SHORTCUT.to_string(),
                        serde_json::Value::String(stored.clone()),
                    );
                    services.store.set(items).await?;
                    if stored.is_empty() {
                        println!("✓ Shortcut cleared");
                    } else {
                        println!("✓ Shortcut set to {}", stored);
                    }
                }
            }
        }
        Some(Commands::Backup { file }) => {
            let services = Services::load(cli.config.as_deref())?;
            let file = file.unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_FILE));
            backup::backup_to_file(services.store.as_ref(), &file).await?;
            println!("✓ Backup written to {}", file.display());
        }
        Some(Commands::Restore { file }) => {
            let services = Services::load(cli.config.as_deref())?;
            let count = backup::restore_from_file(services.store.as_ref(), &file).await?;
            println!("✓ Restored {} settings from {}", count, file.display());
        }
    }

    Ok(())
}
