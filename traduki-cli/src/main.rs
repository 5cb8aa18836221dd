//! Traduki CLI
//!
//! Exports content trees for translation and imports the translated files.

mod memory;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use traduki_core::{ContentStore, DEFAULT_PRESET, Fixture, Settings, SqliteStore, load_fixture};
use traduki_nodes::{ExportOptions, ExportService, ImportService, TradukiError};

#[derive(Parser, Debug)]
#[command(name = "traduki")]
#[command(author = "Traduki Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Export content trees for translation and import the translations", long_about = None)]
struct Cli {
    /// Settings file
    #[arg(long, default_value = "traduki.toml")]
    settings: PathBuf,

    /// SQLite content store
    #[arg(long, default_value = "Data/Traduki/content.db")]
    store: PathBuf,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the content store and a default settings file
    Init,

    /// Load workspaces, sites and nodes from a JSON fixture
    LoadFixture {
        file: PathBuf,
    },

    /// Export a content tree to XML
    Export {
        /// Node identifier or path relative to /sites
        #[arg(short = 'p', long)]
        starting_point: String,

        /// Defaults to the configured source language
        #[arg(short, long)]
        source_language: Option<String>,

        #[arg(short, long)]
        target_language: Option<String>,

        /// Output file, relative to the export directory
        #[arg(short, long)]
        filename: Option<PathBuf>,

        /// Only nodes changed at or after this time (RFC 3339 or YYYY-MM-DD)
        #[arg(short, long)]
        modified_after: Option<String>,

        /// Export hidden nodes too
        #[arg(long)]
        include_hidden: bool,

        #[arg(long, default_value = DEFAULT_PRESET)]
        document_filter: String,

        #[arg(long, default_value = DEFAULT_PRESET)]
        content_filter: String,
    },

    /// Import a translated XML file
    Import {
        /// Input file, relative to the import directory
        #[arg(short, long)]
        filename: PathBuf,

        /// Defaults to the target language named in the file
        #[arg(short, long)]
        target_language: Option<String>,

        /// Defaults to the workspace the file was exported from
        #[arg(short, long)]
        workspace: Option<String>,
    },
}

impl Commands {
    fn reports_memory(&self) -> bool {
        matches!(self, Commands::Export { .. } | Commands::Import { .. })
    }
}

fn init_tracing(debug: bool) {
    let env_filter = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();
}

fn open_store(path: &Path) -> Result<Arc<dyn ContentStore>> {
    let store = SqliteStore::open(path)
        .with_context(|| format!("Failed to open content store {}", path.display()))?;
    Ok(Arc::new(store))
}

fn load_settings(path: &Path) -> Result<Settings> {
    Settings::load(path).with_context(|| format!("Failed to load settings {}", path.display()))
}

fn parse_modified_after(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid modified-after value {:?}", value))?;
    Ok(date.and_time(NaiveTime::MIN).and_utc())
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init => {
            open_store(&cli.store)?;
            println!("Content store initialized at {}", cli.store.display());
            if !cli.settings.exists() {
                let settings = toml::to_string_pretty(&Settings::default())
                    .context("Failed to serialize default settings")?;
                std::fs::write(&cli.settings, settings)
                    .with_context(|| format!("Failed to write {}", cli.settings.display()))?;
                println!("Default settings written to {}", cli.settings.display());
            }
        }

        Commands::LoadFixture { file } => {
            let store = open_store(&cli.store)?;
            let fixture = Fixture::load(&file)
                .with_context(|| format!("Failed to read fixture {}", file.display()))?;
            let stats = tokio::task::spawn_blocking(move || load_fixture(store.as_ref(), fixture)).await??;
            println!("Fixture loaded!");
            println!("  Workspaces: {}", stats.workspaces);
            println!("  Sites:      {}", stats.sites);
            println!("  Nodes:      {}", stats.nodes);
        }

        Commands::Export {
            starting_point,
            source_language,
            target_language,
            filename,
            modified_after,
            include_hidden,
            document_filter,
            content_filter,
        } => {
            let settings = load_settings(&cli.settings)?;
            let security = Arc::new(settings.security_context()?);
            let store = open_store(&cli.store)?;
            let options = ExportOptions {
                starting_point,
                source_language,
                target_language,
                modified_after: modified_after.as_deref().map(parse_modified_after).transpose()?,
                ignore_hidden: !include_hidden,
                document_filter_preset: document_filter,
                content_filter_preset: content_filter,
            };

            let service = ExportService::new(store, settings, security);
            let (path, summary) = tokio::task::spawn_blocking(move || {
                service.export_to_file(&options, filename.as_deref())
            })
            .await??;

            println!("Export complete!");
            println!("  File:            {}", path.display());
            println!("  Starting point:  {}", summary.starting_point);
            println!("  Source language: {}", summary.source_language);
            println!("  Format version:  {}", summary.format);
            println!("  Nodes:           {}", summary.nodes_written);
            println!("  Variants:        {}", summary.variants_written);
        }

        Commands::Import {
            filename,
            target_language,
            workspace,
        } => {
            let settings = load_settings(&cli.settings)?;
            let security = Arc::new(settings.security_context()?);
            let store = open_store(&cli.store)?;

            let service = ImportService::new(store, settings, security);
            let summary = tokio::task::spawn_blocking(move || {
                service.import_from_file(&filename, workspace.as_deref(), target_language.as_deref())
            })
            .await??;

            println!("Import complete!");
            println!("  Languages:          {} -> {}", summary.source_language, summary.target_language);
            println!("  Workspace:          {} -> {}", summary.source_workspace, summary.target_workspace);
            println!("  Nodes:              {}", summary.nodes_seen);
            println!("  Variants:           {}", summary.variants_seen);
            println!("  Updated:            {}", summary.variants_updated);
            println!("  Adopted:            {}", summary.variants_adopted);
            println!("  Properties written: {}", summary.properties_written);
            for (reason, count) in &summary.skipped {
                println!("  Skipped ({}): {}", reason, count);
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let reports_memory = cli.command.reports_memory();
    let result = run(cli).await;

    if reports_memory {
        println!("{}", memory::peak_memory_line());
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<TradukiError>() {
                Some(error) => eprintln!("error[{}]: {}", error.code(), error),
                None => eprintln!("error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}
