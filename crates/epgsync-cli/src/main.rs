//! epgsync - XMLTV program guide importer CLI.

/// Application configuration (TOML).
mod config;
/// `SQLite` adapter for the guide importer.
mod store;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use epgsync_db::{
    get_setting, insert_channel, load_channels, load_programs_for_channel, load_settings, open_db,
    set_external_id, set_setting,
};
use epgsync_guide::import::{
    CancellationFlag, ImportOptions, ImportStats, InsertPriority, XmltvImporter,
};
use tracing::instrument;
use tracing_subscriber::filter::EnvFilter;
#[cfg(not(feature = "otel"))]
use tracing_subscriber::fmt;
#[cfg(feature = "otel")]
use tracing_subscriber::layer::SubscriberExt;
#[cfg(feature = "otel")]
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{AppConfig, DataPaths};
use crate::store::SqliteGuideStore;

/// CLI argument parser.
#[derive(Parser)]
#[command(about, version)]
struct Cli {
    /// Keep config.toml and epgsync.db in this directory.
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Import an XMLTV feed into the local schedule.
    Import(ImportArgs),
    /// Manage local channels and their XMLTV mapping.
    Channels(ChannelsCommand),
    /// Read and write import settings.
    Settings(SettingsCommand),
    /// Inspect the stored schedule.
    Programs(ProgramsCommand),
}

/// Arguments for the `import` subcommand.
#[derive(clap::Args)]
struct ImportArgs {
    /// XMLTV file to import. Falls back to `import.feed` from the config.
    file: Option<PathBuf>,

    /// Write all programs in one transaction instead of paced chunks.
    #[arg(long)]
    foreground: bool,
}

/// Arguments for the `channels` subcommand.
#[derive(clap::Args)]
struct ChannelsCommand {
    /// Channels subcommand to run.
    #[command(subcommand)]
    command: ChannelsSubcommands,
}

/// Available channels subcommands.
#[derive(Subcommand)]
enum ChannelsSubcommands {
    /// List local channels.
    List,
    /// Add a local channel.
    Add(ChannelsAddArgs),
    /// Map a local channel onto an XMLTV channel id.
    Map(ChannelsMapArgs),
}

/// Arguments for the `channels add` subcommand.
#[derive(clap::Args)]
struct ChannelsAddArgs {
    /// Display name.
    #[arg(long)]
    name: String,

    /// XMLTV channel id.
    #[arg(long)]
    external_id: Option<String>,
}

/// Arguments for the `channels map` subcommand.
#[derive(clap::Args)]
struct ChannelsMapArgs {
    /// Local channel ID.
    #[arg(long)]
    id: u32,

    /// XMLTV channel id (empty to clear the mapping).
    #[arg(long)]
    external_id: String,
}

/// Arguments for the `settings` subcommand.
#[derive(clap::Args)]
struct SettingsCommand {
    /// Settings subcommand to run.
    #[command(subcommand)]
    command: SettingsSubcommands,
}

/// Available settings subcommands.
#[derive(Subcommand)]
enum SettingsSubcommands {
    /// List all settings.
    List,
    /// Show one setting.
    Get {
        /// Setting key (e.g. `xmlTvUseTimeZone`).
        key: String,
    },
    /// Change one setting.
    Set {
        /// Setting key.
        key: String,
        /// New value.
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
}

/// Arguments for the `programs` subcommand.
#[derive(clap::Args)]
struct ProgramsCommand {
    /// Programs subcommand to run.
    #[command(subcommand)]
    command: ProgramsSubcommands,
}

/// Available programs subcommands.
#[derive(Subcommand)]
enum ProgramsSubcommands {
    /// List the stored programs of a channel.
    List(ProgramsListArgs),
}

/// Arguments for the `programs list` subcommand.
#[derive(clap::Args)]
struct ProgramsListArgs {
    /// Local channel ID.
    #[arg(long)]
    channel: u32,
}

/// Runs the `import` subcommand.
///
/// The import itself runs on a blocking worker; Ctrl-C cancels it at the
/// next channel or programme boundary.
///
/// # Errors
///
/// Returns an error if no feed is configured, the database cannot be
/// opened, or the import fails.
#[instrument(skip_all)]
async fn run_import(args: ImportArgs, paths: &DataPaths) -> Result<()> {
    let config = AppConfig::load(&paths.config_file).context("failed to load config")?;

    let Some(source) = args.file.or_else(|| config.import.feed.clone()) else {
        bail!("no feed given: pass FILE or set import.feed in {}", paths.config_file.display());
    };
    let priority = if args.foreground || !config.import.background_priority {
        InsertPriority::Normal
    } else {
        InsertPriority::Background
    };

    let conn = open_db(&paths.database).context("failed to open database")?;
    let store = SqliteGuideStore::new(conn).with_throttle(
        config.import.background_chunk_size,
        config.import.background_delay(),
    );

    let cancel = CancellationFlag::new();
    let importer = XmltvImporter::new(store)
        .options(ImportOptions {
            priority,
            ..ImportOptions::default()
        })
        .cancellation(cancel.clone())
        .on_progress(log_progress);

    tracing::info!(source = %source.display(), ?priority, "Importing XMLTV feed");

    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling import");
            cancel.cancel();
        }
    });
    let result = tokio::task::spawn_blocking(move || importer.import(&source))
        .await
        .context("import worker failed")?;
    watcher.abort();

    let report = result?;
    let stats = &report.stats;
    if report.is_success() {
        tracing::info!(
            "{}: {} programs written for {} channels",
            report.message,
            report.imported,
            stats.channels
        );
        if let (Some(start), Some(end)) = (stats.start_time, stats.end_time) {
            tracing::info!("Schedule spans {} to {}", start, end);
        }
    } else {
        tracing::info!("{}", report.message);
    }

    Ok(())
}

/// Logs import progress ticks.
fn log_progress(stats: &ImportStats) {
    tracing::debug!(
        status = %stats.status,
        channels = stats.channels,
        programs = stats.programs,
        "import progress"
    );
}

/// Runs the `channels list` subcommand.
///
/// # Errors
///
/// Returns an error if DB operations fail.
#[instrument(skip_all)]
fn run_channels_list(paths: &DataPaths) -> Result<()> {
    let conn = open_db(&paths.database).context("failed to open database")?;
    let channels = load_channels(&conn).context("failed to load channels")?;

    if channels.is_empty() {
        tracing::info!("No channels. Run `channels add` to create one.");
        return Ok(());
    }

    tracing::info!("ID\tName\t\t\tExternal ID");
    for ch in &channels {
        tracing::info!(
            "{:>3}\t{}\t\t\t{}",
            ch.id_channel,
            ch.name,
            ch.external_id.as_deref().unwrap_or("-")
        );
    }
    tracing::info!("Total: {} channels", channels.len());

    Ok(())
}

/// Runs the `channels add` subcommand.
///
/// # Errors
///
/// Returns an error if DB operations fail.
#[instrument(skip_all)]
fn run_channels_add(args: &ChannelsAddArgs, paths: &DataPaths) -> Result<()> {
    let conn = open_db(&paths.database).context("failed to open database")?;
    let id = insert_channel(&conn, &args.name, args.external_id.as_deref())?;
    tracing::info!("Added channel {}: {}", id, args.name);
    Ok(())
}

/// Runs the `channels map` subcommand.
///
/// # Errors
///
/// Returns an error if the channel does not exist or DB operations fail.
#[instrument(skip_all)]
fn run_channels_map(args: &ChannelsMapArgs, paths: &DataPaths) -> Result<()> {
    let conn = open_db(&paths.database).context("failed to open database")?;
    let external_id = Some(args.external_id.as_str()).filter(|id| !id.is_empty());

    if !set_external_id(&conn, args.id, external_id)? {
        bail!("channel {} not found", args.id);
    }

    match external_id {
        Some(external_id) => tracing::info!("Mapped channel {} to {}", args.id, external_id),
        None => tracing::info!("Cleared mapping of channel {}", args.id),
    }
    Ok(())
}

/// Runs the `settings list` subcommand.
///
/// # Errors
///
/// Returns an error if DB operations fail.
#[instrument(skip_all)]
fn run_settings_list(paths: &DataPaths) -> Result<()> {
    let conn = open_db(&paths.database).context("failed to open database")?;
    let settings = load_settings(&conn).context("failed to load settings")?;

    if settings.is_empty() {
        tracing::info!("No settings stored; defaults apply.");
        return Ok(());
    }
    for (key, value) in &settings {
        tracing::info!("{} = {}", key, value);
    }
    Ok(())
}

/// Runs the `settings get` subcommand.
///
/// # Errors
///
/// Returns an error if DB operations fail.
#[instrument(skip_all)]
fn run_settings_get(key: &str, paths: &DataPaths) -> Result<()> {
    let conn = open_db(&paths.database).context("failed to open database")?;
    match get_setting(&conn, key)? {
        Some(value) => tracing::info!("{} = {}", key, value),
        None => tracing::info!("{} is not set", key),
    }
    Ok(())
}

/// Runs the `settings set` subcommand.
///
/// # Errors
///
/// Returns an error if DB operations fail.
#[instrument(skip_all)]
fn run_settings_set(key: &str, value: &str, paths: &DataPaths) -> Result<()> {
    let conn = open_db(&paths.database).context("failed to open database")?;
    set_setting(&conn, key, value)?;
    tracing::info!("{} = {}", key, value);
    Ok(())
}

/// Runs the `programs list` subcommand.
///
/// # Errors
///
/// Returns an error if DB operations fail.
#[instrument(skip_all)]
fn run_programs_list(args: &ProgramsListArgs, paths: &DataPaths) -> Result<()> {
    let conn = open_db(&paths.database).context("failed to open database")?;
    let programs =
        load_programs_for_channel(&conn, args.channel).context("failed to load programs")?;

    if programs.is_empty() {
        tracing::info!("No programs stored for channel {}", args.channel);
        return Ok(());
    }

    tracing::info!("StTime\t\t\tEdTime\t\t\tTitle");
    for p in programs.iter().rev() {
        tracing::info!("{}\t{}\t{}", p.start_time, p.end_time, p.title);
    }
    tracing::info!("Total: {} programs", programs.len());

    Ok(())
}

/// Entry point.
///
/// # Errors
///
/// Returns an error if subcommand execution fails.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    #[cfg(not(feature = "otel"))]
    {
        fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_target(false)
            .init();
    }

    #[cfg(feature = "otel")]
    {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);

        let otel_layer = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .ok()
            .and_then(|_| {
                let exporter = opentelemetry_otlp::SpanExporter::builder()
                    .with_http()
                    .build()
                    .ok()?;

                let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
                    .with_simple_exporter(exporter)
                    .build();

                let tracer = opentelemetry::trace::TracerProvider::tracer(
                    &tracer_provider,
                    env!("CARGO_PKG_NAME"),
                );
                opentelemetry::global::set_tracer_provider(tracer_provider);

                Some(tracing_opentelemetry::layer().with_tracer(tracer))
            });

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(otel_layer)
            .init();
    }

    let cli = Cli::parse();
    let paths =
        DataPaths::resolve(cli.dir.as_deref()).context("failed to resolve data directories")?;
    match cli.command {
        Commands::Import(args) => run_import(args, &paths).await,
        Commands::Channels(ch) => match ch.command {
            ChannelsSubcommands::List => run_channels_list(&paths),
            ChannelsSubcommands::Add(args) => run_channels_add(&args, &paths),
            ChannelsSubcommands::Map(args) => run_channels_map(&args, &paths),
        },
        Commands::Settings(settings) => match settings.command {
            SettingsSubcommands::List => run_settings_list(&paths),
            SettingsSubcommands::Get { key } => run_settings_get(&key, &paths),
            SettingsSubcommands::Set { key, value } => run_settings_set(&key, &value, &paths),
        },
        Commands::Programs(programs) => match programs.command {
            ProgramsSubcommands::List(args) => run_programs_list(&args, &paths),
        },
    }
}
