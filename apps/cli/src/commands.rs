//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use pagesmith_client::ContentClient;
use pagesmith_core::{
    BuildReport, IncrementalBuilder, ProgressReporter, SyncOrchestrator, SyncSummary,
};
use pagesmith_shared::{
    AppConfig, BuildConfig, ClientConfig, SyncConfig, config_dir, init_config, load_config,
    load_config_from,
};
use tracing::info;

use crate::render::TemplateRenderer;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// pagesmith: publish a remote posts database as a static blog.
#[derive(Parser)]
#[command(
    name = "pagesmith",
    version,
    about = "Sync posts from a remote content database and build a static site.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Shorthand for -v.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file to use instead of the default lookup.
    #[arg(long, global = true, env = "PAGESMITH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Pull posts from the remote database into the content store.
    Sync {
        /// Re-render every post, even when unchanged.
        #[arg(long)]
        force: bool,

        /// Fetch and process, but write nothing.
        #[arg(long)]
        dry_run: bool,

        /// Sync a single page by ID.
        #[arg(long, value_name = "ID")]
        post: Option<String>,
    },

    /// Build the site from the content store, regenerating only what changed.
    Build {
        /// Ignore the build cache.
        #[arg(long)]
        force: bool,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a default pagesmith.toml.
    Init {
        /// Write to ~/.pagesmith instead of the current directory.
        #[arg(long)]
        global: bool,
    },
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = cli.verbose.max(u8::from(cli.debug));
    let filter = match level {
        0 => "pagesmith=info",
        1 => "pagesmith=debug",
        _ => "pagesmith=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Sync {
            force,
            dry_run,
            post,
        } => cmd_sync(config_path, force, dry_run, post.as_deref()).await,
        Command::Build { force } => cmd_build(config_path, force).await,
        Command::Config { action } => match action {
            ConfigAction::Init { global } => cmd_config_init(global),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// indicatif spinner; per-item failures are printed above it.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item_done(&self, label: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("[{current}/{total}] {label}"));
    }

    fn item_failed(&self, label: &str, error: &str) {
        self.spinner.println(format!("  failed: {label}: {error}"));
    }

    fn done(&self, _summary: &str) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn cmd_sync(
    config_path: Option<&Path>,
    force: bool,
    dry_run: bool,
    post: Option<&str>,
) -> Result<()> {
    let config = resolve_config(config_path)?;
    let client = ContentClient::new(ClientConfig::from_app(&config)?)?;

    let mut sync_config = SyncConfig::from(&config);
    sync_config.force = force;
    sync_config.dry_run = dry_run;

    info!(
        content_dir = %sync_config.content_dir.display(),
        force,
        dry_run,
        post,
        "starting sync"
    );

    let orchestrator = SyncOrchestrator::new(client, sync_config);
    let reporter = CliProgress::new();
    let summary = match post {
        Some(id) => orchestrator.sync_one(id, &reporter).await?,
        None => orchestrator.sync(&reporter).await?,
    };

    print_sync_summary(&summary, dry_run);
    Ok(())
}

fn print_sync_summary(summary: &SyncSummary, dry_run: bool) {
    println!();
    if dry_run {
        println!("  Dry run: nothing was written.");
    }
    println!("  Posts:     {}", summary.total_posts);
    println!("  Published: {}", summary.published);
    println!("  Scheduled: {}", summary.scheduled);
    println!("  Drafts:    {}", summary.drafts);
    println!("  Updated:   {}", summary.updated);
    println!("  Unchanged: {}", summary.skipped);
    println!("  Failed:    {}", summary.failed);
    println!("  Deleted:   {}", summary.deleted);
    println!("  Time:      {:.1}s", summary.elapsed.as_secs_f64());
    println!();
}

async fn cmd_build(config_path: Option<&Path>, force: bool) -> Result<()> {
    let config = resolve_config(config_path)?;
    let mut build_config = BuildConfig::from(&config);
    build_config.force = force;

    if build_config.site_url.is_empty() {
        return Err(eyre!("build.site_url is not set in pagesmith.toml"));
    }

    let renderer = TemplateRenderer::load(&build_config.templates_dir)?;
    let builder = IncrementalBuilder::new(build_config, renderer);
    let reporter = CliProgress::new();
    let report = builder.build(&reporter).await?;

    print_build_report(&report);
    Ok(())
}

fn print_build_report(report: &BuildReport) {
    println!();
    if report.full_rebuild {
        println!("  Full rebuild.");
    }
    println!("  Written:   {}", report.rebuilt.len());
    println!("  Unchanged: {}", report.skipped);
    println!(
        "  Assets:    {} copied, {} unchanged",
        report.assets_copied, report.assets_skipped
    );
    println!("  Time:      {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

fn cmd_config_init(global: bool) -> Result<()> {
    let dir = if global {
        config_dir()?
    } else {
        std::env::current_dir()?
    };
    let path = init_config(&dir)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
