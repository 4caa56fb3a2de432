//! nixos-rebuild tester CLI
//!
//! Runs `nixos-rebuild` inside a recorded pseudo-terminal and keeps the
//! resulting logs, recordings and metadata on disk.
//!
//! ## Commands
//!
//! - `run`: Execute one rebuild and exit with its exit code
//! - `list`: Show previous builds, newest first

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, Level};

use rebuild_core::{
    fallback_base_dir, BuildRepository, Config, FlakeRef, FsBuildRepository, LocalFileSystem,
    RebuildAction, RebuildApplication, RebuildResult,
};
use rebuild_terminal::PtyBackend;

#[derive(Parser)]
#[command(name = "nixos-rebuild-tester")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run nixos-rebuild in a recorded terminal", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one rebuild and record it
    Run(RunArgs),

    /// List previous builds
    List {
        /// Directory holding build directories
        #[arg(short, long, env = "NRT_OUTPUT_DIR", default_value = "./rebuild-logs")]
        output_dir: PathBuf,

        /// Maximum number of builds to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

/// Flags for `run`; anything left unset keeps the config file value.
#[derive(Args, Debug, Default)]
struct RunArgs {
    /// TOML configuration file
    #[arg(short, long, env = "NRT_CONFIG")]
    config: Option<PathBuf>,

    /// Rebuild action (test, build, dry-build, dry-activate)
    #[arg(short, long, env = "NRT_ACTION")]
    action: Option<RebuildAction>,

    /// Flake reference passed to --flake
    #[arg(short, long, env = "NRT_FLAKE")]
    flake: Option<FlakeRef>,

    /// Directory for build directories
    #[arg(short, long, env = "NRT_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Keep only the newest N builds
    #[arg(short, long, env = "NRT_KEEP_LAST")]
    keep_last: Option<usize>,

    /// Rebuild timeout in seconds
    #[arg(short, long, env = "NRT_TIMEOUT")]
    timeout: Option<u64>,

    /// Seconds between screen captures
    #[arg(long)]
    capture_interval: Option<f64>,

    /// Terminal width in columns
    #[arg(long)]
    width: Option<u16>,

    /// Terminal height in rows
    #[arg(long)]
    height: Option<u16>,

    /// Skip the asciinema recording and image exports
    #[arg(long)]
    no_recording: bool,

    /// Also export an animated GIF
    #[arg(long)]
    export_gif: bool,

    /// Skip the final-screen PNG
    #[arg(long)]
    no_screenshot: bool,

    /// Run nixos-rebuild without sudo
    #[arg(long)]
    no_sudo: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    rebuild_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run(args) => {
            let result = cmd_run(&args).await?;
            std::process::exit(exit_status(&result));
        }
        Commands::List { output_dir, limit } => cmd_list(&output_dir, limit).await,
    }
}

/// Defaults, then the config file, then flags.
fn build_config(args: &RunArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_toml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(action) = args.action {
        config.rebuild.action = action;
    }
    if let Some(flake) = &args.flake {
        config.rebuild.flake_ref = flake.clone();
    }
    if let Some(timeout) = args.timeout {
        config.rebuild.timeout_secs = timeout;
    }
    if let Some(interval) = args.capture_interval {
        config.rebuild.capture_interval_secs = interval;
    }
    if args.no_sudo {
        config.rebuild.use_sudo = false;
    }

    if let Some(dir) = &args.output_dir {
        config.output.base_dir = dir.clone();
    }
    if let Some(keep) = args.keep_last {
        config.output.keep_last_n = Some(keep);
    }

    if let Some(width) = args.width {
        config.recording.width = width;
    }
    if let Some(height) = args.height {
        config.recording.height = height;
    }
    if args.no_recording {
        config.recording.enabled = false;
    }
    if args.export_gif {
        config.recording.export_gif = true;
    }
    if args.no_screenshot {
        config.recording.export_screenshot = false;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn exit_status(result: &RebuildResult) -> i32 {
    if result.success {
        0
    } else if result.exit_code == 0 {
        1
    } else {
        result.exit_code
    }
}

/// Run one rebuild
async fn cmd_run(args: &RunArgs) -> Result<RebuildResult> {
    let config = build_config(args)?;
    info!(
        action = %config.rebuild.action,
        flake_ref = %config.rebuild.flake_ref,
        "starting rebuild"
    );

    let app = RebuildApplication::new(config, Arc::new(PtyBackend::new()))
        .context("Failed to set up rebuild tester")?;
    let result = app.run_rebuild().await;

    print!("{}", render_summary(&result));
    Ok(result)
}

fn render_summary(result: &RebuildResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("Build:    {}\n", result.build_id));
    out.push_str(&format!(
        "Status:   {} (exit code {})\n",
        result.status_label(),
        result.exit_code
    ));
    out.push_str(&format!("Action:   {}\n", result.action));
    out.push_str(&format!("Duration: {}\n", result.formatted_duration()));
    out.push_str(&format!("Output:   {}\n", result.output_dir.display()));
    for file in result.artifacts.all_files() {
        out.push_str(&format!("  {}\n", file.display()));
    }
    if let Some(error) = &result.error_message {
        out.push_str(&format!("Error:    {}\n", error));
    }
    out
}

/// List previous builds, including any that fell back to the temp dir
async fn cmd_list(output_dir: &Path, limit: usize) -> Result<()> {
    let repository = list_repository(output_dir);
    let builds = repository
        .find_recent(Some(limit))
        .await
        .with_context(|| format!("Failed to read builds in {}", output_dir.display()))?;

    if builds.is_empty() {
        println!("No builds found in {}", output_dir.display());
        return Ok(());
    }

    for build in &builds {
        println!("{}", render_list_line(build));
    }
    Ok(())
}

fn list_repository(output_dir: &Path) -> FsBuildRepository {
    FsBuildRepository::new(output_dir, Arc::new(LocalFileSystem::new()))
        .with_fallback_root(fallback_base_dir())
}

fn render_list_line(build: &RebuildResult) -> String {
    let mut line = format!(
        "{:<7} {:<12} {:>8}  {}  {}",
        build.status_label(),
        build.action.as_str(),
        build.formatted_duration(),
        build.timestamp.format("%Y-%m-%d %H:%M:%S"),
        build.build_id
    );
    if let Some(error) = &build.error_message {
        line.push_str(&format!("\n        {}", error));
    }
    line
}
