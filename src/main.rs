use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use hashsync::cleanup::{CleanupOptions, CleanupSession};
use hashsync::config::{DeployConfig, DEFAULT_CONFIG_FILE};
use hashsync::deploy::{SyncOptions, SyncSession};
use hashsync::remote::{LocalRemote, RemoteFs};
use hashsync::SyncError;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hashsync")]
#[command(version, about = "Incremental deploys over SSH using content hashes", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, env = "HASHSYNC_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Use a local directory as the remote host instead of connecting over SSH
    #[arg(long, global = true, value_name = "DIR")]
    local: Option<PathBuf>,

    /// Verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only show warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload changed files from the local build directory
    Deploy {
        /// Show what would be uploaded without touching the remote
        #[arg(long)]
        dry_run: bool,
    },
    /// Delete everything under the cleanup root except preserved names
    Cleanup,
}

fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Returns whether every item succeeded.
async fn run_command<R: RemoteFs + ?Sized>(
    remote: &R,
    config: &DeployConfig,
    command: &Commands,
    show_progress: bool,
) -> Result<bool> {
    match command {
        Commands::Deploy { dry_run } => {
            let mut options = SyncOptions::from(config.deploy_section()?);
            options.show_progress = show_progress;
            let mut session = SyncSession::new(remote, options);

            if *dry_run {
                let plan = session.plan().await.context("Planning deploy failed")?;
                for upload in &plan.uploads {
                    println!("  {} {}", "Up:".cyan(), upload.remote_path);
                }
                println!(
                    "{} files would be uploaded, {} unchanged",
                    plan.len(),
                    plan.unchanged
                );
                return Ok(true);
            }

            let report = match session.run().await {
                Ok(report) => report,
                Err(SyncError::Aborted { partial, cause }) => {
                    // Show what already changed on the remote before bailing
                    print!("{}", partial);
                    return Err(anyhow::Error::from(*cause).context("Deploy aborted"));
                }
                Err(e) => return Err(anyhow::Error::from(e).context("Deploy failed")),
            };
            print!("{}", report);
            if report.is_complete() {
                println!("{}", "Deploy complete".green().bold());
            }
            Ok(report.is_complete())
        }
        Commands::Cleanup => {
            let options = CleanupOptions::from(config.cleanup_section()?);
            let report = CleanupSession::new(remote, options)
                .run()
                .await
                .context("Cleanup failed")?;
            print!("{}", report);
            Ok(report.is_complete())
        }
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let config = DeployConfig::load(&cli.config)
        .with_context(|| format!("Loading {}", cli.config.display()))?;
    tracing::debug!("Loaded {:?}", config);
    let show_progress = !cli.quiet;

    if let Some(dir) = &cli.local {
        let remote = LocalRemote::new(dir);
        return run_command(&remote, &config, &cli.command, show_progress).await;
    }

    connect_and_run(&config, &cli.command, show_progress).await
}

#[cfg(feature = "ssh")]
async fn connect_and_run(config: &DeployConfig, command: &Commands, show_progress: bool) -> Result<bool> {
    use hashsync::remote::SshRemote;

    tracing::info!("Connecting to {}:{}", config.remote.host, config.remote.port);
    let mut remote_config = config.remote.clone();
    remote_config.resolve_password_from_env()?;

    let remote = SshRemote::connect(&remote_config)
        .await
        .with_context(|| format!("Connecting to {}", config.remote.host))?;

    let result = run_command(&remote, config, command, show_progress).await;
    if let Err(e) = remote.close().await {
        tracing::debug!("Closing SSH session: {}", e);
    }
    result
}

#[cfg(not(feature = "ssh"))]
async fn connect_and_run(_config: &DeployConfig, _command: &Commands, _show_progress: bool) -> Result<bool> {
    anyhow::bail!("Built without SSH support; use --local or enable the `ssh` feature")
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
