//! wardenctl - Entry Point
//!
//! Provisions or removes a self-hosted Vaultwarden deployment on this host.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use wardenctl::app::run::{run, Command};
use wardenctl::filesys::file::File;
use wardenctl::logs::{init_logging, LogLevel, LogOptions};
use wardenctl::storage::settings::{Settings, DEFAULT_SETTINGS_PATH};
use wardenctl::utils::version_info;

#[derive(Debug, Parser)]
#[command(name = "wardenctl", about = "Deploy and decommission a self-hosted Vaultwarden")]
#[command(disable_version_flag = true)]
struct Cli {
    /// Settings file
    #[arg(long, env = "WARDENCTL_SETTINGS", default_value = DEFAULT_SETTINGS_PATH)]
    settings: PathBuf,

    /// Answers file for unattended runs instead of interactive prompts
    #[arg(long)]
    answers: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    /// Log as JSON on the console
    #[arg(long)]
    json_logs: bool,

    /// Print version information as JSON and exit
    #[arg(long)]
    version: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Provision the workload, reverse proxy and certificate
    Deploy,
    /// Remove a deployment, confirming each destructive action
    Decommission {
        /// Domain of the deployment, asked for when omitted
        #[arg(long)]
        domain: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("{}", serde_json::to_string_pretty(&version_info())?);
        return Ok(());
    }
    let command = match cli.command {
        Some(Commands::Deploy) => Command::Deploy,
        Some(Commands::Decommission { domain }) => Command::Decommission { domain },
        None => anyhow::bail!("no command given, expected `deploy` or `decommission`"),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let code = runtime.block_on(async {
        let settings = Settings::load(&File::new(&cli.settings))
            .await
            .with_context(|| format!("loading {}", cli.settings.display()))?;

        let log_level = match &cli.log_level {
            Some(raw) => raw.parse::<LogLevel>().map_err(anyhow::Error::msg)?,
            None => settings.log_level,
        };
        let _guard = init_logging(LogOptions {
            log_level,
            log_dir: settings.log_dir(),
            json_format: cli.json_logs,
            ..Default::default()
        })?;

        let version = version_info();
        info!(version = %version.version, git_hash = %version.git_hash, ?command, "Starting wardenctl");

        let code = run(settings.to_options(), command, cli.answers.clone()).await;
        if let Err(e) = &code {
            error!(error = %e, "wardenctl failed");
        }
        Ok::<i32, anyhow::Error>(code?)
    })?;

    drop(runtime);
    std::process::exit(code);
}
