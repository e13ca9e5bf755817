//! Command execution and operator-facing reports

use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;
use tracing::{error, info};

use crate::app::options::AppOptions;
use crate::deploy::decommission::{ActionOutcome, DecommissionReport};
use crate::deploy::pipeline::{DeploySummary, FailureReport, Orchestrator};
use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::host::SystemHost;
use crate::input::scripted::ScriptedPrompts;
use crate::input::terminal::TerminalPrompt;
use crate::input::PromptSource;
use crate::models::step::StepStatus;
use crate::process::{CommandRunner, SystemRunner};

/// What to run
#[derive(Debug, Clone)]
pub enum Command {
    Deploy,
    Decommission { domain: Option<String> },
}

/// Run `command` against this host. Returns the process exit code.
pub async fn run(
    options: AppOptions,
    command: Command,
    answers: Option<PathBuf>,
) -> Result<i32, DeployError> {
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new(options.command_timeout));
    let host = Arc::new(SystemHost::new(runner.clone()));

    let mut prompts: Box<dyn PromptSource> = match answers {
        Some(path) => {
            info!(path = %path.display(), "Using answers file");
            Box::new(ScriptedPrompts::load(&File::new(path)).await?)
        }
        None => Box::new(TerminalPrompt::new()),
    };

    let orchestrator = Orchestrator::new(runner, host, options);
    match command {
        Command::Deploy => match orchestrator.deploy(prompts.as_mut()).await {
            Ok(summary) => {
                print_summary(&summary);
                Ok(0)
            }
            Err(report) => {
                print_failure(&report);
                Ok(1)
            }
        },
        Command::Decommission { domain } => {
            match orchestrator
                .decommission(prompts.as_mut(), domain.as_deref())
                .await
            {
                Ok(report) => {
                    print_decommission(&report);
                    Ok(0)
                }
                Err(e) => {
                    error!(error = %e, "Decommission not started");
                    eprintln!("{} {}", "error:".red().bold(), e);
                    Ok(1)
                }
            }
        }
    }
}

fn print_summary(summary: &DeploySummary) {
    for result in &summary.results {
        let status = match result.status {
            StepStatus::Success => "ok".green(),
            StepStatus::Skipped => "skipped".yellow(),
            StepStatus::Failed => "failed".red(),
        };
        println!("  {:<16} {:<8} {}", result.step.as_str(), status, result.message);
    }
    println!();
    println!("{} {}", "Vault is live at".green().bold(), summary.public_url.bold());
    println!(
        "Admin token stored in {} (fingerprint {})",
        summary.secret_file.display(),
        summary.secret_fingerprint
    );
}

fn print_failure(report: &FailureReport) {
    for result in &report.results {
        if !result.is_failed() {
            println!("  {:<16} {}", result.step.as_str(), "ok".green());
        }
    }
    eprintln!(
        "{} step '{}' failed ({})",
        "error:".red().bold(),
        report.step.as_str().bold(),
        report.kind
    );
    eprintln!("{}", report.diagnostic);
    for note in &report.compensations {
        eprintln!("  {} {}", "compensation:".yellow(), note);
    }
    eprintln!("Fix the problem above and run `wardenctl deploy` again.");
}

fn print_decommission(report: &DecommissionReport) {
    println!("Decommission of {}", report.domain.bold());
    for (action, outcome) in &report.actions {
        let line = outcome.to_string();
        let line = match outcome {
            ActionOutcome::Done(_) => line.green(),
            ActionOutcome::AlreadyRemoved | ActionOutcome::Declined => line.dimmed(),
            ActionOutcome::Failed(_) => line.red(),
        };
        println!("  {:<20} {}", action.to_string(), line);
    }
}
