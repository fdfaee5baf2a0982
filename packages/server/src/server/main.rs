// Main entry point for the HeadHunter -> Bitrix24 sync service

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use dialoguer::Input;
use sync_core::domains::auth::TokenManager;
use sync_core::domains::sync::{SyncOrchestrator, SyncService};
use sync_core::kernel::scheduler::Scheduler;
use sync_core::server::AppDeps;
use sync_core::Config;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "hh-bitrix-sync")]
#[command(about = "Forward HeadHunter job applications into Bitrix24 as leads")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// One-time OAuth bootstrap: exchange an authorization code for tokens
    Authorize {
        /// Authorization code, or the full redirect URL containing it
        #[arg(long)]
        code: Option<String>,
    },
    /// Run the scheduler until interrupted (default)
    Run,
    /// Print a health snapshot and exit
    Health,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config.log_file)?;
    tracing::info!("Configuration loaded");

    let deps = AppDeps::from_config(&config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Authorize { code } => authorize(&config, &deps, code).await,
        Commands::Run => run(&config, &deps).await,
        Commands::Health => health(&config, &deps).await,
    }
}

fn init_tracing(log_file: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("Failed to open log file {}", log_file.display()))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sync_core=debug,hyper=warn,reqwest=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .init();
    Ok(())
}

async fn authorize(config: &Config, deps: &AppDeps, code: Option<String>) -> Result<()> {
    let mut tokens = deps.token_manager(config)?;

    println!("{}", "HeadHunter authorization".bold());
    println!("1. Open this URL and grant access:");
    println!("   {}", tokens.authorization_url().cyan().underline());
    println!("2. Copy the `code` parameter from the page you are redirected to.");
    println!();

    let input = match code {
        Some(code) => code,
        None => Input::<String>::new()
            .with_prompt("Authorization code")
            .interact_text()
            .context("Failed to read authorization code")?,
    };

    tokens
        .exchange_code(&extract_code(&input))
        .await
        .context("Authorization failed")?;

    println!(
        "{} Tokens saved to {}",
        "✓".green(),
        config.token_file.display()
    );
    Ok(())
}

/// Accept either the bare code or the whole redirect URL.
fn extract_code(input: &str) -> String {
    let input = input.trim();
    url::Url::parse(input)
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == "code")
                .map(|(_, value)| value.into_owned())
        })
        .unwrap_or_else(|| input.to_string())
}

async fn run(config: &Config, deps: &AppDeps) -> Result<()> {
    let mut orchestrator = deps.orchestrator(config)?;
    verify_startup(&mut orchestrator).await?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested, finishing current job");
            signal.cancel();
        }
    });

    tracing::info!(
        interval_minutes = config.sync_interval_minutes(),
        "Starting scheduler"
    );
    let service = SyncService::new(
        orchestrator,
        deps.notifier.clone(),
        config.sync_interval_minutes(),
    );
    let service = Scheduler::new(service, config.scheduler_config())
        .run(shutdown)
        .await;

    service
        .into_orchestrator()
        .close()
        .context("Failed to flush ledger")?;
    tracing::info!("Stopped");
    Ok(())
}

/// Refuse to start the scheduler when only an operator can fix access.
async fn verify_startup(orchestrator: &mut SyncOrchestrator) -> Result<()> {
    match orchestrator.verify_access().await {
        Ok(account) => {
            println!("{} Employer account verified: {}", "✓".green(), account.email);
            Ok(())
        }
        Err(e) if e.is_auth_failure() => {
            println!("{} {}", "✗".red(), e);
            print_reauthorization_hint(orchestrator.tokens());
            bail!("HeadHunter access requires re-authorization: {e}");
        }
        Err(e) => {
            tracing::warn!(error = %e, "API check failed at startup, scheduler will retry");
            Ok(())
        }
    }
}

fn print_reauthorization_hint(tokens: &TokenManager) {
    println!("Authorize again with `hh-bitrix-sync authorize` or open:");
    println!("   {}", tokens.authorization_url().cyan().underline());
}

async fn health(config: &Config, deps: &AppDeps) -> Result<()> {
    let mut orchestrator = deps.orchestrator(config)?;
    let snapshot = orchestrator.health_snapshot().await;
    orchestrator.close().context("Failed to flush ledger")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&snapshot).context("Failed to serialize health snapshot")?
    );
    if snapshot.is_healthy() {
        println!("{}", "healthy".green().bold());
        Ok(())
    } else {
        bail!("unhealthy");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_code_from_redirect_url() {
        assert_eq!(
            extract_code("http://localhost:8000/callback?code=ABC123&state=x"),
            "ABC123"
        );
        assert_eq!(extract_code("  ABC123 \n"), "ABC123");
    }
}
