// SPDX-License-Identifier: AGPL-3.0-only
// Operator entry point: loads config, wires the orchestrator and runs one request file.
use anyhow::{Context, Result};
use bench::validation::validate_request;
use bench::{BenchConfig, ExecutionRequest, InMemoryAuditStore, Orchestrator};
use clap::{Parser, Subcommand};
use relay::FunctionRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

#[derive(Parser, Debug, Clone)]
#[command(name = "varibench", about = "Run one prompt across many model configurations and compare them")]
struct Cli {
    /// TOML configuration file; environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Identity every audit row is scoped to.
    #[arg(long, global = true, default_value = "local")]
    owner: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Execute a request file and print the scored result.
    Run { request: PathBuf },

    /// Submit in the background and poll until the run finishes.
    Submit {
        request: PathBuf,

        #[arg(long, default_value_t = 250)]
        poll_interval_ms: u64,
    },

    /// Check a request file without calling any model.
    Validate { request: PathBuf },

    /// Print the built-in function declarations.
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = BenchConfig::load(cli.config.as_deref())?;

    match cli.cmd {
        Command::Run { request } => run(&config, &cli.owner, &request).await,
        Command::Submit {
            request,
            poll_interval_ms,
        } => submit(&config, &cli.owner, &request, poll_interval_ms).await,
        Command::Validate { request } => {
            let request = read_request(&request)?;
            validate_request(&request)?;
            println!(
                "Request '{}' is valid ({} configurations)",
                request.run_name,
                request.configurations.len()
            );
            Ok(())
        }
        Command::Tools => {
            let registry = FunctionRegistry::with_builtins(&config.functions)?;
            println!("{}", serde_json::to_string_pretty(&registry.declarations())?);
            Ok(())
        }
    }
}

async fn run(config: &BenchConfig, owner: &str, path: &Path) -> Result<()> {
    let request = read_request(path)?;
    let orchestrator = Orchestrator::from_config(config, Arc::new(InMemoryAuditStore::new()))?;

    let result = orchestrator.execute(owner, request).await?;
    info!(
        run_id = %result.run.id,
        success_count = result.success_count,
        error_count = result.error_count,
        "Run finished"
    );
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn submit(config: &BenchConfig, owner: &str, path: &Path, poll_interval_ms: u64) -> Result<()> {
    let request = read_request(path)?;
    let orchestrator = Arc::new(Orchestrator::from_config(
        config,
        Arc::new(InMemoryAuditStore::new()),
    )?);

    let submitted = orchestrator.submit(owner, request).await?;
    info!(job_id = %submitted.run_id, "Submitted");

    let mut last_status = submitted.status;
    loop {
        let poll = orchestrator.poll(owner, submitted.run_id).await?;
        if poll.status != last_status {
            info!(job_id = %submitted.run_id, status = ?poll.status, "Status changed");
            last_status = poll.status;
        }
        if poll.status.is_terminal() {
            if let Some(error) = &poll.error {
                anyhow::bail!("run failed: {error}");
            }
            println!("{}", serde_json::to_string_pretty(&poll)?);
            return Ok(());
        }
        sleep(Duration::from_millis(poll_interval_ms.max(10))).await;
    }
}

fn read_request(path: &Path) -> Result<ExecutionRequest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read request file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid execution request", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_request_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "runName": "haiku styles",
                "basePrompt": "Write a haiku about rain.",
                "enableFunctionCalling": false,
                "configurations": [
                    {{"name": "calm", "model": "gpt-4o-mini", "temperature": 0.2}},
                    {{"name": "wild", "model": "claude-3-5-haiku-latest", "temperature": 0.9, "max_tokens": 256}}
                ]
            }}"#
        )
        .unwrap();

        let request = read_request(file.path()).unwrap();
        assert_eq!(request.run_name, "haiku styles");
        assert_eq!(request.configurations.len(), 2);
        assert_eq!(request.configurations[1].settings.max_tokens, Some(256));
        assert!(request.tools.is_empty());
        assert!(validate_request(&request).is_ok());
    }

    #[test]
    fn test_cli_parses_submit() {
        let cli = Cli::parse_from(["varibench", "--owner", "ops", "submit", "req.json"]);
        assert_eq!(cli.owner, "ops");
        assert!(matches!(
            cli.cmd,
            Command::Submit { poll_interval_ms: 250, .. }
        ));
    }
}
