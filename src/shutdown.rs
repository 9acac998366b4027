use anyhow::{Context, Result};
use tracing::{error, info};

pub const DEFAULT_SHUTDOWN_COMMAND: [&str; 4] = ["sudo", "shutdown", "-h", "now"];

/// Power off the host. Failures are logged and swallowed.
pub async fn shutdown_host(command: &[String]) {
    info!("Shutting down the instance...");
    if let Err(e) = run_command(command).await {
        error!("Failed to shutdown: {:#}", e);
    }
}

async fn run_command(command: &[String]) -> Result<()> {
    let (program, args) = command.split_first().context("Empty shutdown command")?;

    let status = tokio::process::Command::new(program)
        .args(args)
        .status()
        .await
        .with_context(|| format!("Failed to execute {}", program))?;

    if !status.success() {
        anyhow::bail!("{} exited with {}", program, status);
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn cmd(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_run_command_reports_exit_status() {
        assert!(run_command(&cmd(&["true"])).await.is_ok());
        assert!(run_command(&cmd(&["false"])).await.is_err());
        assert!(run_command(&[]).await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_never_fails() {
        shutdown_host(&cmd(&["definitely-not-a-real-binary"])).await;
        shutdown_host(&[]).await;
    }
}
