//! fanpost-connect - Connect, inspect and disconnect platform accounts
//!
//! The OAuth flow runs inside one process: the PKCE verifier created when the
//! authorization URL is printed lives only in memory, and the code pasted
//! back completes the exchange before the process exits.

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use libfanpost::config::TokenBackendKind;
use libfanpost::logging::LoggingConfig;
use libfanpost::oauth::{code_from_callback, PLATFORM_ID_KEY};
use libfanpost::{Config, FanpostError, FanpostService, PlatformKind};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::warn;

#[derive(Parser)]
#[command(name = "fanpost-connect")]
#[command(version, about = "Manage the platform accounts Fanpost publishes with", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// User whose accounts are managed
    #[arg(short, long, global = true, env = "FANPOST_USER")]
    user: Option<String>,

    /// Configuration file (defaults to $FANPOST_CONFIG or the XDG config dir)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize a platform account (prints a URL, then reads the code)
    Connect {
        /// Platform name (tiktok, facebook)
        platform: String,

        /// Redirect URI registered with the platform (defaults to the configured one)
        #[arg(long)]
        redirect_uri: Option<String>,
    },

    /// Show which platforms are configured and connected
    Status {
        /// Output format
        #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Remove the stored credential for a platform
    Disconnect {
        /// Platform name
        platform: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<FanpostError>()
            .map(FanpostError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let user = cli
        .user
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| FanpostError::InvalidInput("--user is required".to_string()))?;

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    let service = FanpostService::from_config(config).await?;

    match cli.command {
        Commands::Connect {
            platform,
            redirect_uri,
        } => connect(&service, &user, &platform, redirect_uri.as_deref()).await,
        Commands::Status { format } => status(&service, &user, &format).await,
        Commands::Disconnect { platform } => disconnect(&service, &user, &platform).await,
    }
}

async fn connect(
    service: &FanpostService,
    user: &str,
    platform: &str,
    redirect_uri: Option<&str>,
) -> Result<()> {
    let platform: PlatformKind = platform.parse()?;
    if service.config().tokens.backend == TokenBackendKind::Memory {
        warn!("Token backend is 'memory'; the credential will be lost when this process exits");
    }

    let url = service.oauth().begin(user, platform, redirect_uri)?;
    println!("{}", url);
    eprint!("Open the URL above, authorize, then paste the code or the full redirect URL: ");
    std::io::stderr().flush().context("Failed to flush stderr")?;

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read authorization code")?;

    let code = code_from_callback(&line).ok_or_else(|| {
        FanpostError::InvalidInput("no authorization code in the pasted input".to_string())
    })?;

    let credential = service
        .oauth()
        .complete(user, platform, &code, redirect_uri)
        .await?;

    match credential.metadata.get(PLATFORM_ID_KEY) {
        Some(id) => println!("Connected {} for {} (account {})", platform, user, id),
        None => println!("Connected {} for {}", platform, user),
    }
    Ok(())
}

async fn status(service: &FanpostService, user: &str, format: &str) -> Result<()> {
    let configured = service.registry().kinds();
    let now = Utc::now().timestamp();

    let mut rows = Vec::new();
    for platform in PlatformKind::ALL {
        let credential = service.tokens().get_credential(user, platform).await;
        rows.push(serde_json::json!({
            "platform": platform,
            "configured": configured.contains(&platform),
            "requires_user_auth": platform.requires_user_auth(),
            "connected": credential.is_some(),
            "expired": credential.as_ref().map(|c| c.is_expired(now)),
            "expires_at": credential.as_ref().and_then(|c| c.expires_at),
        }));
    }

    if format == "json" {
        println!("{}", serde_json::Value::Array(rows));
        return Ok(());
    }

    println!("Accounts for {} (token store: {})", user, service.tokens().backend_name());
    for row in &rows {
        let platform = row["platform"].as_str().unwrap_or_default();
        let state = if row["configured"] == false {
            "not configured".to_string()
        } else if row["requires_user_auth"] == false {
            "uses configured token".to_string()
        } else if row["connected"] == false {
            "not connected".to_string()
        } else {
            describe_expiry(row["expires_at"].as_i64(), row["expired"] == true)
        };
        println!("  {:<10} {}", platform, state);
    }
    Ok(())
}

fn describe_expiry(expires_at: Option<i64>, expired: bool) -> String {
    let when = expires_at.and_then(|ts| Utc.timestamp_opt(ts, 0).single());
    match (when, expired) {
        (Some(when), true) => format!("connected, token expired {} (refreshed on next publish)", when.to_rfc3339()),
        (Some(when), false) => format!("connected, token valid until {}", when.to_rfc3339()),
        (None, _) => "connected".to_string(),
    }
}

async fn disconnect(service: &FanpostService, user: &str, platform: &str) -> Result<()> {
    let platform: PlatformKind = platform.parse()?;

    if service.tokens().delete_credential(user, platform).await? {
        println!("Disconnected {} for {}", platform, user);
    } else {
        println!("No {} credential stored for {}", platform, user);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_expiry() {
        assert_eq!(describe_expiry(None, false), "connected");
        assert_eq!(
            describe_expiry(Some(0), false),
            "connected, token valid until 1970-01-01T00:00:00+00:00"
        );
        assert!(describe_expiry(Some(0), true).contains("expired"));
    }

    #[test]
    fn test_user_is_global() {
        let cli = Cli::try_parse_from(["fanpost-connect", "status", "--user", "ana"]).unwrap();
        assert_eq!(cli.user.as_deref(), Some("ana"));
    }
}
