//! fanpost-publish - Publish one piece of content to several social platforms

use clap::Parser;
use libfanpost::logging::LoggingConfig;
use libfanpost::{
    parse_platforms, Config, ContentPayload, FanpostError, FanpostService, PublishReport,
    PublishStatus, Result,
};
use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "fanpost-publish")]
#[command(version, about = "Publish content to TikTok, Facebook, Instagram, LinkedIn and WhatsApp")]
#[command(long_about = r#"Publish one piece of content to several social platforms at once.

Every platform is attempted independently; one failing platform never stops
the others. Results are printed one line per platform.

EXAMPLES:
    # Video to TikTok (the user must have connected TikTok first)
    fanpost-publish --user ana --platform tiktok --media clip.mp4 "Open day!"

    # Photo to several pages, hashtags added after the text
    fanpost-publish -u ana -p facebook,instagram,linkedin -m poster.png \
        -t admissions -t campus "Applications are open"

    # Text from stdin
    echo "Reminder: fair starts at 10" | fanpost-publish -u ana -p whatsapp

    # Let the configured generator write per-platform text
    fanpost-publish -u ana -p tiktok,facebook -m clip.mp4 --generate "spring open day"

    # JSON for scripting
    fanpost-publish -u ana -p facebook --format json "Hello" | jq '.results[].status'

EXIT CODES:
    0 - Every platform succeeded
    1 - At least one platform failed, or a configuration/database error
    2 - Every failure was a missing authorization (needs_auth)
    3 - Invalid input (unknown platform, empty content)
"#)]
struct Cli {
    /// Text to publish (reads from stdin if not provided)
    text: Option<String>,

    /// User whose connected accounts are used
    #[arg(short, long, env = "FANPOST_USER")]
    user: String,

    /// Target platform(s), comma-separated
    #[arg(short, long, value_delimiter = ',', required = true)]
    platform: Vec<String>,

    /// Hashtag to append (repeatable, leading '#' optional)
    #[arg(short = 't', long = "tag", value_name = "TAG")]
    tags: Vec<String>,

    /// Image or video file to attach (copied into the configured media dir)
    #[arg(short, long, value_name = "PATH")]
    media: Option<PathBuf>,

    /// TikTok privacy level (e.g. SELF_ONLY, PUBLIC_TO_EVERYONE)
    #[arg(long, value_name = "LEVEL")]
    privacy: Option<String>,

    /// Generate per-platform text about this topic before publishing
    #[arg(short, long, value_name = "TOPIC")]
    generate: Option<String>,

    /// Configuration file (defaults to $FANPOST_CONFIG or the XDG config dir)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.verbose).init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    // Reject bad platform names before touching config or the network
    let platforms = parse_platforms(&cli.platform)?;

    let text = match (&cli.text, &cli.generate) {
        (Some(text), _) => text.clone(),
        (None, Some(_)) => String::new(),
        (None, None) => read_stdin()?,
    };
    if text.trim().is_empty() && cli.generate.is_none() && cli.media.is_none() {
        return Err(FanpostError::InvalidInput(
            "Content cannot be empty".to_string(),
        ));
    }

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    let service = FanpostService::from_config(config).await?;

    let mut content = ContentPayload::new(text.trim()).with_hashtags(cli.tags.iter().cloned());
    if let Some(path) = &cli.media {
        let media = service.stage_media(path).await?;
        debug!(mime = media.mime_type(), size = media.size(), "Staged media");
        content = content.with_media(media);
    }
    if let Some(level) = &cli.privacy {
        content = content.with_privacy_level(level.clone());
    }

    let report = match &cli.generate {
        Some(topic) => {
            let outcome = service
                .pipeline()?
                .generate_and_publish(&cli.user, topic, &platforms, content)
                .await?;
            for (platform, variant) in outcome.generated.iter() {
                if let Some(prompt) = &variant.media_prompt {
                    eprintln!("{} media prompt: {}", platform, prompt);
                }
            }
            outcome.report
        }
        None => {
            service
                .publisher()
                .publish(&cli.user, &platforms, &content)
                .await?
        }
    };

    print_report(&report, &cli.format);
    Ok(report_exit_code(&report))
}

fn read_stdin() -> Result<String> {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Err(FanpostError::InvalidInput(
            "No text given and stdin is a terminal".to_string(),
        ));
    }

    let mut buffer = String::new();
    stdin
        .read_to_string(&mut buffer)
        .map_err(|e| FanpostError::InvalidInput(format!("Failed to read stdin: {}", e)))?;
    Ok(buffer)
}

fn print_report(report: &PublishReport, format: &str) {
    if format == "json" {
        let results: Vec<_> = report.results.values().collect();
        let output = serde_json::json!({
            "request_id": report.request_id,
            "user_id": report.user_id,
            "results": results,
        });
        println!("{}", output);
        return;
    }

    for result in report.results.values() {
        match result.status {
            PublishStatus::Ok => println!(
                "{}: ok {}",
                result.platform,
                result.external_id.as_deref().unwrap_or("")
            ),
            status => println!(
                "{}: {} {}",
                result.platform,
                status.as_str(),
                result.detail.as_deref().unwrap_or("")
            ),
        }
    }
}

fn report_exit_code(report: &PublishReport) -> i32 {
    if report.all_ok() {
        0
    } else if report.count(PublishStatus::Error) == 0 {
        2
    } else {
        1
    }
}
