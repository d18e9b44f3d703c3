//! Content generation ahead of publishing
//!
//! A [`ContentGenerator`] turns a topic into per-platform text and hashtags.
//! [`ContentPipeline`] runs one generation and feeds the result to the
//! [`Publisher`] as per-platform variants of a single payload.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::GeneratorConfig;
use crate::error::{FanpostError, Result};
use crate::poster::{PublishReport, Publisher};
use crate::types::{ContentPayload, PlatformKind, TextVariant};

/// Generated content for one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedVariant {
    pub text: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
    /// Prompt for an image or video to go with the text
    #[serde(default)]
    pub media_prompt: Option<String>,
}

impl From<GeneratedVariant> for TextVariant {
    fn from(variant: GeneratedVariant) -> Self {
        TextVariant {
            text: variant.text,
            hashtags: variant.hashtags,
        }
    }
}

/// Output of one generation call, keyed by platform
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedContent {
    variants: BTreeMap<PlatformKind, GeneratedVariant>,
}

impl GeneratedContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, platform: PlatformKind, variant: GeneratedVariant) {
        self.variants.insert(platform, variant);
    }

    pub fn get(&self, platform: PlatformKind) -> Option<&GeneratedVariant> {
        self.variants.get(&platform)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PlatformKind, &GeneratedVariant)> {
        self.variants.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Parse a JSON object keyed by platform name
    ///
    /// Entries for platforms that were not requested are dropped.
    pub fn from_json(body: &str, requested: &[PlatformKind]) -> Result<Self> {
        let raw: BTreeMap<String, GeneratedVariant> = serde_json::from_str(body)
            .map_err(|e| FanpostError::Generation(format!("Malformed generator output: {}", e)))?;

        let mut content = Self::new();
        for (name, variant) in raw {
            match name.parse::<PlatformKind>() {
                Ok(kind) if requested.contains(&kind) => content.insert(kind, variant),
                _ => debug!(platform = %name, "Ignoring unrequested generated variant"),
            }
        }
        Ok(content)
    }
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Produce content about `topic` for each of `platforms`
    async fn generate(&self, topic: &str, platforms: &[PlatformKind]) -> Result<GeneratedContent>;
}

/// Generator backed by an external program
///
/// The program receives `{"topic": ..., "platforms": [...]}` on stdin and must
/// print a JSON object mapping platform names to
/// `{"text", "hashtags", "media_prompt"}` on stdout.
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandGenerator {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &GeneratorConfig) -> Result<Self> {
        let (program, args) = config.command.split_first().ok_or_else(|| {
            FanpostError::InvalidInput("generator command is empty".to_string())
        })?;
        Ok(Self::new(
            shellexpand::tilde(program).to_string(),
            args.to_vec(),
            config.timeout()?,
        ))
    }

    async fn run(&self, request: Vec<u8>) -> Result<std::process::Output> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                FanpostError::Generation(format!("Failed to start {}: {}", self.program, e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A program that ignores its input may exit before reading it
            if let Err(e) = stdin.write_all(&request).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(FanpostError::Generation(format!("Failed to send topic: {}", e)));
                }
            }
        }

        child
            .wait_with_output()
            .await
            .map_err(|e| FanpostError::Generation(format!("Generator failed: {}", e)))
    }
}

#[async_trait]
impl ContentGenerator for CommandGenerator {
    async fn generate(&self, topic: &str, platforms: &[PlatformKind]) -> Result<GeneratedContent> {
        let request = serde_json::to_vec(&serde_json::json!({
            "topic": topic,
            "platforms": platforms,
        }))
        .map_err(|e| FanpostError::Generation(e.to_string()))?;

        let output = tokio::time::timeout(self.timeout, self.run(request))
            .await
            .map_err(|_| {
                FanpostError::Generation(format!(
                    "{} timed out after {}",
                    self.program,
                    humantime::format_duration(self.timeout)
                ))
            })??;

        if !output.status.success() {
            return Err(FanpostError::Generation(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        GeneratedContent::from_json(&stdout, platforms)
    }
}

/// Result of a generate-then-publish request
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub generated: GeneratedContent,
    pub report: PublishReport,
}

pub struct ContentPipeline {
    generator: Arc<dyn ContentGenerator>,
    publisher: Arc<Publisher>,
}

impl ContentPipeline {
    pub fn new(generator: Arc<dyn ContentGenerator>, publisher: Arc<Publisher>) -> Self {
        Self {
            generator,
            publisher,
        }
    }

    /// Generate content for `topic` and publish it in one pass
    ///
    /// A generation failure fails the whole request. `base` supplies media,
    /// privacy level and the fallback text for platforms the generator skipped.
    pub async fn generate_and_publish(
        &self,
        user_id: &str,
        topic: &str,
        platforms: &[PlatformKind],
        base: ContentPayload,
    ) -> Result<PipelineOutcome> {
        if topic.trim().is_empty() {
            return Err(FanpostError::InvalidInput("topic is empty".to_string()));
        }
        if platforms.is_empty() {
            return Err(FanpostError::InvalidInput(
                "At least one platform is required".to_string(),
            ));
        }

        info!(user_id, platforms = platforms.len(), "Generating content");
        let generated = self
            .generator
            .generate(topic, platforms)
            .await
            .map_err(|e| match e {
                FanpostError::Generation(_) => e,
                other => FanpostError::Generation(other.to_string()),
            })?;

        let mut payload = base;
        if payload.text.trim().is_empty() {
            payload.text = topic.to_string();
        }

        for &kind in platforms {
            match generated.get(kind) {
                Some(variant) => {
                    if let Some(prompt) = &variant.media_prompt {
                        debug!(platform = %kind, media_prompt = %prompt, "Generated media prompt");
                    }
                    payload = payload.with_variant(kind, variant.clone().into());
                }
                None => warn!(platform = %kind, "No generated content, using base text"),
            }
        }

        let report = self.publisher.publish(user_id, platforms, &payload).await?;
        Ok(PipelineOutcome { generated, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_keeps_requested_platforms() {
        let body = r##"{
            "tiktok": {"text": "Video", "hashtags": ["#fyp"], "media_prompt": "a campus at dawn"},
            "facebook": {"text": "Post"},
            "myspace": {"text": "Nope"}
        }"##;

        let content = GeneratedContent::from_json(body, &[PlatformKind::TikTok]).unwrap();
        let tiktok = content.get(PlatformKind::TikTok).unwrap();
        assert_eq!(tiktok.text, "Video");
        assert_eq!(tiktok.hashtags, vec!["#fyp"]);
        assert_eq!(tiktok.media_prompt.as_deref(), Some("a campus at dawn"));
        assert!(content.get(PlatformKind::Facebook).is_none());
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let result = GeneratedContent::from_json("Sure! Here is your post:", &[PlatformKind::TikTok]);
        assert!(matches!(result, Err(FanpostError::Generation(_))));
    }

    #[test]
    fn test_from_config_rejects_empty_command() {
        let config = GeneratorConfig {
            command: vec![],
            timeout: "5s".to_string(),
        };
        assert!(CommandGenerator::from_config(&config).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_generator_reads_stdout() {
        let generator = CommandGenerator::new(
            "sh",
            vec![
                "-c".to_string(),
                r#"cat > /dev/null; echo '{"whatsapp": {"text": "Hola", "hashtags": ["uni"]}}'"#
                    .to_string(),
            ],
            Duration::from_secs(5),
        );

        let content = generator
            .generate("open day", &[PlatformKind::WhatsApp])
            .await
            .unwrap();
        let variant = content.get(PlatformKind::WhatsApp).unwrap();
        assert_eq!(variant.text, "Hola");
        assert_eq!(variant.hashtags, vec!["uni"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_generator_failure() {
        let generator = CommandGenerator::new(
            "sh",
            vec!["-c".to_string(), "cat > /dev/null; echo quota exceeded >&2; exit 3".to_string()],
            Duration::from_secs(5),
        );

        let err = generator
            .generate("open day", &[PlatformKind::TikTok])
            .await
            .unwrap_err();
        match err {
            FanpostError::Generation(message) => assert!(message.contains("quota exceeded")),
            other => panic!("Expected generation error, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_generator_timeout() {
        let generator = CommandGenerator::new(
            "sh",
            vec!["-c".to_string(), "sleep 5".to_string()],
            Duration::from_millis(100),
        );

        let err = generator
            .generate("open day", &[PlatformKind::TikTok])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
