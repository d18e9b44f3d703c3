//! Core types for Fanpost

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::FanpostError;
use crate::media::StagedMedia;

/// The closed set of platforms Fanpost can publish to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    TikTok,
    Facebook,
    Instagram,
    LinkedIn,
    WhatsApp,
}

impl PlatformKind {
    pub const ALL: [PlatformKind; 5] = [
        PlatformKind::TikTok,
        PlatformKind::Facebook,
        PlatformKind::Instagram,
        PlatformKind::LinkedIn,
        PlatformKind::WhatsApp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::TikTok => "tiktok",
            PlatformKind::Facebook => "facebook",
            PlatformKind::Instagram => "instagram",
            PlatformKind::LinkedIn => "linkedin",
            PlatformKind::WhatsApp => "whatsapp",
        }
    }

    /// Whether publishing needs a per-user credential from the token store.
    ///
    /// The Meta platforms and the LinkedIn relay publish with account-wide
    /// tokens from the configuration instead.
    pub fn requires_user_auth(&self) -> bool {
        matches!(self, PlatformKind::TikTok)
    }
}

impl std::fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformKind {
    type Err = FanpostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tiktok" => Ok(PlatformKind::TikTok),
            "facebook" => Ok(PlatformKind::Facebook),
            "instagram" => Ok(PlatformKind::Instagram),
            "linkedin" => Ok(PlatformKind::LinkedIn),
            "whatsapp" => Ok(PlatformKind::WhatsApp),
            other => Err(FanpostError::InvalidInput(format!(
                "Unknown platform '{}'. Valid platforms: tiktok, facebook, instagram, linkedin, whatsapp",
                other
            ))),
        }
    }
}

/// Platform-specific text overriding the shared text and hashtags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextVariant {
    pub text: String,
    pub hashtags: Vec<String>,
}

/// One piece of content to publish
///
/// Built once per request and shared read-only by every adapter in the pass.
#[derive(Debug, Clone, Default)]
pub struct ContentPayload {
    pub text: String,
    pub hashtags: Vec<String>,
    pub media: Option<StagedMedia>,
    /// TikTok privacy level (e.g. "SELF_ONLY", "PUBLIC_TO_EVERYONE")
    pub privacy_level: Option<String>,
    pub variants: BTreeMap<PlatformKind, TextVariant>,
}

impl ContentPayload {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_hashtags<I, S>(mut self, hashtags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hashtags = hashtags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_media(mut self, media: StagedMedia) -> Self {
        self.media = Some(media);
        self
    }

    pub fn with_privacy_level(mut self, level: impl Into<String>) -> Self {
        self.privacy_level = Some(level.into());
        self
    }

    pub fn with_variant(mut self, platform: PlatformKind, variant: TextVariant) -> Self {
        self.variants.insert(platform, variant);
        self
    }

    pub fn text_for(&self, platform: PlatformKind) -> &str {
        self.variants
            .get(&platform)
            .map(|v| v.text.as_str())
            .unwrap_or(&self.text)
    }

    pub fn hashtags_for(&self, platform: PlatformKind) -> &[String] {
        self.variants
            .get(&platform)
            .map(|v| v.hashtags.as_slice())
            .unwrap_or(&self.hashtags)
    }
}

/// Normalize a hashtag to exactly one leading `#`.
///
/// Returns `None` for tags that are blank once the `#` prefix is removed.
pub fn normalize_hashtag(tag: &str) -> Option<String> {
    let bare = tag.trim().trim_start_matches('#');
    if bare.is_empty() {
        None
    } else {
        Some(format!("#{}", bare))
    }
}

/// Join normalized hashtags with single spaces, keeping at most `limit`.
pub fn join_hashtags(hashtags: &[String], limit: Option<usize>) -> String {
    let normalized = hashtags.iter().filter_map(|h| normalize_hashtag(h));
    let kept: Vec<String> = match limit {
        Some(n) => normalized.take(n).collect(),
        None => normalized.collect(),
    };
    kept.join(" ")
}

/// Append hashtags after a blank line, as every platform caption does.
pub fn compose_caption(text: &str, hashtags: &[String], limit: Option<usize>) -> String {
    let tags = join_hashtags(hashtags, limit);
    match (text.trim().is_empty(), tags.is_empty()) {
        (_, true) => text.to_string(),
        (true, false) => tags,
        (false, false) => format!("{}\n\n{}", text, tags),
    }
}

/// Keep the first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    Ok,
    Error,
    NeedsAuth,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStatus::Ok => "ok",
            PublishStatus::Error => "error",
            PublishStatus::NeedsAuth => "needs_auth",
        }
    }
}

impl std::fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublishStatus {
    type Err = FanpostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(PublishStatus::Ok),
            "error" => Ok(PublishStatus::Error),
            "needs_auth" => Ok(PublishStatus::NeedsAuth),
            other => Err(FanpostError::InvalidInput(format!(
                "Unknown publish status '{}'",
                other
            ))),
        }
    }
}

/// Outcome of publishing to a single platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResult {
    pub platform: PlatformKind,
    pub status: PublishStatus,
    /// Platform-side identifier (TikTok publish_id, Graph post id, ...)
    pub external_id: Option<String>,
    pub detail: Option<String>,
}

impl PublishResult {
    pub fn ok(platform: PlatformKind, external_id: impl Into<String>) -> Self {
        Self {
            platform,
            status: PublishStatus::Ok,
            external_id: Some(external_id.into()),
            detail: None,
        }
    }

    pub fn error(platform: PlatformKind, detail: impl Into<String>) -> Self {
        Self {
            platform,
            status: PublishStatus::Error,
            external_id: None,
            detail: Some(detail.into()),
        }
    }

    pub fn needs_auth(platform: PlatformKind, detail: impl Into<String>) -> Self {
        Self {
            platform,
            status: PublishStatus::NeedsAuth,
            external_id: None,
            detail: Some(detail.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == PublishStatus::Ok
    }
}

/// A stored publish outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRecord {
    pub id: Option<i64>,
    pub request_id: String,
    pub user_id: String,
    pub platform: PlatformKind,
    pub status: PublishStatus,
    pub external_id: Option<String>,
    pub detail: Option<String>,
    pub created_at: i64,
}

impl PublishRecord {
    pub fn from_result(request_id: &str, user_id: &str, result: &PublishResult) -> Self {
        Self {
            id: None,
            request_id: request_id.to_string(),
            user_id: user_id.to_string(),
            platform: result.platform,
            status: result.status,
            external_id: result.external_id.clone(),
            detail: result.detail.clone(),
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}
