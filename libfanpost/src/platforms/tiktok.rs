//! TikTok platform implementation
//!
//! Publishing uses the Content Posting API's direct-post flow with a single
//! chunk:
//!
//! 1. `POST {api_base}/post/publish/video/init/` declares the video size and
//!    returns an `upload_url` plus a `publish_id`.
//! 2. `PUT {upload_url}` sends every byte with an explicit `Content-Range`.
//! 3. TikTok processes the upload asynchronously; `publish_id` is reported as
//!    the post identifier.
//!
//! Authorization is OAuth 2.0 with PKCE (S256).

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{json_str, map_send_error, read_success_body, Platform, PlatformResult};
use crate::config::TikTokConfig;
use crate::error::PlatformError;
use crate::media::StagedMedia;
use crate::oauth::{code_challenge, generate_code_verifier, AuthorizationRequest, TokenResponse};
use crate::types::{compose_caption, truncate_chars, ContentPayload, PlatformKind};

/// Most hashtags appended to a caption
pub const MAX_HASHTAGS: usize = 4;

/// Caption length limit, in characters
pub const MAX_CAPTION_CHARS: usize = 2200;

const VIDEO_MIME: &str = "video/mp4";

/// Progress of one upload attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
    InitRequested,
    UploadUrlObtained {
        upload_url: String,
        publish_id: String,
    },
    BytesUploaded {
        publish_id: String,
    },
    Published {
        publish_id: String,
    },
    Failed(PlatformError),
}

impl UploadState {
    pub fn name(&self) -> &'static str {
        match self {
            UploadState::InitRequested => "init_requested",
            UploadState::UploadUrlObtained { .. } => "upload_url_obtained",
            UploadState::BytesUploaded { .. } => "bytes_uploaded",
            UploadState::Published { .. } => "published",
            UploadState::Failed(_) => "failed",
        }
    }
}

/// Where to send the bytes for an initialized upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub upload_url: String,
    pub publish_id: String,
}

/// Caption used for both title and description: text, then at most four
/// normalized hashtags, cut to 2200 characters.
pub fn compose_tiktok_caption(text: &str, hashtags: &[String]) -> String {
    truncate_chars(
        &compose_caption(text, hashtags, Some(MAX_HASHTAGS)),
        MAX_CAPTION_CHARS,
    )
}

/// `Content-Range` value for a single chunk covering `size` bytes
pub fn content_range(size: u64) -> String {
    format!("bytes 0-{}/{}", size.saturating_sub(1), size)
}

pub struct TikTokPlatform {
    config: TikTokConfig,
    client: reqwest::Client,
    upload_timeout: Duration,
}

impl TikTokPlatform {
    pub fn new(config: TikTokConfig, client: reqwest::Client, upload_timeout: Duration) -> Self {
        Self {
            config,
            client,
            upload_timeout,
        }
    }

    fn init_url(&self) -> String {
        format!(
            "{}/post/publish/video/init/",
            self.config.api_base.trim_end_matches('/')
        )
    }

    /// Step 1: declare the upload and obtain its destination
    pub async fn init_upload(
        &self,
        access_token: &str,
        caption: &str,
        privacy_level: &str,
        video_size: u64,
    ) -> PlatformResult<UploadSession> {
        let body = json!({
            "post_info": {
                "title": caption,
                "privacy_level": privacy_level,
                "description": caption,
            },
            "source_info": {
                "source": "FILE_UPLOAD",
                "video_size": video_size,
                "chunk_size": video_size,
                "total_chunk_count": 1,
            }
        });

        let response = self
            .client
            .post(self.init_url())
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .header(CONTENT_TYPE, "application/json; charset=UTF-8")
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error("tiktok upload init", e))?;

        let body = read_success_body("tiktok upload init", response)
            .await
            .map_err(into_upload_error)?;

        let json: serde_json::Value = serde_json::from_str(&body).map_err(|_| PlatformError::Upload {
            status: None,
            detail: format!("init returned a non-JSON body: {}", body),
        })?;

        json.get("data")
            .and_then(|data| {
                Some(UploadSession {
                    upload_url: json_str(data, "upload_url")?,
                    publish_id: json_str(data, "publish_id")?,
                })
            })
            .ok_or_else(|| PlatformError::Upload {
                status: None,
                detail: format!("init response missing upload_url or publish_id: {}", body),
            })
    }

    /// Step 2: send the whole video in one chunk
    pub async fn upload_bytes(&self, upload_url: &str, media: &StagedMedia) -> PlatformResult<()> {
        let size = media.size();

        let response = self
            .client
            .put(upload_url)
            .timeout(self.upload_timeout)
            .header(CONTENT_TYPE, VIDEO_MIME)
            .header(CONTENT_LENGTH, size)
            .header(CONTENT_RANGE, content_range(size))
            .body(media.bytes())
            .send()
            .await
            .map_err(|e| map_send_error("tiktok video upload", e))?;

        let status = response.status().as_u16();
        if status == 200 || status == 201 {
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        Err(PlatformError::Upload {
            status: Some(status),
            detail: if detail.is_empty() {
                format!("upload rejected with HTTP {}", status)
            } else {
                detail
            },
        })
    }

    async fn advance(
        &self,
        state: UploadState,
        access_token: &str,
        caption: &str,
        privacy_level: &str,
        media: &StagedMedia,
    ) -> UploadState {
        match state {
            UploadState::InitRequested => {
                match self
                    .init_upload(access_token, caption, privacy_level, media.size())
                    .await
                {
                    Ok(session) => UploadState::UploadUrlObtained {
                        upload_url: session.upload_url,
                        publish_id: session.publish_id,
                    },
                    Err(e) => UploadState::Failed(e),
                }
            }
            UploadState::UploadUrlObtained {
                upload_url,
                publish_id,
            } => match self.upload_bytes(&upload_url, media).await {
                Ok(()) => UploadState::BytesUploaded { publish_id },
                Err(e) => UploadState::Failed(e),
            },
            // TikTok finishes processing on its own
            UploadState::BytesUploaded { publish_id } => UploadState::Published { publish_id },
            terminal => terminal,
        }
    }

    async fn post_form(&self, context: &str, form: &[(&str, &str)]) -> PlatformResult<String> {
        let response = self
            .client
            .post(&self.config.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| map_send_error(context, e))?;

        read_success_body(context, response).await
    }
}

fn into_upload_error(e: PlatformError) -> PlatformError {
    match e {
        PlatformError::Upstream { status, detail } => PlatformError::Upload {
            status: Some(status),
            detail,
        },
        other => other,
    }
}

#[async_trait]
impl Platform for TikTokPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::TikTok
    }

    fn validate_content(&self, content: &ContentPayload) -> PlatformResult<()> {
        let media = content
            .media
            .as_ref()
            .ok_or_else(|| PlatformError::Validation("TikTok requires a video".to_string()))?;

        if media.mime_type() != VIDEO_MIME {
            return Err(PlatformError::Validation(format!(
                "TikTok requires {} media, got {}",
                VIDEO_MIME,
                media.mime_type()
            )));
        }

        if media.size() == 0 {
            return Err(PlatformError::Validation("video is empty".to_string()));
        }

        Ok(())
    }

    async fn publish(
        &self,
        content: &ContentPayload,
        access_token: Option<&str>,
    ) -> PlatformResult<String> {
        let access_token = access_token.ok_or_else(|| {
            PlatformError::AuthRequired("TikTok publishing needs a connected account".to_string())
        })?;
        self.validate_content(content)?;

        let media = content
            .media
            .as_ref()
            .ok_or_else(|| PlatformError::Validation("TikTok requires a video".to_string()))?;
        let caption = compose_tiktok_caption(
            content.text_for(PlatformKind::TikTok),
            content.hashtags_for(PlatformKind::TikTok),
        );
        let privacy_level = content
            .privacy_level
            .as_deref()
            .unwrap_or(&self.config.privacy_level);

        let mut state = UploadState::InitRequested;
        loop {
            state = self
                .advance(state, access_token, &caption, privacy_level, media)
                .await;
            debug!(state = state.name(), "TikTok upload advanced");

            match &state {
                UploadState::Published { publish_id } => {
                    info!(publish_id = %publish_id, size = media.size(), "TikTok upload accepted");
                    return Ok(publish_id.clone());
                }
                UploadState::Failed(e) => {
                    warn!("TikTok upload failed: {}", e);
                    return Err(e.clone());
                }
                _ => {}
            }
        }
    }

    fn uses_pkce(&self) -> bool {
        true
    }

    fn default_redirect_uri(&self) -> Option<&str> {
        Some(&self.config.redirect_uri)
    }

    fn build_authorization_url(
        &self,
        redirect_uri: &str,
        user_id: &str,
    ) -> PlatformResult<AuthorizationRequest> {
        let verifier = generate_code_verifier();
        let challenge = code_challenge(&verifier);

        let url = reqwest::Url::parse_with_params(
            &self.config.auth_url,
            &[
                ("client_key", self.config.client_key.as_str()),
                ("scope", self.config.scopes.as_str()),
                ("response_type", "code"),
                ("redirect_uri", redirect_uri),
                ("code_challenge", challenge.as_str()),
                ("code_challenge_method", "S256"),
                ("state", user_id),
            ],
        )
        .map_err(|e| PlatformError::NotConfigured(format!("tiktok.auth_url: {}", e)))?;

        Ok(AuthorizationRequest {
            url: url.to_string(),
            verifier: Some(verifier),
        })
    }

    async fn exchange_code_for_token(
        &self,
        code: &str,
        redirect_uri: &str,
        verifier: Option<&str>,
    ) -> PlatformResult<TokenResponse> {
        let verifier = verifier.ok_or_else(|| {
            PlatformError::AuthRequired("TikTok code exchange needs a PKCE verifier".to_string())
        })?;

        let body = self
            .post_form(
                "tiktok token exchange",
                &[
                    ("client_key", self.config.client_key.as_str()),
                    ("client_secret", self.config.client_secret.as_str()),
                    ("code", code),
                    ("grant_type", "authorization_code"),
                    ("redirect_uri", redirect_uri),
                    ("code_verifier", verifier),
                ],
            )
            .await
            .map_err(|e| match e {
                PlatformError::Upstream { status, detail } => {
                    PlatformError::Exchange(format!("HTTP {}: {}", status, detail))
                }
                other => other,
            })?;

        TokenResponse::from_json(&body, Some("open_id")).map_err(PlatformError::Exchange)
    }

    async fn refresh_token(&self, refresh_token: &str) -> PlatformResult<TokenResponse> {
        let body = self
            .post_form(
                "tiktok token refresh",
                &[
                    ("client_key", self.config.client_key.as_str()),
                    ("client_secret", self.config.client_secret.as_str()),
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                ],
            )
            .await
            .map_err(|e| match e {
                PlatformError::Upstream { status, detail } => {
                    PlatformError::Refresh(format!("HTTP {}: {}", status, detail))
                }
                other => other,
            })?;

        TokenResponse::from_json(&body, Some("open_id")).map_err(PlatformError::Refresh)
    }
}
