//! Facebook Page publishing through the Graph API
//!
//! Images go to `/{page_id}/photos` as a multipart upload; everything else is
//! posted as text to `/{page_id}/feed`. Posts use the configured page token
//! unless the user connected an account through the OAuth flow.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use tracing::{info, warn};

use super::{json_str, map_send_error, read_success_body, read_success_json, Platform, PlatformResult};
use crate::config::FacebookConfig;
use crate::error::PlatformError;
use crate::oauth::{AuthorizationRequest, TokenResponse};
use crate::types::{compose_caption, ContentPayload, PlatformKind};

pub struct FacebookPlatform {
    config: FacebookConfig,
    client: reqwest::Client,
    upload_timeout: Duration,
}

impl FacebookPlatform {
    pub fn new(config: FacebookConfig, client: reqwest::Client, upload_timeout: Duration) -> Self {
        Self {
            config,
            client,
            upload_timeout,
        }
    }

    fn endpoint(&self, edge: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.graph_url.trim_end_matches('/'),
            self.config.page_id,
            edge
        )
    }

    fn app_credentials(&self) -> PlatformResult<(&str, &str)> {
        match (&self.config.app_id, &self.config.app_secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                Ok((id.as_str(), secret.as_str()))
            }
            _ => Err(PlatformError::NotConfigured(
                "facebook.app_id and facebook.app_secret are required for OAuth".to_string(),
            )),
        }
    }
}

#[async_trait]
impl Platform for FacebookPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Facebook
    }

    fn validate_content(&self, content: &ContentPayload) -> PlatformResult<()> {
        if content.media.is_none() && content.text_for(PlatformKind::Facebook).trim().is_empty() {
            return Err(PlatformError::Validation(
                "Facebook posts need text or an image".to_string(),
            ));
        }
        Ok(())
    }

    async fn publish(
        &self,
        content: &ContentPayload,
        access_token: Option<&str>,
    ) -> PlatformResult<String> {
        self.validate_content(content)?;

        let token = access_token.unwrap_or(&self.config.page_access_token);
        let message = compose_caption(
            content.text_for(PlatformKind::Facebook),
            content.hashtags_for(PlatformKind::Facebook),
            None,
        );

        let json = match content.media.as_ref().filter(|m| m.is_image()) {
            Some(image) => {
                let part = Part::bytes(image.bytes().to_vec())
                    .file_name(image.file_name().unwrap_or("image").to_string())
                    .mime_str(image.mime_type())
                    .map_err(|e| PlatformError::Validation(format!("invalid mime type: {}", e)))?;
                let form = Form::new()
                    .part("source", part)
                    .text("message", message)
                    .text("access_token", token.to_string());

                let response = self
                    .client
                    .post(self.endpoint("photos"))
                    .timeout(self.upload_timeout)
                    .multipart(form)
                    .send()
                    .await
                    .map_err(|e| map_send_error("facebook photo post", e))?;
                read_success_json("facebook photo post", response).await?
            }
            None => {
                if let Some(media) = &content.media {
                    warn!(
                        mime_type = media.mime_type(),
                        "Facebook adapter posts non-image media as text only"
                    );
                }

                let response = self
                    .client
                    .post(self.endpoint("feed"))
                    .form(&[("message", message.as_str()), ("access_token", token)])
                    .send()
                    .await
                    .map_err(|e| map_send_error("facebook feed post", e))?;
                read_success_json("facebook feed post", response).await?
            }
        };

        // Photo posts report both the photo id and the feed story id
        let post_id = json_str(&json, "post_id")
            .or_else(|| json_str(&json, "id"))
            .ok_or_else(|| PlatformError::Upstream {
                status: 200,
                detail: format!("Graph API response without id: {}", json),
            })?;

        info!(post_id = %post_id, "Published to Facebook");
        Ok(post_id)
    }

    fn default_redirect_uri(&self) -> Option<&str> {
        self.config.redirect_uri.as_deref()
    }

    fn build_authorization_url(
        &self,
        redirect_uri: &str,
        user_id: &str,
    ) -> PlatformResult<AuthorizationRequest> {
        let (app_id, _) = self.app_credentials()?;

        let url = reqwest::Url::parse_with_params(
            &self.config.dialog_url,
            &[
                ("client_id", app_id),
                ("redirect_uri", redirect_uri),
                ("scope", self.config.scopes.as_str()),
                ("response_type", "code"),
                ("state", user_id),
            ],
        )
        .map_err(|e| PlatformError::NotConfigured(format!("facebook.dialog_url: {}", e)))?;

        Ok(AuthorizationRequest {
            url: url.to_string(),
            verifier: None,
        })
    }

    async fn exchange_code_for_token(
        &self,
        code: &str,
        redirect_uri: &str,
        _verifier: Option<&str>,
    ) -> PlatformResult<TokenResponse> {
        let (app_id, app_secret) = self.app_credentials()?;
        let url = format!(
            "{}/oauth/access_token",
            self.config.graph_url.trim_end_matches('/')
        );

        let response = self
            .client
            .get(url)
            .query(&[
                ("client_id", app_id),
                ("client_secret", app_secret),
                ("redirect_uri", redirect_uri),
                ("code", code),
            ])
            .send()
            .await
            .map_err(|e| map_send_error("facebook token exchange", e))?;

        let body = read_success_body("facebook token exchange", response)
            .await
            .map_err(|e| match e {
                PlatformError::Upstream { status, detail } => {
                    PlatformError::Exchange(format!("HTTP {}: {}", status, detail))
                }
                other => other,
            })?;

        TokenResponse::from_json(&body, None).map_err(PlatformError::Exchange)
    }
}
