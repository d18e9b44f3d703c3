//! Temporary public hosting for images
//!
//! Instagram and the LinkedIn relay only accept media by URL, so images are
//! first uploaded to an imgbb-compatible host that expires them after a short
//! while.

use reqwest::multipart::{Form, Part};
use std::time::Duration;
use tracing::debug;

use super::{map_send_error, read_success_json, PlatformResult};
use crate::config::ImageHostConfig;
use crate::error::PlatformError;
use crate::media::StagedMedia;

pub struct ImageHost {
    config: ImageHostConfig,
    client: reqwest::Client,
    upload_timeout: Duration,
}

impl ImageHost {
    pub fn new(config: ImageHostConfig, client: reqwest::Client, upload_timeout: Duration) -> Self {
        Self {
            config,
            client,
            upload_timeout,
        }
    }

    /// Upload an image and return its public URL
    pub async fn upload(&self, media: &StagedMedia) -> PlatformResult<String> {
        if !media.is_image() {
            return Err(PlatformError::Validation(format!(
                "image host only accepts images, got {}",
                media.mime_type()
            )));
        }

        let part = Part::bytes(media.bytes().to_vec())
            .file_name(media.file_name().unwrap_or("image").to_string())
            .mime_str(media.mime_type())
            .map_err(|e| PlatformError::Validation(format!("invalid mime type: {}", e)))?;

        let mut form = Form::new()
            .text("key", self.config.api_key.clone())
            .part("image", part);
        if let Some(expiration) = self.config.expiration {
            form = form.text("expiration", expiration.to_string());
        }

        let response = self
            .client
            .post(&self.config.upload_url)
            .timeout(self.upload_timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| map_send_error("image host upload", e))?;

        let json = read_success_json("image host upload", response).await?;
        let url = json
            .get("data")
            .and_then(|d| d.get("url"))
            .and_then(|u| u.as_str())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| PlatformError::Upload {
                status: None,
                detail: format!("image host response missing data.url: {}", json),
            })?;

        debug!(url, "Hosted image");
        Ok(url.to_string())
    }
}
