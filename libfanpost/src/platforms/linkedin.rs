//! LinkedIn publishing through an automation relay webhook
//!
//! The image is hosted publicly first; the relay receives the text and image
//! URL and creates the LinkedIn post on its side.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use super::image_host::ImageHost;
use super::{json_str, map_send_error, Platform, PlatformResult};
use crate::config::LinkedInConfig;
use crate::error::PlatformError;
use crate::types::{compose_caption, ContentPayload, PlatformKind};

pub struct LinkedInPlatform {
    config: LinkedInConfig,
    client: reqwest::Client,
    image_host: Arc<ImageHost>,
}

impl LinkedInPlatform {
    pub fn new(config: LinkedInConfig, client: reqwest::Client, image_host: Arc<ImageHost>) -> Self {
        Self {
            config,
            client,
            image_host,
        }
    }
}

#[async_trait]
impl Platform for LinkedInPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::LinkedIn
    }

    fn validate_content(&self, content: &ContentPayload) -> PlatformResult<()> {
        match &content.media {
            Some(media) if media.is_image() => Ok(()),
            _ => Err(PlatformError::Validation(
                "LinkedIn posts need an image".to_string(),
            )),
        }
    }

    async fn publish(
        &self,
        content: &ContentPayload,
        _access_token: Option<&str>,
    ) -> PlatformResult<String> {
        self.validate_content(content)?;
        let media = content
            .media
            .as_ref()
            .ok_or_else(|| PlatformError::Validation("LinkedIn posts need an image".to_string()))?;

        let text = compose_caption(
            content.text_for(PlatformKind::LinkedIn),
            content.hashtags_for(PlatformKind::LinkedIn),
            None,
        );
        let image_url = self.image_host.upload(media).await?;

        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&json!({
                "text": text,
                "image_url": image_url,
                "platform": "linkedin",
            }))
            .send()
            .await
            .map_err(|e| map_send_error("linkedin relay", e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| map_send_error("linkedin relay", e))?;

        if status != 200 && status != 201 {
            return Err(PlatformError::Upstream {
                status,
                detail: body,
            });
        }

        // Relays usually answer "Accepted", an HTML page or nothing; only a
        // JSON `id` is a real post identifier
        let external_id = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| json_str(&value, "id"))
            .unwrap_or_else(|| format!("linkedin-{}", uuid::Uuid::new_v4()));

        info!(external_id = %external_id, "Sent post to LinkedIn relay");
        Ok(external_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImageHostConfig;
    use crate::media::StagedMedia;
    use crate::platforms::build_http_client;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn platform(server: &MockServer) -> LinkedInPlatform {
        let client = build_http_client(Duration::from_secs(5)).unwrap();
        let host = Arc::new(ImageHost::new(
            ImageHostConfig {
                api_key: "k".to_string(),
                upload_url: format!("{}/1/upload", server.uri()),
                expiration: None,
            },
            client.clone(),
            Duration::from_secs(5),
        ));
        LinkedInPlatform::new(
            LinkedInConfig {
                webhook_url: format!("{}/hook", server.uri()),
            },
            client,
            host,
        )
    }

    async fn mount_host(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/1/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"url": "https://i.ibb.co/l/in.png"}
            })))
            .mount(server)
            .await;
    }

    fn content() -> ContentPayload {
        ContentPayload::new("Career fair")
            .with_hashtags(["#jobs"])
            .with_media(StagedMedia::new(vec![1u8], "image/png"))
    }

    #[tokio::test]
    async fn test_relay_payload() {
        let server = MockServer::start().await;
        mount_host(&server).await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_json(json!({
                "text": "Career fair\n\n#jobs",
                "image_url": "https://i.ibb.co/l/in.png",
                "platform": "linkedin"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("Accepted"))
            .expect(1)
            .mount(&server)
            .await;

        let id = platform(&server).publish(&content(), None).await.unwrap();
        assert!(id.starts_with("linkedin-"));
    }

    #[tokio::test]
    async fn test_json_id_used_as_external_id() {
        let server = MockServer::start().await;
        mount_host(&server).await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"id": "urn:li:share:6844785523593134080"})),
            )
            .mount(&server)
            .await;

        let id = platform(&server).publish(&content(), None).await.unwrap();
        assert_eq!(id, "urn:li:share:6844785523593134080");
    }

    #[tokio::test]
    async fn test_html_response_gets_generated_id() {
        let server = MockServer::start().await;
        mount_host(&server).await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html><body>Accepted</body></html>"),
            )
            .mount(&server)
            .await;

        let id = platform(&server).publish(&content(), None).await.unwrap();
        assert!(id.starts_with("linkedin-"));
        assert!(!id.contains("html"));
    }

    #[tokio::test]
    async fn test_empty_response_gets_generated_id() {
        let server = MockServer::start().await;
        mount_host(&server).await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let id = platform(&server).publish(&content(), None).await.unwrap();
        assert!(id.starts_with("linkedin-"));
    }

    #[tokio::test]
    async fn test_relay_rejection() {
        let server = MockServer::start().await;
        mount_host(&server).await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(410).set_body_string("There is no scenario listening for this webhook."))
            .mount(&server)
            .await;

        let err = platform(&server).publish(&content(), None).await.unwrap_err();
        assert_eq!(err.status(), Some(410));
        assert!(err.to_string().contains("no scenario"));
    }
}
