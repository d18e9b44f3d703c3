//! Instagram Business publishing
//!
//! Two Graph API calls around a hosted image: create a media container from
//! the image URL, wait for Instagram to fetch it, then publish the container.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::image_host::ImageHost;
use super::{json_str, map_send_error, read_success_json, Platform, PlatformResult};
use crate::config::InstagramConfig;
use crate::error::{PlatformError, Result};
use crate::types::{compose_caption, ContentPayload, PlatformKind};

pub struct InstagramPlatform {
    config: InstagramConfig,
    client: reqwest::Client,
    image_host: Arc<ImageHost>,
    publish_delay: Duration,
}

impl InstagramPlatform {
    pub fn new(
        config: InstagramConfig,
        client: reqwest::Client,
        image_host: Arc<ImageHost>,
    ) -> Result<Self> {
        let publish_delay = config.publish_delay()?;
        Ok(Self {
            config,
            client,
            image_host,
            publish_delay,
        })
    }

    fn endpoint(&self, edge: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.graph_url.trim_end_matches('/'),
            self.config.business_account_id,
            edge
        )
    }

    async fn create_container(&self, token: &str, image_url: &str, caption: &str) -> PlatformResult<String> {
        let response = self
            .client
            .post(self.endpoint("media"))
            .form(&[
                ("image_url", image_url),
                ("caption", caption),
                ("access_token", token),
            ])
            .send()
            .await
            .map_err(|e| map_send_error("instagram container", e))?;

        let json = read_success_json("instagram container", response).await?;
        json_str(&json, "id").ok_or_else(|| PlatformError::Upstream {
            status: 200,
            detail: format!("container response without id: {}", json),
        })
    }

    async fn publish_container(&self, token: &str, creation_id: &str) -> PlatformResult<String> {
        let response = self
            .client
            .post(self.endpoint("media_publish"))
            .form(&[("creation_id", creation_id), ("access_token", token)])
            .send()
            .await
            .map_err(|e| map_send_error("instagram publish", e))?;

        let json = read_success_json("instagram publish", response).await?;
        json_str(&json, "id").ok_or_else(|| PlatformError::Upstream {
            status: 200,
            detail: format!("publish response without id: {}", json),
        })
    }
}

#[async_trait]
impl Platform for InstagramPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Instagram
    }

    fn validate_content(&self, content: &ContentPayload) -> PlatformResult<()> {
        match &content.media {
            Some(media) if media.is_image() => Ok(()),
            Some(media) => Err(PlatformError::Validation(format!(
                "Instagram posts need an image, got {}",
                media.mime_type()
            ))),
            None => Err(PlatformError::Validation(
                "Instagram posts need an image".to_string(),
            )),
        }
    }

    async fn publish(
        &self,
        content: &ContentPayload,
        access_token: Option<&str>,
    ) -> PlatformResult<String> {
        self.validate_content(content)?;
        let media = content
            .media
            .as_ref()
            .ok_or_else(|| PlatformError::Validation("Instagram posts need an image".to_string()))?;

        let token = access_token.unwrap_or(&self.config.access_token);
        let caption = compose_caption(
            content.text_for(PlatformKind::Instagram),
            content.hashtags_for(PlatformKind::Instagram),
            None,
        );

        let image_url = self.image_host.upload(media).await?;
        let creation_id = self.create_container(token, &image_url, &caption).await?;
        debug!(creation_id = %creation_id, "Instagram container created");

        // Instagram fetches the image asynchronously
        if !self.publish_delay.is_zero() {
            tokio::time::sleep(self.publish_delay).await;
        }

        let post_id = self.publish_container(token, &creation_id).await?;
        info!(post_id = %post_id, "Published to Instagram");
        Ok(post_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImageHostConfig;
    use crate::media::StagedMedia;
    use crate::platforms::build_http_client;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn platform(server: &MockServer) -> InstagramPlatform {
        let client = build_http_client(Duration::from_secs(5)).unwrap();
        let host = Arc::new(ImageHost::new(
            ImageHostConfig {
                api_key: "k".to_string(),
                upload_url: format!("{}/1/upload", server.uri()),
                expiration: Some(600),
            },
            client.clone(),
            Duration::from_secs(5),
        ));
        InstagramPlatform::new(
            InstagramConfig {
                business_account_id: "ig-1".to_string(),
                access_token: "ig-token".to_string(),
                graph_url: format!("{}/v18.0", server.uri()),
                publish_delay: "0s".to_string(),
            },
            client,
            host,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_publish_two_step() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"url": "https://i.ibb.co/x/p.jpg"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v18.0/ig-1/media"))
            .and(body_string_contains("image_url=https%3A%2F%2Fi.ibb.co%2Fx%2Fp.jpg"))
            .and(body_string_contains("access_token=ig-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "container-7"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v18.0/ig-1/media_publish"))
            .and(body_string_contains("creation_id=container-7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "17900000000"})))
            .expect(1)
            .mount(&server)
            .await;

        let content = ContentPayload::new("Hola")
            .with_media(StagedMedia::new(vec![0xffu8, 0xd8], "image/jpeg"));
        let id = platform(&server).publish(&content, None).await.unwrap();
        assert_eq!(id, "17900000000");
    }

    #[tokio::test]
    async fn test_container_failure_skips_publish() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"url": "https://i.ibb.co/x/p.jpg"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v18.0/ig-1/media"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Invalid image URL"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v18.0/ig-1/media_publish"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let content = ContentPayload::new("Hola")
            .with_media(StagedMedia::new(vec![1u8], "image/png"));
        let err = platform(&server).publish(&content, None).await.unwrap_err();
        assert_eq!(err.status(), Some(400));
    }

    #[tokio::test]
    async fn test_requires_image() {
        let server = MockServer::start().await;
        let content = ContentPayload::new("Hola").with_media(StagedMedia::new(vec![1u8], "video/mp4"));
        let result = platform(&server).publish(&content, None).await;
        assert!(matches!(result, Err(PlatformError::Validation(_))));
    }
}
