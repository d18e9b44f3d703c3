//! WhatsApp Cloud API delivery
//!
//! Generated content is sent as a pre-approved template message whose single
//! body parameter carries the text.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde_json::json;
use tracing::info;

use super::{json_str, map_send_error, read_success_json, Platform, PlatformResult};
use crate::config::WhatsAppConfig;
use crate::error::PlatformError;
use crate::types::{compose_caption, truncate_chars, ContentPayload, PlatformKind};

/// Template body parameters are capped at 1024 characters upstream
pub const MAX_TEMPLATE_TEXT_CHARS: usize = 1000;

pub struct WhatsAppPlatform {
    config: WhatsAppConfig,
    client: reqwest::Client,
}

impl WhatsAppPlatform {
    pub fn new(config: WhatsAppConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/{}/{}/messages",
            self.config.graph_root.trim_end_matches('/'),
            self.config.api_version,
            self.config.phone_number_id
        )
    }
}

#[async_trait]
impl Platform for WhatsAppPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::WhatsApp
    }

    fn validate_content(&self, content: &ContentPayload) -> PlatformResult<()> {
        if content.text_for(PlatformKind::WhatsApp).trim().is_empty() {
            return Err(PlatformError::Validation(
                "WhatsApp messages need text".to_string(),
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

        let token = access_token.unwrap_or(&self.config.token);
        let text = truncate_chars(
            &compose_caption(
                content.text_for(PlatformKind::WhatsApp),
                content.hashtags_for(PlatformKind::WhatsApp),
                None,
            ),
            MAX_TEMPLATE_TEXT_CHARS,
        );

        let payload = json!({
            "messaging_product": "whatsapp",
            "to": self.config.recipient,
            "type": "template",
            "template": {
                "name": self.config.template_name,
                "language": {"code": self.config.language},
                "components": [{
                    "type": "body",
                    "parameters": [{"type": "text", "text": text}]
                }]
            }
        });

        let response = self
            .client
            .post(self.messages_url())
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .json(&payload)
            .send()
            .await
            .map_err(|e| map_send_error("whatsapp message", e))?;

        let json = read_success_json("whatsapp message", response).await?;
        let message_id = json
            .get("messages")
            .and_then(|m| m.get(0))
            .and_then(|m| json_str(m, "id"))
            .ok_or_else(|| PlatformError::Upstream {
                status: 200,
                detail: format!("message response without id: {}", json),
            })?;

        info!(message_id = %message_id, "Sent WhatsApp template message");
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::build_http_client;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn platform(server: &MockServer) -> WhatsAppPlatform {
        WhatsAppPlatform::new(
            WhatsAppConfig {
                token: "wa-token".to_string(),
                phone_number_id: "10987".to_string(),
                recipient: "59170000000".to_string(),
                api_version: "v18.0".to_string(),
                graph_root: server.uri(),
                template_name: "contenido_generado".to_string(),
                language: "es".to_string(),
            },
            build_http_client(Duration::from_secs(5)).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_template_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v18.0/10987/messages"))
            .and(header("Authorization", "Bearer wa-token"))
            .and(body_partial_json(json!({
                "messaging_product": "whatsapp",
                "to": "59170000000",
                "type": "template",
                "template": {
                    "name": "contenido_generado",
                    "language": {"code": "es"},
                    "components": [{
                        "type": "body",
                        "parameters": [{"type": "text", "text": "Inscripciones abiertas\n\n#uni"}]
                    }]
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messaging_product": "whatsapp",
                "messages": [{"id": "wamid.HBgL"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let content = ContentPayload::new("Inscripciones abiertas").with_hashtags(["uni"]);
        let id = platform(&server).publish(&content, None).await.unwrap();
        assert_eq!(id, "wamid.HBgL");
    }

    #[tokio::test]
    async fn test_text_truncated() {
        let server = MockServer::start().await;
        let long = "a".repeat(1500);
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "template": {"components": [{"parameters": [{"text": "a".repeat(1000)}]}]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"messages": [{"id": "m1"}]})))
            .expect(1)
            .mount(&server)
            .await;

        let id = platform(&server)
            .publish(&ContentPayload::new(long), None)
            .await
            .unwrap();
        assert_eq!(id, "m1");
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string(
                r#"{"error":{"message":"Invalid OAuth access token.","code":190}}"#,
            ))
            .mount(&server)
            .await;

        let err = platform(&server)
            .publish(&ContentPayload::new("hola"), None)
            .await
            .unwrap_err();
        assert!(err.is_auth_failure());
    }

    #[tokio::test]
    async fn test_requires_text() {
        let server = MockServer::start().await;
        let result = platform(&server).publish(&ContentPayload::new(""), None).await;
        assert!(matches!(result, Err(PlatformError::Validation(_))));
    }
}
