//! Authorization-code flows backed by the SQLite credential store

use anyhow::Result;
use libfanpost::config::TikTokConfig;
use libfanpost::error::{FanpostError, PlatformError};
use libfanpost::oauth::{code_challenge, OAuthFlow};
use libfanpost::platforms::tiktok::TikTokPlatform;
use libfanpost::platforms::{build_http_client, PlatformRegistry};
use libfanpost::tokens::TokenStore;
use libfanpost::types::PlatformKind;
use libfanpost::Database;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER: &str = "creator-7";

struct Harness {
    _temp_dir: TempDir,
    tokens: Arc<TokenStore>,
    flow: OAuthFlow,
}

async fn harness(server: &MockServer) -> Result<Harness> {
    let temp_dir = TempDir::new()?;
    let db = Database::new(&temp_dir.path().join("fanpost.db").to_string_lossy()).await?;
    let tokens = Arc::new(TokenStore::new(Arc::new(db)));

    let config = TikTokConfig {
        client_key: "ck".to_string(),
        client_secret: "cs".to_string(),
        redirect_uri: "https://example.com/tiktok/callback".to_string(),
        auth_url: "https://www.tiktok.com/v2/auth/authorize/".to_string(),
        token_url: format!("{}/v2/oauth/token/", server.uri()),
        api_base: format!("{}/v2", server.uri()),
        scopes: "video.upload,video.publish".to_string(),
        privacy_level: "SELF_ONLY".to_string(),
    };
    let tiktok = TikTokPlatform::new(
        config,
        build_http_client(Duration::from_secs(5))?,
        Duration::from_secs(5),
    );
    let registry = Arc::new(PlatformRegistry::new().with(Arc::new(tiktok)));

    Ok(Harness {
        _temp_dir: temp_dir,
        flow: OAuthFlow::new(registry, tokens.clone()),
        tokens,
    })
}

fn query_param(url: &str, name: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

#[tokio::test]
async fn test_begin_then_complete_consumes_verifier() -> Result<()> {
    let server = MockServer::start().await;
    let h = harness(&server).await?;

    let url = h.flow.begin(USER, PlatformKind::TikTok, None)?;
    let verifier = h.tokens.get_verifier(USER, PlatformKind::TikTok).unwrap();

    assert_eq!(query_param(&url, "client_key").as_deref(), Some("ck"));
    assert_eq!(query_param(&url, "response_type").as_deref(), Some("code"));
    assert_eq!(query_param(&url, "code_challenge_method").as_deref(), Some("S256"));
    assert_eq!(query_param(&url, "state").as_deref(), Some(USER));
    assert_eq!(
        query_param(&url, "code_challenge"),
        Some(code_challenge(&verifier.verifier))
    );

    Mock::given(method("POST"))
        .and(path("/v2/oauth/token/"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code-1"))
        .and(body_string_contains(format!("code_verifier={}", verifier.verifier)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "act.first",
            "refresh_token": "rft.first",
            "expires_in": 86400,
            "open_id": "oid-7"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let credential = h
        .flow
        .complete(USER, PlatformKind::TikTok, "auth-code-1", None)
        .await?;
    assert_eq!(credential.access_token, "act.first");
    assert_eq!(credential.refresh_token.as_deref(), Some("rft.first"));
    assert!(credential.expires_at.is_some());

    assert!(h.tokens.get_verifier(USER, PlatformKind::TikTok).is_none());
    assert!(h.tokens.has_credential(USER, PlatformKind::TikTok).await);
    assert_eq!(
        h.tokens.connected_platforms(USER).await,
        vec![PlatformKind::TikTok]
    );
    Ok(())
}

#[tokio::test]
async fn test_complete_without_begin_needs_auth() -> Result<()> {
    let server = MockServer::start().await;
    let h = harness(&server).await?;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = h
        .flow
        .complete(USER, PlatformKind::TikTok, "auth-code-1", None)
        .await;
    assert!(matches!(
        result,
        Err(FanpostError::Platform(PlatformError::AuthRequired(_)))
    ));
    Ok(())
}

#[tokio::test]
async fn test_rejected_exchange_keeps_verifier() -> Result<()> {
    let server = MockServer::start().await;
    let h = harness(&server).await?;
    h.flow.begin(USER, PlatformKind::TikTok, None)?;

    Mock::given(method("POST"))
        .and(path("/v2/oauth/token/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Authorization code is expired."
        })))
        .mount(&server)
        .await;

    let result = h
        .flow
        .complete(USER, PlatformKind::TikTok, "stale-code", None)
        .await;
    assert!(matches!(
        result,
        Err(FanpostError::Platform(PlatformError::Exchange(ref detail))) if detail.contains("invalid_grant")
    ));

    assert!(h.tokens.get_verifier(USER, PlatformKind::TikTok).is_some());
    assert!(!h.tokens.has_credential(USER, PlatformKind::TikTok).await);
    Ok(())
}

#[tokio::test]
async fn test_unregistered_platform_not_configured() -> Result<()> {
    let server = MockServer::start().await;
    let h = harness(&server).await?;

    let result = h.flow.begin(USER, PlatformKind::Instagram, None);
    assert!(matches!(
        result,
        Err(FanpostError::Platform(PlatformError::NotConfigured(_)))
    ));
    Ok(())
}
