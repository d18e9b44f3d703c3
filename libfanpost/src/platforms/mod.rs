//! Platform abstraction and implementations
//!
//! Each supported network implements [`Platform`]. Adapters are looked up by
//! [`PlatformKind`] through a [`PlatformRegistry`] built from the
//! configuration, so only configured platforms are ever invoked.
//!
//! # Examples
//!
//! ```no_run
//! use libfanpost::config::Config;
//! use libfanpost::platforms::PlatformRegistry;
//! use libfanpost::types::PlatformKind;
//!
//! # fn example() -> libfanpost::error::Result<()> {
//! let config = Config::load()?;
//! let registry = PlatformRegistry::from_config(&config)?;
//!
//! if let Some(tiktok) = registry.get(PlatformKind::TikTok) {
//!     println!("{} uses PKCE: {}", tiktok.name(), tiktok.uses_pkce());
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{PlatformError, Result};
use crate::oauth::{AuthorizationRequest, TokenResponse};
use crate::types::{ContentPayload, PlatformKind};

pub mod facebook;
pub mod image_host;
pub mod instagram;
pub mod linkedin;
pub mod tiktok;
pub mod whatsapp;

// Compiled for all builds so integration tests can drive the orchestrator
pub mod mock;

/// Result type returned by adapters
pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Unified interface over the supported social networks
///
/// `publish` returns the platform-side identifier of the new post. Ordinary
/// upstream rejections come back as `Err(PlatformError)`; the orchestrator turns
/// them into per-platform results.
#[async_trait]
pub trait Platform: Send + Sync {
    fn kind(&self) -> PlatformKind;

    /// Lowercase identifier, e.g. "tiktok"
    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Check the payload before any network call
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Validation` when the content cannot be published
    /// here (missing or wrong media type, empty text).
    fn validate_content(&self, content: &ContentPayload) -> PlatformResult<()>;

    /// Publish the content
    ///
    /// # Arguments
    ///
    /// * `content` - The shared payload; adapters read `text_for`/`hashtags_for`
    /// * `access_token` - The user's stored token, when one exists. Platforms
    ///   that publish with configured tokens may ignore it.
    async fn publish(
        &self,
        content: &ContentPayload,
        access_token: Option<&str>,
    ) -> PlatformResult<String>;

    /// Whether the authorization flow needs a PKCE verifier
    fn uses_pkce(&self) -> bool {
        false
    }

    /// Redirect URI from the platform's configuration, if any
    fn default_redirect_uri(&self) -> Option<&str> {
        None
    }

    /// Build the URL the user visits to grant access
    fn build_authorization_url(
        &self,
        _redirect_uri: &str,
        _user_id: &str,
    ) -> PlatformResult<AuthorizationRequest> {
        Err(PlatformError::NotSupported(format!(
            "{} does not support OAuth authorization",
            self.name()
        )))
    }

    /// Trade an authorization code for tokens
    async fn exchange_code_for_token(
        &self,
        _code: &str,
        _redirect_uri: &str,
        _verifier: Option<&str>,
    ) -> PlatformResult<TokenResponse> {
        Err(PlatformError::NotSupported(format!(
            "{} does not support OAuth code exchange",
            self.name()
        )))
    }

    /// Trade a refresh token for a new access token
    async fn refresh_token(&self, _refresh_token: &str) -> PlatformResult<TokenResponse> {
        Err(PlatformError::NotSupported(format!(
            "{} does not support token refresh",
            self.name()
        )))
    }
}

/// Configured adapters keyed by platform
#[derive(Default, Clone)]
pub struct PlatformRegistry {
    platforms: HashMap<PlatformKind, Arc<dyn Platform>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any earlier one of the same kind
    pub fn register(&mut self, platform: Arc<dyn Platform>) {
        self.platforms.insert(platform.kind(), platform);
    }

    pub fn with(mut self, platform: Arc<dyn Platform>) -> Self {
        self.register(platform);
        self
    }

    pub fn get(&self, kind: PlatformKind) -> Option<Arc<dyn Platform>> {
        self.platforms.get(&kind).cloned()
    }

    /// Registered platforms in canonical order
    pub fn kinds(&self) -> Vec<PlatformKind> {
        PlatformKind::ALL
            .into_iter()
            .filter(|k| self.platforms.contains_key(k))
            .collect()
    }

    /// Build adapters for every platform section present in the configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = build_http_client(config.http.timeout()?)?;
        let upload_timeout = config.http.upload_timeout()?;
        let mut registry = Self::new();

        if let Some(tiktok) = &config.tiktok {
            registry.register(Arc::new(tiktok::TikTokPlatform::new(
                tiktok.clone(),
                client.clone(),
                upload_timeout,
            )));
        }

        if let Some(facebook) = &config.facebook {
            registry.register(Arc::new(facebook::FacebookPlatform::new(
                facebook.clone(),
                client.clone(),
                upload_timeout,
            )));
        }

        let image_host = config
            .image_host
            .as_ref()
            .map(|c| Arc::new(image_host::ImageHost::new(c.clone(), client.clone(), upload_timeout)));

        if let (Some(instagram), Some(host)) = (&config.instagram, &image_host) {
            registry.register(Arc::new(instagram::InstagramPlatform::new(
                instagram.clone(),
                client.clone(),
                host.clone(),
            )?));
        }

        if let (Some(linkedin), Some(host)) = (&config.linkedin, &image_host) {
            registry.register(Arc::new(linkedin::LinkedInPlatform::new(
                linkedin.clone(),
                client.clone(),
                host.clone(),
            )));
        }

        if let Some(whatsapp) = &config.whatsapp {
            registry.register(Arc::new(whatsapp::WhatsAppPlatform::new(
                whatsapp.clone(),
                client.clone(),
            )));
        }

        Ok(registry)
    }
}

/// Shared HTTP client with a default per-request timeout
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .user_agent(concat!("fanpost/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)).into())
}

/// Classify a transport failure
pub(crate) fn map_send_error(context: &str, e: reqwest::Error) -> PlatformError {
    if e.is_timeout() {
        PlatformError::Timeout(format!("{}: {}", context, e))
    } else if e.is_connect() {
        PlatformError::Network(format!("{}: connection error: {}", context, e))
    } else {
        PlatformError::Network(format!("{}: {}", context, e))
    }
}

/// Read the body of a response, turning non-2xx statuses into `Upstream`
///
/// The body is kept verbatim as the error detail.
pub(crate) async fn read_success_body(
    context: &str,
    response: reqwest::Response,
) -> PlatformResult<String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| map_send_error(context, e))?;

    if !status.is_success() {
        return Err(PlatformError::Upstream {
            status: status.as_u16(),
            detail: body,
        });
    }

    Ok(body)
}

/// Like [`read_success_body`], then parse the body as JSON
pub(crate) async fn read_success_json(
    context: &str,
    response: reqwest::Response,
) -> PlatformResult<Value> {
    let status = response.status().as_u16();
    let body = read_success_body(context, response).await?;
    serde_json::from_str(&body).map_err(|_| PlatformError::Upstream {
        status,
        detail: format!("{}: unexpected response body: {}", context, body),
    })
}

/// Read a string (or number) field from a JSON object
pub(crate) fn json_str(value: &Value, field: &str) -> Option<String> {
    match value.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
