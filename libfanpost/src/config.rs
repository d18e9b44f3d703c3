//! Configuration management for Fanpost

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub tokens: TokensConfig,
    pub tiktok: Option<TikTokConfig>,
    pub facebook: Option<FacebookConfig>,
    pub instagram: Option<InstagramConfig>,
    pub linkedin: Option<LinkedInConfig>,
    pub whatsapp: Option<WhatsAppConfig>,
    pub image_host: Option<ImageHostConfig>,
    pub generator: Option<GeneratorConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    pub dir: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            dir: "~/.local/share/fanpost/media".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Timeout for ordinary API calls (humantime, e.g. "30s")
    #[serde(default = "default_timeout")]
    pub timeout: String,
    /// Timeout for media uploads
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            upload_timeout: default_upload_timeout(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Result<Duration> {
        parse_duration("http.timeout", &self.timeout)
    }

    pub fn upload_timeout(&self) -> Result<Duration> {
        parse_duration("http.upload_timeout", &self.upload_timeout)
    }
}

/// Where credentials are kept
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenBackendKind {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokensConfig {
    #[serde(default)]
    pub backend: TokenBackendKind,
    /// How long an unused PKCE verifier stays valid
    #[serde(default = "default_verifier_ttl")]
    pub verifier_ttl: String,
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            backend: TokenBackendKind::default(),
            verifier_ttl: default_verifier_ttl(),
        }
    }
}

impl TokensConfig {
    pub fn verifier_ttl(&self) -> Result<Duration> {
        parse_duration("tokens.verifier_ttl", &self.verifier_ttl)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TikTokConfig {
    pub client_key: String,
    pub client_secret: String,
    pub redirect_uri: String,
    #[serde(default = "default_tiktok_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_tiktok_token_url")]
    pub token_url: String,
    #[serde(default = "default_tiktok_api_base")]
    pub api_base: String,
    #[serde(default = "default_tiktok_scopes")]
    pub scopes: String,
    #[serde(default = "default_privacy_level")]
    pub privacy_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacebookConfig {
    pub page_id: String,
    pub page_access_token: String,
    pub app_id: Option<String>,
    pub app_secret: Option<String>,
    pub redirect_uri: Option<String>,
    #[serde(default = "default_graph_url")]
    pub graph_url: String,
    #[serde(default = "default_facebook_dialog_url")]
    pub dialog_url: String,
    #[serde(default = "default_facebook_scopes")]
    pub scopes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstagramConfig {
    pub business_account_id: String,
    pub access_token: String,
    #[serde(default = "default_graph_url")]
    pub graph_url: String,
    /// Pause between container creation and publish
    #[serde(default = "default_publish_delay")]
    pub publish_delay: String,
}

impl InstagramConfig {
    pub fn publish_delay(&self) -> Result<Duration> {
        parse_duration("instagram.publish_delay", &self.publish_delay)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedInConfig {
    pub webhook_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    pub token: String,
    pub phone_number_id: String,
    pub recipient: String,
    #[serde(default = "default_whatsapp_version")]
    pub api_version: String,
    #[serde(default = "default_graph_root")]
    pub graph_root: String,
    #[serde(default = "default_whatsapp_template")]
    pub template_name: String,
    #[serde(default = "default_whatsapp_language")]
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageHostConfig {
    pub api_key: String,
    #[serde(default = "default_image_host_url")]
    pub upload_url: String,
    /// Seconds until the hosted copy is removed
    #[serde(default = "default_image_expiration")]
    pub expiration: Option<u64>,
}

/// External program that turns a topic into per-platform content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Program followed by its arguments
    pub command: Vec<String>,
    #[serde(default = "default_generator_timeout")]
    pub timeout: String,
}

impl GeneratorConfig {
    pub fn timeout(&self) -> Result<Duration> {
        parse_duration("generator.timeout", &self.timeout)
    }
}

fn default_generator_timeout() -> String {
    "120s".to_string()
}

fn default_timeout() -> String {
    "30s".to_string()
}

fn default_upload_timeout() -> String {
    "300s".to_string()
}

fn default_verifier_ttl() -> String {
    "10m".to_string()
}

fn default_tiktok_auth_url() -> String {
    "https://www.tiktok.com/v2/auth/authorize/".to_string()
}

fn default_tiktok_token_url() -> String {
    "https://open.tiktokapis.com/v2/oauth/token/".to_string()
}

fn default_tiktok_api_base() -> String {
    "https://open.tiktokapis.com/v2".to_string()
}

fn default_tiktok_scopes() -> String {
    "video.upload,video.publish,user.info.basic".to_string()
}

fn default_privacy_level() -> String {
    "SELF_ONLY".to_string()
}

fn default_graph_url() -> String {
    "https://graph.facebook.com/v18.0".to_string()
}

fn default_graph_root() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_facebook_dialog_url() -> String {
    "https://www.facebook.com/v18.0/dialog/oauth".to_string()
}

fn default_facebook_scopes() -> String {
    "pages_manage_posts,pages_read_engagement".to_string()
}

fn default_publish_delay() -> String {
    "3s".to_string()
}

fn default_whatsapp_version() -> String {
    "v18.0".to_string()
}

fn default_whatsapp_template() -> String {
    "contenido_generado".to_string()
}

fn default_whatsapp_language() -> String {
    "es".to_string()
}

fn default_image_host_url() -> String {
    "https://api.imgbb.com/1/upload".to_string()
}

fn default_image_expiration() -> Option<u64> {
    Some(600)
}

fn parse_duration(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value).map_err(|e| {
        ConfigError::InvalidValue {
            field: field.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would only fail later at publish time
    pub fn validate(&self) -> Result<()> {
        self.http.timeout()?;
        self.http.upload_timeout()?;
        self.tokens.verifier_ttl()?;

        if let Some(tiktok) = &self.tiktok {
            require("tiktok.client_key", &tiktok.client_key)?;
            require("tiktok.client_secret", &tiktok.client_secret)?;
            require("tiktok.redirect_uri", &tiktok.redirect_uri)?;
        }
        if let Some(facebook) = &self.facebook {
            require("facebook.page_id", &facebook.page_id)?;
            require("facebook.page_access_token", &facebook.page_access_token)?;
        }
        if let Some(instagram) = &self.instagram {
            require("instagram.business_account_id", &instagram.business_account_id)?;
            instagram.publish_delay()?;
            if self.image_host.is_none() {
                return Err(ConfigError::MissingField("image_host".to_string()).into());
            }
        }
        if let Some(linkedin) = &self.linkedin {
            require("linkedin.webhook_url", &linkedin.webhook_url)?;
            if self.image_host.is_none() {
                return Err(ConfigError::MissingField("image_host".to_string()).into());
            }
        }
        if let Some(whatsapp) = &self.whatsapp {
            require("whatsapp.phone_number_id", &whatsapp.phone_number_id)?;
            require("whatsapp.recipient", &whatsapp.recipient)?;
        }
        if let Some(generator) = &self.generator {
            match generator.command.first() {
                Some(program) => require("generator.command", program)?,
                None => return Err(ConfigError::MissingField("generator.command".to_string()).into()),
            }
            generator.timeout()?;
        }

        Ok(())
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/fanpost/fanpost.db".to_string(),
            },
            media: MediaConfig::default(),
            http: HttpConfig::default(),
            tokens: TokensConfig::default(),
            tiktok: None,
            facebook: None,
            instagram: None,
            linkedin: None,
            whatsapp: None,
            image_host: None,
            generator: None,
        }
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(field.to_string()).into());
    }
    Ok(())
}

/// Resolve the configuration file path following the XDG base directory layout
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("FANPOST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("fanpost").join("config.toml"))
}

/// Resolve the data directory path following the XDG base directory layout
pub fn resolve_data_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("fanpost"))
}
