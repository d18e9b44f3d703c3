//! Service facade shared by the command-line tools
//!
//! `FanpostService` wires one `Config` into the database, token store,
//! media store, platform registry, publisher and OAuth flow, so every front
//! end builds them the same way.

use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::config::{Config, TokenBackendKind};
use crate::content::{CommandGenerator, ContentPipeline};
use crate::db::Database;
use crate::error::{FanpostError, Result};
use crate::media::{stage_file, LocalMediaStore, MediaStore, StagedMedia};
use crate::oauth::OAuthFlow;
use crate::platforms::PlatformRegistry;
use crate::poster::Publisher;
use crate::tokens::{CredentialBackend, MemoryBackend, TokenStore};

pub struct FanpostService {
    config: Arc<Config>,
    db: Database,
    tokens: Arc<TokenStore>,
    media: Arc<dyn MediaStore>,
    registry: Arc<PlatformRegistry>,
    publisher: Arc<Publisher>,
    oauth: OAuthFlow,
}

impl FanpostService {
    /// Create a service from the configuration at the default location
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    /// Create a service from an already loaded configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated, or if
    /// a configured duration is malformed.
    pub async fn from_config(config: Config) -> Result<Self> {
        let db = Database::new(&config.database.path).await?;

        let backend: Arc<dyn CredentialBackend> = match config.tokens.backend {
            TokenBackendKind::Sqlite => Arc::new(db.clone()),
            TokenBackendKind::Memory => Arc::new(MemoryBackend::new()),
        };
        let tokens = Arc::new(
            TokenStore::new(backend).with_verifier_ttl(config.tokens.verifier_ttl()?),
        );

        let media: Arc<dyn MediaStore> = Arc::new(LocalMediaStore::new(&config.media.dir));
        let registry = Arc::new(PlatformRegistry::from_config(&config)?);
        debug!(
            platforms = ?registry.kinds(),
            backend = tokens.backend_name(),
            "Service initialized"
        );

        let publisher = Arc::new(
            Publisher::new(Arc::clone(&registry), Arc::clone(&tokens)).with_history(db.clone()),
        );
        let oauth = OAuthFlow::new(Arc::clone(&registry), Arc::clone(&tokens));

        Ok(Self {
            config: Arc::new(config),
            db,
            tokens,
            media,
            registry,
            publisher,
            oauth,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn media_store(&self) -> &Arc<dyn MediaStore> {
        &self.media
    }

    pub fn registry(&self) -> &Arc<PlatformRegistry> {
        &self.registry
    }

    /// Copy a local file into the media store and stage it for publishing
    pub async fn stage_media(&self, path: &Path) -> Result<StagedMedia> {
        let (_, staged) = stage_file(self.media.as_ref(), path).await?;
        Ok(staged)
    }

    pub fn publisher(&self) -> &Arc<Publisher> {
        &self.publisher
    }

    pub fn oauth(&self) -> &OAuthFlow {
        &self.oauth
    }

    /// Generate-then-publish pipeline using the configured generator command
    pub fn pipeline(&self) -> Result<ContentPipeline> {
        let generator = self.config.generator.as_ref().ok_or_else(|| {
            FanpostError::InvalidInput(
                "content generation needs a [generator] section in the config".to_string(),
            )
        })?;

        Ok(ContentPipeline::new(
            Arc::new(CommandGenerator::from_config(generator)?),
            Arc::clone(&self.publisher),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentPayload, PlatformKind, PublishStatus};
    use tempfile::TempDir;

    fn config(temp_dir: &TempDir, backend: TokenBackendKind) -> Config {
        let mut config = Config::default_config();
        config.database.path = temp_dir.path().join("fanpost.db").to_string_lossy().to_string();
        config.tokens.backend = backend;
        config.media.dir = temp_dir.path().join("media").to_string_lossy().to_string();
        config
    }

    #[tokio::test]
    async fn test_unconfigured_platform_reported_per_platform() {
        let temp_dir = TempDir::new().unwrap();
        let service = FanpostService::from_config(config(&temp_dir, TokenBackendKind::Sqlite))
            .await
            .unwrap();

        assert!(service.registry().kinds().is_empty());
        assert_eq!(service.tokens().backend_name(), "sqlite");

        let report = service
            .publisher()
            .publish("u1", &[PlatformKind::Facebook], &ContentPayload::new("hi"))
            .await
            .unwrap();
        let result = report.get(PlatformKind::Facebook).unwrap();
        assert_eq!(result.status, PublishStatus::Error);

        let history = service.database().publish_history("u1", 5).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_backend_selected() {
        let temp_dir = TempDir::new().unwrap();
        let service = FanpostService::from_config(config(&temp_dir, TokenBackendKind::Memory))
            .await
            .unwrap();
        assert_eq!(service.tokens().backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_pipeline_requires_generator() {
        let temp_dir = TempDir::new().unwrap();
        let service = FanpostService::from_config(config(&temp_dir, TokenBackendKind::Memory))
            .await
            .unwrap();
        assert!(matches!(
            service.pipeline(),
            Err(FanpostError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_stage_media_writes_under_media_dir() {
        let temp_dir = TempDir::new().unwrap();
        let service = FanpostService::from_config(config(&temp_dir, TokenBackendKind::Memory))
            .await
            .unwrap();

        let source = temp_dir.path().join("clip.mp4");
        std::fs::write(&source, vec![7u8; 64]).unwrap();

        let staged = service.stage_media(&source).await.unwrap();
        assert_eq!(staged.mime_type(), "video/mp4");
        assert_eq!(staged.size(), 64);

        let stored: Vec<_> = std::fs::read_dir(temp_dir.path().join("media"))
            .unwrap()
            .collect();
        assert_eq!(stored.len(), 1);
    }
}
