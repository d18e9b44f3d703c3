//! Fanpost - publish one piece of content to many social platforms
//!
//! This library holds the OAuth token store, the platform adapters (including
//! TikTok's upload state machine) and the orchestrator that fans a single
//! payload out across them with per-platform failure isolation.

pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod logging;
pub mod media;
pub mod oauth;
pub mod platforms;
pub mod poster;
pub mod service;
pub mod tokens;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use content::{CommandGenerator, ContentGenerator, ContentPipeline, GeneratedContent};
pub use db::Database;
pub use error::{FanpostError, PlatformError, Result};
pub use media::{stage_file, LocalMediaStore, MediaRef, MediaStore, StagedMedia};
pub use oauth::OAuthFlow;
pub use platforms::{Platform, PlatformRegistry};
pub use poster::{parse_platforms, PublishReport, Publisher};
pub use service::FanpostService;
pub use tokens::{Credential, MemoryBackend, TokenStore};
pub use types::{ContentPayload, PlatformKind, PublishRecord, PublishResult, PublishStatus};
