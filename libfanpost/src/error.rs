//! Error types for Fanpost

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FanpostError>;

#[derive(Error, Debug)]
pub enum FanpostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Content generation failed: {0}")]
    Generation(String),

    #[error("Media error: {0}")]
    Media(String),
}

impl FanpostError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            FanpostError::InvalidInput(_) => 3,
            FanpostError::Platform(PlatformError::Validation(_)) => 3,
            FanpostError::Platform(e) if e.is_auth_failure() => 2,
            FanpostError::Platform(PlatformError::AuthRequired(_)) => 2,
            FanpostError::Platform(_) => 1,
            FanpostError::Config(_) => 1,
            FanpostError::Database(_) => 1,
            FanpostError::Generation(_) => 1,
            FanpostError::Media(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

/// Failures produced by platform adapters and the OAuth token endpoints.
///
/// Inside the orchestrator these are data: each one becomes the `detail` of
/// an `error` result for its platform instead of aborting the request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Authorization required: {0}")]
    AuthRequired(String),

    #[error("Token exchange failed: {0}")]
    Exchange(String),

    #[error("Token refresh failed: {0}")]
    Refresh(String),

    #[error("Upload failed: {detail}")]
    Upload { status: Option<u16>, detail: String },

    #[error("Upstream rejected request (HTTP {status}): {detail}")]
    Upstream { status: u16, detail: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Platform not configured: {0}")]
    NotConfigured(String),
}

impl PlatformError {
    /// HTTP status reported by the upstream, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            PlatformError::Upstream { status, .. } => Some(*status),
            PlatformError::Upload { status, .. } => *status,
            _ => None,
        }
    }

    /// The message as the upstream (or adapter) reported it, without the
    /// variant prefix `Display` adds.
    pub fn detail(&self) -> &str {
        match self {
            PlatformError::Upstream { detail, .. } | PlatformError::Upload { detail, .. } => {
                detail
            }
            PlatformError::Validation(detail)
            | PlatformError::AuthRequired(detail)
            | PlatformError::Exchange(detail)
            | PlatformError::Refresh(detail)
            | PlatformError::Timeout(detail)
            | PlatformError::Network(detail)
            | PlatformError::NotSupported(detail)
            | PlatformError::NotConfigured(detail) => detail,
        }
    }

    /// Whether this failure means the access token is no longer usable.
    ///
    /// Matches HTTP 401, or an upstream message mentioning an expired token
    /// or `invalid_grant`.
    pub fn is_auth_failure(&self) -> bool {
        if self.status() == Some(401) {
            return true;
        }

        let detail = match self {
            PlatformError::Upstream { detail, .. } | PlatformError::Upload { detail, .. } => {
                detail.as_str()
            }
            _ => return false,
        };

        let lowered = detail.to_lowercase();
        lowered.contains("invalid_grant")
            || (lowered.contains("expired") && lowered.contains("token"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = FanpostError::InvalidInput("Empty platform list".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_auth_required() {
        let error = FanpostError::Platform(PlatformError::AuthRequired("tiktok".to_string()));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_expired_token_upstream() {
        let error = FanpostError::Platform(PlatformError::Upstream {
            status: 401,
            detail: "unauthorized".to_string(),
        });
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_other_errors() {
        let upload = FanpostError::Platform(PlatformError::Upload {
            status: Some(500),
            detail: "boom".to_string(),
        });
        assert_eq!(upload.exit_code(), 1);

        let config = FanpostError::Config(ConfigError::MissingField("tiktok.client_key".into()));
        assert_eq!(config.exit_code(), 1);

        let generation = FanpostError::Generation("model unavailable".to_string());
        assert_eq!(generation.exit_code(), 1);
    }

    #[test]
    fn test_detail_is_the_raw_message() {
        let upstream = PlatformError::Upstream {
            status: 400,
            detail: "(#100) Invalid parameter".to_string(),
        };
        assert_eq!(upstream.detail(), "(#100) Invalid parameter");
        assert_eq!(upstream.status(), Some(400));

        let upload = PlatformError::Upload {
            status: None,
            detail: "missing upload_url".to_string(),
        };
        assert_eq!(upload.detail(), "missing upload_url");

        assert_eq!(PlatformError::Timeout("init".to_string()).detail(), "init");
    }

    #[test]
    fn test_error_message_formatting() {
        let error = FanpostError::Platform(PlatformError::Upstream {
            status: 400,
            detail: "video too large".to_string(),
        });
        assert_eq!(
            error.to_string(),
            "Platform error: Upstream rejected request (HTTP 400): video too large"
        );

        let config_error = ConfigError::MissingField("tiktok.client_key".to_string());
        assert_eq!(
            FanpostError::Config(config_error).to_string(),
            "Configuration error: Missing required field: tiktok.client_key"
        );
    }

    #[test]
    fn test_auth_failure_on_401() {
        let error = PlatformError::Upstream {
            status: 401,
            detail: "{}".to_string(),
        };
        assert!(error.is_auth_failure());

        let upload = PlatformError::Upload {
            status: Some(401),
            detail: "init rejected".to_string(),
        };
        assert!(upload.is_auth_failure());
    }

    #[test]
    fn test_auth_failure_on_message() {
        let expired = PlatformError::Upstream {
            status: 400,
            detail: r#"{"error":{"code":"access_token_invalid","message":"The access token expired"}}"#
                .to_string(),
        };
        assert!(expired.is_auth_failure());

        let grant = PlatformError::Upload {
            status: Some(400),
            detail: "error=invalid_grant".to_string(),
        };
        assert!(grant.is_auth_failure());
    }

    #[test]
    fn test_not_auth_failure() {
        let too_big = PlatformError::Upstream {
            status: 413,
            detail: "file too large".to_string(),
        };
        assert!(!too_big.is_auth_failure());

        // Message markers only count for upstream responses
        assert!(!PlatformError::Refresh("token expired".to_string()).is_auth_failure());
        assert!(!PlatformError::Timeout("init".to_string()).is_auth_failure());
    }

    #[test]
    fn test_error_conversion_from_platform_error() {
        let platform_error = PlatformError::Network("connection refused".to_string());
        let error: FanpostError = platform_error.into();
        assert!(matches!(error, FanpostError::Platform(PlatformError::Network(_))));
    }

    #[test]
    fn test_platform_error_clone() {
        let original = PlatformError::Timeout("upload".to_string());
        let cloned = original.clone();
        assert_eq!(original, cloned);
    }
}
