//! Multi-platform publish orchestration
//!
//! [`Publisher`] takes one [`ContentPayload`] and a list of platforms, runs
//! every adapter concurrently, and returns exactly one [`PublishResult`] per
//! requested platform. A failing platform never affects the others.
//!
//! Per platform:
//!
//! 1. Look up the user's credential. Platforms that need one and have none
//!    yield `needs_auth` without any network call.
//! 2. Publish.
//! 3. On an authentication-class failure, refresh the token once, save it,
//!    and retry once. The retry's outcome is the result.

use futures::future::join_all;
use indexmap::{IndexMap, IndexSet};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

use crate::db::Database;
use crate::error::{FanpostError, PlatformError, Result};
use crate::platforms::{Platform, PlatformRegistry};
use crate::tokens::{Credential, TokenStore};
use crate::types::{ContentPayload, PlatformKind, PublishRecord, PublishResult, PublishStatus};

/// Outcome of one publish request
#[derive(Debug, Clone)]
pub struct PublishReport {
    pub request_id: String,
    pub user_id: String,
    /// One entry per requested platform, in request order
    pub results: IndexMap<PlatformKind, PublishResult>,
}

impl PublishReport {
    pub fn get(&self, platform: PlatformKind) -> Option<&PublishResult> {
        self.results.get(&platform)
    }

    pub fn all_ok(&self) -> bool {
        self.results.values().all(PublishResult::is_ok)
    }

    pub fn any_ok(&self) -> bool {
        self.results.values().any(PublishResult::is_ok)
    }

    pub fn count(&self, status: PublishStatus) -> usize {
        self.results.values().filter(|r| r.status == status).count()
    }
}

/// Parse platform names into a de-duplicated list, keeping first occurrences
///
/// # Errors
///
/// Returns `FanpostError::InvalidInput` for an empty list or an unknown name.
pub fn parse_platforms<S: AsRef<str>>(names: &[S]) -> Result<Vec<PlatformKind>> {
    let mut kinds = IndexSet::new();
    for name in names {
        let name = name.as_ref().trim();
        if name.is_empty() {
            continue;
        }
        kinds.insert(name.parse::<PlatformKind>()?);
    }

    if kinds.is_empty() {
        return Err(FanpostError::InvalidInput(
            "At least one platform is required".to_string(),
        ));
    }

    Ok(kinds.into_iter().collect())
}

pub struct Publisher {
    registry: Arc<PlatformRegistry>,
    tokens: Arc<TokenStore>,
    history: Option<Database>,
}

impl Publisher {
    pub fn new(registry: Arc<PlatformRegistry>, tokens: Arc<TokenStore>) -> Self {
        Self {
            registry,
            tokens,
            history: None,
        }
    }

    /// Record every outcome in the publish history
    pub fn with_history(mut self, db: Database) -> Self {
        self.history = Some(db);
        self
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn registry(&self) -> &Arc<PlatformRegistry> {
        &self.registry
    }

    /// Publish to platforms given by name
    pub async fn publish_named<S: AsRef<str>>(
        &self,
        user_id: &str,
        platforms: &[S],
        content: &ContentPayload,
    ) -> Result<PublishReport> {
        let kinds = parse_platforms(platforms)?;
        self.publish(user_id, &kinds, content).await
    }

    /// Publish `content` to every platform in `platforms`
    ///
    /// Only malformed requests (empty user id or platform list) return `Err`.
    /// Platform failures are reported inside the returned map.
    pub async fn publish(
        &self,
        user_id: &str,
        platforms: &[PlatformKind],
        content: &ContentPayload,
    ) -> Result<PublishReport> {
        if user_id.trim().is_empty() {
            return Err(FanpostError::InvalidInput("user id is empty".to_string()));
        }

        let platforms: IndexSet<PlatformKind> = platforms.iter().copied().collect();
        if platforms.is_empty() {
            return Err(FanpostError::InvalidInput(
                "At least one platform is required".to_string(),
            ));
        }

        let request_id = uuid::Uuid::new_v4().to_string();
        info!(
            request_id = %request_id,
            user_id,
            platforms = platforms.len(),
            "Publishing content"
        );

        let futures = platforms.iter().map(|&kind| {
            let span = info_span!("publish", request_id = %request_id, platform = %kind);
            async move { (kind, self.publish_one(user_id, kind, content).await) }.instrument(span)
        });

        let results: IndexMap<PlatformKind, PublishResult> =
            join_all(futures).await.into_iter().collect();

        let report = PublishReport {
            request_id,
            user_id: user_id.to_string(),
            results,
        };

        self.record_history(&report).await;

        info!(
            request_id = %report.request_id,
            ok = report.count(PublishStatus::Ok),
            error = report.count(PublishStatus::Error),
            needs_auth = report.count(PublishStatus::NeedsAuth),
            "Publish finished"
        );

        Ok(report)
    }

    async fn publish_one(
        &self,
        user_id: &str,
        kind: PlatformKind,
        content: &ContentPayload,
    ) -> PublishResult {
        let adapter = match self.registry.get(kind) {
            Some(adapter) => adapter,
            None => {
                warn!("Platform not configured");
                return PublishResult::error(kind, format!("platform not configured: {}", kind));
            }
        };

        let credential = self.tokens.get_credential(user_id, kind).await;
        if kind.requires_user_auth() && credential.is_none() {
            info!("No credential on file");
            return PublishResult::needs_auth(
                kind,
                format!("no {} account connected for user {}", kind, user_id),
            );
        }

        let token = credential.as_ref().map(|c| c.access_token.as_str());
        match adapter.publish(content, token).await {
            Ok(external_id) => {
                info!(external_id = %external_id, "Published");
                PublishResult::ok(kind, external_id)
            }
            Err(e) if e.is_auth_failure() => match credential {
                Some(credential) => {
                    self.refresh_and_retry(user_id, adapter, credential, content, e)
                        .await
                }
                None => {
                    warn!(status = ?e.status(), "Authentication failed: {}", e);
                    PublishResult::error(kind, e.detail())
                }
            },
            Err(e) => into_result(kind, e),
        }
    }

    async fn refresh_and_retry(
        &self,
        user_id: &str,
        adapter: Arc<dyn Platform>,
        credential: Credential,
        content: &ContentPayload,
        original: PlatformError,
    ) -> PublishResult {
        let kind = adapter.kind();
        warn!("Access token rejected, refreshing: {}", original);

        let refresher = adapter.clone();
        let refreshed = self
            .tokens
            .refresh_credential(user_id, kind, &credential.access_token, |current| async move {
                let refresh_token = current.refresh_token.ok_or_else(|| {
                    PlatformError::Refresh("no refresh token on file".to_string())
                })?;
                let tokens = refresher.refresh_token(&refresh_token).await?;
                Ok::<_, FanpostError>(tokens.into_update())
            })
            .await;

        let credential = match refreshed {
            Ok(credential) => credential,
            Err(refresh_error) => {
                warn!("Token refresh failed: {}", refresh_error);
                return PublishResult::error(
                    kind,
                    format!("{}; token refresh failed: {}", original.detail(), refresh_error),
                );
            }
        };

        info!("Token refreshed, retrying once");
        match adapter.publish(content, Some(&credential.access_token)).await {
            Ok(external_id) => {
                info!(external_id = %external_id, "Published after refresh");
                PublishResult::ok(kind, external_id)
            }
            Err(e) => into_result(kind, e),
        }
    }

    async fn record_history(&self, report: &PublishReport) {
        let Some(db) = &self.history else {
            return;
        };

        for result in report.results.values() {
            let record = PublishRecord::from_result(&report.request_id, &report.user_id, result);
            if let Err(e) = db.record_result(&record).await {
                warn!(
                    request_id = %report.request_id,
                    platform = %result.platform,
                    "Failed to record publish result: {}",
                    e
                );
            }
        }
    }
}

fn into_result(kind: PlatformKind, error: PlatformError) -> PublishResult {
    match error {
        PlatformError::AuthRequired(detail) => PublishResult::needs_auth(kind, detail),
        other => {
            warn!(status = ?other.status(), "Publish failed: {}", other);
            PublishResult::error(kind, other.detail())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_platforms_dedupes_in_order() {
        let kinds = parse_platforms(&["facebook", "tiktok", "Facebook", " whatsapp "]).unwrap();
        assert_eq!(
            kinds,
            vec![PlatformKind::Facebook, PlatformKind::TikTok, PlatformKind::WhatsApp]
        );
    }

    #[test]
    fn test_parse_platforms_rejects_unknown() {
        let result = parse_platforms(&["tiktok", "friendster"]);
        assert!(matches!(result, Err(FanpostError::InvalidInput(ref m)) if m.contains("friendster")));
    }

    #[test]
    fn test_parse_platforms_rejects_empty() {
        let empty: [&str; 0] = [];
        assert!(matches!(parse_platforms(&empty), Err(FanpostError::InvalidInput(_))));
        assert!(matches!(parse_platforms(&["", "  "]), Err(FanpostError::InvalidInput(_))));
    }

    #[test]
    fn test_report_counts() {
        let mut results = IndexMap::new();
        results.insert(PlatformKind::TikTok, PublishResult::ok(PlatformKind::TikTok, "1"));
        results.insert(
            PlatformKind::Facebook,
            PublishResult::error(PlatformKind::Facebook, "boom"),
        );
        let report = PublishReport {
            request_id: "r".to_string(),
            user_id: "u".to_string(),
            results,
        };

        assert!(!report.all_ok());
        assert!(report.any_ok());
        assert_eq!(report.count(PublishStatus::Ok), 1);
        assert_eq!(report.count(PublishStatus::Error), 1);
        assert_eq!(report.count(PublishStatus::NeedsAuth), 0);
        assert!(report.get(PlatformKind::WhatsApp).is_none());
    }
}
