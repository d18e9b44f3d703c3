//! OAuth authorization-code flows
//!
//! `OAuthFlow` ties the platform adapters to the token store: `begin` builds
//! the authorization URL and parks the PKCE verifier, `complete` trades the
//! returned code for tokens and saves them.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::info;

use crate::error::{PlatformError, Result};
use crate::platforms::PlatformRegistry;
use crate::tokens::{Credential, CredentialUpdate, TokenStore};
use crate::types::PlatformKind;

/// Metadata key under which the platform-side account id is stored
pub const PLATFORM_ID_KEY: &str = "platform_id";

/// A fresh PKCE code verifier: 64 random bytes, base64url without padding
pub fn generate_code_verifier() -> String {
    let mut bytes = [0u8; 64];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// S256 code challenge for a verifier
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Authorization code from whatever the user pasted back
///
/// Accepts the bare code or the full callback URL (`...?code=...&state=...`).
/// Returns `None` for blank input or a URL without a `code` parameter.
pub fn code_from_callback(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    match reqwest::Url::parse(input) {
        Ok(url) => url
            .query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, value)| value.into_owned())
            .filter(|code| !code.is_empty()),
        Err(_) => Some(input.to_string()),
    }
}

/// Where to send the user, plus the verifier to keep until the callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub url: String,
    pub verifier: Option<String>,
}

/// Tokens returned by an authorization-code exchange or a refresh
#[derive(Clone, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    /// Platform-side account id (TikTok `open_id`)
    pub platform_id: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_in", &self.expires_in)
            .field("platform_id", &self.platform_id)
            .finish()
    }
}

impl TokenResponse {
    /// Parse a token endpoint body.
    ///
    /// A body without a non-empty `access_token` is an error carrying the body
    /// text, even when the upstream answered with a success status.
    pub fn from_json(body: &str, id_field: Option<&str>) -> std::result::Result<Self, String> {
        let json: Value = serde_json::from_str(body).map_err(|_| body.to_string())?;

        // TikTok nests the payload under `data` on some API versions
        let payload = match json.get("data") {
            Some(data) if data.get("access_token").is_some() => data,
            _ => &json,
        };

        let access_token = payload
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| body.to_string())?;

        let refresh_token = payload
            .get("refresh_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        let expires_in = payload.get("expires_in").and_then(|v| {
            v.as_i64()
                .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        });

        let platform_id = id_field
            .and_then(|field| payload.get(field))
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });

        Ok(Self {
            access_token: access_token.to_string(),
            refresh_token,
            expires_in,
            platform_id,
        })
    }

    pub fn into_update(self) -> CredentialUpdate {
        let mut update = CredentialUpdate::new(self.access_token);
        update.refresh_token = self.refresh_token;
        update.expires_in = self.expires_in;
        if let Some(id) = self.platform_id {
            update = update.with_metadata(PLATFORM_ID_KEY, id);
        }
        update
    }
}

/// Authorization flows for every registered platform that supports them
pub struct OAuthFlow {
    registry: Arc<PlatformRegistry>,
    tokens: Arc<TokenStore>,
}

impl OAuthFlow {
    pub fn new(registry: Arc<PlatformRegistry>, tokens: Arc<TokenStore>) -> Self {
        Self { registry, tokens }
    }

    fn redirect_for(
        &self,
        platform: PlatformKind,
        redirect_uri: Option<&str>,
    ) -> Result<(Arc<dyn crate::platforms::Platform>, String)> {
        let adapter = self
            .registry
            .get(platform)
            .ok_or_else(|| PlatformError::NotConfigured(platform.to_string()))?;

        let redirect = match redirect_uri {
            Some(uri) => uri.to_string(),
            None => adapter
                .default_redirect_uri()
                .ok_or_else(|| {
                    PlatformError::NotConfigured(format!("{}: no redirect_uri", platform))
                })?
                .to_string(),
        };

        Ok((adapter, redirect))
    }

    /// Start an authorization flow, returning the URL to send the user to.
    ///
    /// When the platform uses PKCE the verifier is saved in the token store
    /// before the URL is returned.
    pub fn begin(
        &self,
        user_id: &str,
        platform: PlatformKind,
        redirect_uri: Option<&str>,
    ) -> Result<String> {
        let (adapter, redirect) = self.redirect_for(platform, redirect_uri)?;
        let request = adapter.build_authorization_url(&redirect, user_id)?;

        if let Some(verifier) = &request.verifier {
            self.tokens.save_verifier(user_id, platform, verifier);
        }

        info!(user_id, platform = %platform, pkce = request.verifier.is_some(), "Started OAuth flow");
        Ok(request.url)
    }

    /// Finish an authorization flow with the code from the callback.
    ///
    /// The verifier is consumed only after the exchange succeeds, so a failed
    /// exchange can be retried with the same code.
    pub async fn complete(
        &self,
        user_id: &str,
        platform: PlatformKind,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> Result<Credential> {
        let code = code.trim();
        if code.is_empty() {
            return Err(PlatformError::Validation("authorization code is empty".to_string()).into());
        }

        let (adapter, redirect) = self.redirect_for(platform, redirect_uri)?;

        let verifier = self.tokens.get_verifier(user_id, platform);
        if adapter.uses_pkce() && verifier.is_none() {
            return Err(PlatformError::AuthRequired(format!(
                "no pending {} authorization for user {}; start the flow again",
                platform, user_id
            ))
            .into());
        }

        let tokens = adapter
            .exchange_code_for_token(code, &redirect, verifier.as_ref().map(|v| v.verifier.as_str()))
            .await?;

        let credential = self
            .tokens
            .save_credential(user_id, platform, tokens.into_update())
            .await?;
        self.tokens.delete_verifier(user_id, platform);

        info!(user_id, platform = %platform, "Completed OAuth flow");
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verifier_shape() {
        let verifier = generate_code_verifier();
        // 64 bytes -> 86 base64 characters without padding
        assert_eq!(verifier.len(), 86);
        assert!(!verifier.contains('='));
        assert!(verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_code_from_callback() {
        assert_eq!(code_from_callback("  abc123 \n").as_deref(), Some("abc123"));
        assert_eq!(
            code_from_callback("https://example.com/cb?code=xyz%2A9&scopes=video.upload&state=u1")
                .as_deref(),
            Some("xyz*9")
        );
        assert_eq!(code_from_callback("https://example.com/cb?error=access_denied"), None);
        assert_eq!(code_from_callback("   "), None);
    }

    #[test]
    fn test_verifiers_are_random() {
        assert_ne!(generate_code_verifier(), generate_code_verifier());
    }

    #[test]
    fn test_code_challenge_rfc7636_vector() {
        // Appendix B of RFC 7636
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            code_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_token_response_full() {
        let body = r#"{"access_token":"act.1","refresh_token":"rft.1","expires_in":86400,"open_id":"oid-9","scope":"video.upload"}"#;
        let tokens = TokenResponse::from_json(body, Some("open_id")).unwrap();
        assert_eq!(tokens.access_token, "act.1");
        assert_eq!(tokens.refresh_token.as_deref(), Some("rft.1"));
        assert_eq!(tokens.expires_in, Some(86400));
        assert_eq!(tokens.platform_id.as_deref(), Some("oid-9"));
    }

    #[test]
    fn test_token_response_nested_data() {
        let body = r#"{"data":{"access_token":"act.2","expires_in":"3600"}}"#;
        let tokens = TokenResponse::from_json(body, None).unwrap();
        assert_eq!(tokens.access_token, "act.2");
        assert_eq!(tokens.expires_in, Some(3600));
        assert!(tokens.refresh_token.is_none());
    }

    #[test]
    fn test_token_response_missing_access_token() {
        let body = r#"{"error":"invalid_grant","error_description":"code expired"}"#;
        let err = TokenResponse::from_json(body, None).unwrap_err();
        assert_eq!(err, body);
    }

    #[test]
    fn test_token_response_empty_access_token() {
        assert!(TokenResponse::from_json(r#"{"access_token":""}"#, None).is_err());
    }

    #[test]
    fn test_token_response_not_json() {
        let err = TokenResponse::from_json("<html>bad gateway</html>", None).unwrap_err();
        assert!(err.contains("bad gateway"));
    }

    #[test]
    fn test_into_update_carries_platform_id() {
        let tokens = TokenResponse {
            access_token: "a".to_string(),
            refresh_token: None,
            expires_in: Some(60),
            platform_id: Some("oid".to_string()),
        };
        let update = tokens.into_update();
        assert_eq!(update.expires_in, Some(60));
        assert_eq!(
            update.metadata.get(PLATFORM_ID_KEY).map(String::as_str),
            Some("oid")
        );
    }

    #[test]
    fn test_token_response_debug_redacts() {
        let tokens = TokenResponse {
            access_token: "act.secret".to_string(),
            refresh_token: Some("rft.secret".to_string()),
            expires_in: None,
            platform_id: None,
        };
        let debug = format!("{:?}", tokens);
        assert!(!debug.contains("secret"));
    }
}
