//! Mock platform implementation for testing
//!
//! A scriptable stand-in for any [`PlatformKind`]. Publish outcomes are taken
//! from a queue (falling back to a default once the queue is empty), and every
//! call is counted so tests can assert exactly how the orchestrator drove it.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::PlatformError;
use crate::oauth::TokenResponse;
use crate::platforms::{Platform, PlatformResult};
use crate::types::{ContentPayload, PlatformKind};

/// Shared call log, cloneable so tests keep a handle after the mock is boxed
#[derive(Debug, Clone, Default)]
pub struct MockCalls {
    publish_count: Arc<Mutex<usize>>,
    refresh_count: Arc<Mutex<usize>>,
    tokens: Arc<Mutex<Vec<Option<String>>>>,
    texts: Arc<Mutex<Vec<String>>>,
}

impl MockCalls {
    pub fn publish_count(&self) -> usize {
        *self.publish_count.lock()
    }

    pub fn refresh_count(&self) -> usize {
        *self.refresh_count.lock()
    }

    /// Access tokens passed to each publish call, in order
    pub fn tokens(&self) -> Vec<Option<String>> {
        self.tokens.lock().clone()
    }

    /// Text seen by each publish call, in order
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().clone()
    }
}

pub struct MockPlatform {
    kind: PlatformKind,
    script: Mutex<VecDeque<PlatformResult<String>>>,
    default_outcome: PlatformResult<String>,
    refresh_outcome: Option<PlatformResult<TokenResponse>>,
    validation_error: Option<String>,
    delay: Duration,
    calls: MockCalls,
}

impl MockPlatform {
    /// A mock whose every publish succeeds with id `"{kind}-post"`
    pub fn success(kind: PlatformKind) -> Self {
        Self {
            kind,
            script: Mutex::new(VecDeque::new()),
            default_outcome: Ok(format!("{}-post", kind)),
            refresh_outcome: None,
            validation_error: None,
            delay: Duration::ZERO,
            calls: MockCalls::default(),
        }
    }

    /// A mock whose every publish fails with `error`
    pub fn failure(kind: PlatformKind, error: PlatformError) -> Self {
        Self {
            default_outcome: Err(error),
            ..Self::success(kind)
        }
    }

    /// Outcomes returned by successive publish calls before the default applies
    pub fn with_script(self, outcomes: Vec<PlatformResult<String>>) -> Self {
        *self.script.lock() = outcomes.into();
        self
    }

    /// Outcome of `refresh_token`; without one, refresh is not supported
    pub fn with_refresh(mut self, outcome: PlatformResult<TokenResponse>) -> Self {
        self.refresh_outcome = Some(outcome);
        self
    }

    /// Make `validate_content` reject every payload
    pub fn with_validation_error(mut self, message: &str) -> Self {
        self.validation_error = Some(message.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Handle onto this mock's call log
    pub fn calls(&self) -> MockCalls {
        self.calls.clone()
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn kind(&self) -> PlatformKind {
        self.kind
    }

    fn validate_content(&self, _content: &ContentPayload) -> PlatformResult<()> {
        match &self.validation_error {
            Some(message) => Err(PlatformError::Validation(message.clone())),
            None => Ok(()),
        }
    }

    async fn publish(
        &self,
        content: &ContentPayload,
        access_token: Option<&str>,
    ) -> PlatformResult<String> {
        *self.calls.publish_count.lock() += 1;
        self.calls
            .tokens
            .lock()
            .push(access_token.map(str::to_string));
        self.calls
            .texts
            .lock()
            .push(content.text_for(self.kind).to_string());

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        self.validate_content(content)?;

        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| self.default_outcome.clone())
    }

    async fn refresh_token(&self, _refresh_token: &str) -> PlatformResult<TokenResponse> {
        *self.calls.refresh_count.lock() += 1;

        match &self.refresh_outcome {
            Some(outcome) => outcome.clone(),
            None => Err(PlatformError::NotSupported(format!(
                "{} mock has no refresh configured",
                self.kind
            ))),
        }
    }
}
