//! Mock credential provider.
//!
//! Caches like the HTTP provider and counts fetches and invalidations, so
//! tests can check the orchestrator's invalidation policy without a backend.

use crate::fixtures::test_credential;
use async_trait::async_trait;
use broadcast_client::credentials::{CredentialProvider, SessionCredential};
use broadcast_client::errors::CredentialError;
use common::types::{ChannelName, Role};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Credential provider double.
#[derive(Debug, Default)]
pub struct MockCredentialProvider {
    cache: Mutex<Option<SessionCredential>>,
    failure: Option<CredentialError>,
    delay: Option<Duration>,
    backend_fetches: AtomicUsize,
    invalidations: AtomicUsize,
}

impl MockCredentialProvider {
    /// Provider that issues a credential for any request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every backend fetch with `error`.
    #[must_use]
    pub fn with_failure(mut self, error: CredentialError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Delay every backend fetch.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fetches that missed the cache.
    #[must_use]
    pub fn backend_fetches(&self) -> usize {
        self.backend_fetches.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.cache.lock().unwrap().is_some()
    }
}

#[async_trait]
impl CredentialProvider for MockCredentialProvider {
    async fn fetch_credential(
        &self,
        channel: &ChannelName,
        role: Role,
    ) -> Result<SessionCredential, CredentialError> {
        let cached = self.cache.lock().unwrap().clone();
        if let Some(cached) = cached.filter(|c| &c.channel == channel && c.role == role) {
            return Ok(cached);
        }

        self.backend_fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        let mut credential = test_credential(role);
        credential.channel = channel.clone();
        *self.cache.lock().unwrap() = Some(credential.clone());
        Ok(credential)
    }

    async fn invalidate(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        self.cache.lock().unwrap().take();
    }

    async fn cached(&self) -> Option<SessionCredential> {
        self.cache.lock().unwrap().clone()
    }
}
