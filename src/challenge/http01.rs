//! HTTP-01 provider: an in-memory token store.
//!
//! Provision and deprovision are pure local state mutation. The HTTP handler
//! that actually answers `/.well-known/acme-challenge/<token>` lives outside
//! this crate and reads through [`Http01Provider::key_authorization`].

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::ProviderError;

use super::{ChallengeProvider, ChallengeType};

/// Serves HTTP-01 tokens from memory.
#[derive(Debug, Default)]
pub struct Http01Provider {
    // token -> key authorization
    tokens: RwLock<HashMap<String, String>>,
}

impl Http01Provider {
    pub fn new() -> Self {
        Self::default()
    }

    /// The key authorization to serve for `token`, if provisioned.
    ///
    /// This is the read path for the external HTTP handler.
    pub fn key_authorization(&self, token: &str) -> Option<String> {
        self.tokens.read().get(token).cloned()
    }

    /// Number of currently provisioned tokens.
    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.read().is_empty()
    }
}

#[async_trait]
impl ChallengeProvider for Http01Provider {
    fn name(&self) -> &'static str {
        "http-01"
    }

    fn challenge_type(&self) -> ChallengeType {
        ChallengeType::Http01
    }

    async fn provision(
        &self,
        domain: &str,
        token: &str,
        key_auth: &str,
    ) -> Result<(), ProviderError> {
        log::debug!("serving http-01 token for {domain}");
        self.tokens
            .write()
            .insert(token.to_owned(), key_auth.to_owned());
        Ok(())
    }

    async fn deprovision(
        &self,
        domain: &str,
        token: &str,
        _key_auth: &str,
    ) -> Result<(), ProviderError> {
        log::debug!("removing http-01 token for {domain}");
        self.tokens.write().remove(token);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        self.tokens.write().clear();
        Ok(())
    }
}
