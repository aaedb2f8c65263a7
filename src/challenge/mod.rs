//! Challenge providers.
//!
//! A [`ChallengeProvider`] provisions and deprovisions the validation
//! resource for one domain: an HTTP-01 token served at the well-known path,
//! or a DNS-01 TXT record placed under `_acme-challenge.<domain>`. Providers
//! are constructed once from operator configuration and immutable after
//! that; calls for different domains may run concurrently on the same
//! instance.

use async_trait::async_trait;
use base64::prelude::*;
use sha2::{Digest as _, Sha256};

use crate::error::ProviderError;

mod dns01_acmedns;
mod dns01_api;
mod dns01_script;
mod http01;

pub use self::{
    dns01_acmedns::AcmeDnsProvider, dns01_api::DnsApiProvider, dns01_script::ScriptProvider,
    http01::Http01Provider,
};

/// Challenge method a provider fulfils.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeType {
    Http01,
    Dns01,
}

impl ChallengeType {
    /// The ACME wire name, e.g. `dns-01`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeType::Http01 => "http-01",
            ChallengeType::Dns01 => "dns-01",
        }
    }
}

/// Provisions validation resources for domains it is configured to serve.
///
/// `provision` must make the resource observable to third parties before
/// returning success. `deprovision` removes it and must be safe to call even
/// after a partially failed `provision`; callers treat its errors as
/// non-fatal. `stop` releases held resources when the provider set is being
/// swapped out.
#[async_trait]
pub trait ChallengeProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &'static str;

    fn challenge_type(&self) -> ChallengeType;

    async fn provision(
        &self,
        domain: &str,
        token: &str,
        key_auth: &str,
    ) -> Result<(), ProviderError>;

    async fn deprovision(
        &self,
        domain: &str,
        token: &str,
        key_auth: &str,
    ) -> Result<(), ProviderError>;

    /// Release held resources. Called exactly once, during a provider swap.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Record name prefix for DNS-01 challenges.
pub const ACME_CHALLENGE_LABEL: &str = "_acme-challenge";

/// TTL for challenge records; short so stale values age out quickly.
pub const CHALLENGE_TTL: u32 = 60;

/// The TXT record name for a DNS-01 challenge.
///
/// Wildcard domains validate at the base name: `*.example.com` and
/// `example.com` both use `_acme-challenge.example.com`.
pub fn dns01_record_name(domain: &str) -> String {
    let base = domain.strip_prefix("*.").unwrap_or(domain);
    format!("{ACME_CHALLENGE_LABEL}.{base}")
}

/// The TXT record value for a DNS-01 challenge: base64url of the SHA-256
/// digest of the key authorization (RFC 8555 §8.4).
pub fn dns01_txt_value(key_auth: &str) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(key_auth))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_name_strips_wildcard() {
        assert_eq!(
            dns01_record_name("example.com"),
            "_acme-challenge.example.com"
        );
        assert_eq!(
            dns01_record_name("*.example.com"),
            "_acme-challenge.example.com"
        );
        assert_eq!(
            dns01_record_name("sub.example.com"),
            "_acme-challenge.sub.example.com"
        );
    }

    #[test]
    fn txt_value_is_deterministic_and_urlsafe() {
        // RFC 8555 §8.1 example key authorization
        let key_auth = "evaGxfADs6pSRb2LAv9IZf17Dt3juxGJ-PCt92wr-oA.nP1qzpXGymHBrUEepNY9HCsQk7K8KhOypzEt62jcerQ";

        let a = dns01_txt_value(key_auth);
        let b = dns01_txt_value(key_auth);
        assert_eq!(a, b);
        assert_eq!(a.len(), 43); // 32 bytes, base64url, unpadded
        assert!(!a.contains('+') && !a.contains('/') && !a.contains('='));

        // a different key authorization yields a different record
        assert_ne!(a, dns01_txt_value("other.value"));
    }

    #[test]
    fn challenge_type_wire_names() {
        assert_eq!(ChallengeType::Http01.as_str(), "http-01");
        assert_eq!(ChallengeType::Dns01.as_str(), "dns-01");
    }
}
