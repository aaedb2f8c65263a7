//! DNS-01 provider backed by an [acme-dns] server.
//!
//! The operator registers one acme-dns subdomain per domain and CNAMEs
//! `_acme-challenge.<domain>` at it. Provision POSTs the TXT value to the
//! acme-dns update endpoint; the update is an upsert, so retries cannot
//! create duplicate records. acme-dns has no delete endpoint — deprovision
//! is a no-op and records are simply overwritten by the next order.
//!
//! [acme-dns]: https://github.com/joohoi/acme-dns

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use serde::Serialize;

use crate::config::AcmeDnsCredential;
use crate::error::ProviderError;

use super::{dns01_txt_value, ChallengeProvider, ChallengeType};

/// Writes challenge TXT values through acme-dns registrations.
#[derive(Debug)]
pub struct AcmeDnsProvider {
    client: reqwest::Client,
    update_url: String,
    // domain (base name, no wildcard prefix) -> registration
    credentials: HashMap<String, AcmeDnsCredential>,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct UpdateRequest<'a> {
    subdomain: &'a str,
    txt: &'a str,
}

impl AcmeDnsProvider {
    /// Build a provider serving the given domain patterns.
    ///
    /// Every pattern must resolve to a registration in `credentials`; a
    /// domain this provider could never serve fails here, not on the first
    /// order that hits it. A `*` catch-all cannot be checked against a
    /// finite registration map and is rejected outright.
    pub fn new(
        base_url: &str,
        domains: &[String],
        credentials: HashMap<String, AcmeDnsCredential>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        if credentials.is_empty() {
            return Err(ProviderError::Configuration(
                "acme-dns provider requires at least one registered domain".to_owned(),
            ));
        }

        for pattern in domains {
            if pattern == "*" {
                return Err(ProviderError::Configuration(
                    "acme-dns cannot serve a catch-all rule; list registered domains explicitly"
                        .to_owned(),
                ));
            }
            let base = pattern.strip_prefix("*.").unwrap_or(pattern);
            if !credentials.contains_key(base) {
                return Err(ProviderError::Configuration(format!(
                    "domain '{pattern}' has no acme-dns registration"
                )));
            }
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ProviderError::Configuration(format!("http client: {err}")))?;

        let update_url = format!("{}/update", base_url.trim_end_matches('/'));

        Ok(AcmeDnsProvider {
            client,
            update_url,
            credentials,
            timeout,
        })
    }

    fn credential_for(&self, domain: &str) -> Result<&AcmeDnsCredential, ProviderError> {
        let base = domain.strip_prefix("*.").unwrap_or(domain);
        self.credentials
            .get(base)
            .ok_or_else(|| ProviderError::Configuration(format!(
                "no acme-dns registration for domain '{base}'"
            )))
    }
}

#[async_trait]
impl ChallengeProvider for AcmeDnsProvider {
    fn name(&self) -> &'static str {
        "dns-01 acme-dns"
    }

    fn challenge_type(&self) -> ChallengeType {
        ChallengeType::Dns01
    }

    async fn provision(
        &self,
        domain: &str,
        _token: &str,
        key_auth: &str,
    ) -> Result<(), ProviderError> {
        let cred = self.credential_for(domain)?;
        let txt = dns01_txt_value(key_auth);

        log::info!("updating acme-dns record {} for {domain}", cred.full_domain);

        let response = self
            .client
            .post(&self.update_url)
            .header("X-Api-User", &cred.username)
            .header("X-Api-Key", &cred.password)
            .json(&UpdateRequest {
                subdomain: &cred.subdomain,
                txt: &txt,
            })
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ProviderError::Timeout(self.timeout)
                } else {
                    ProviderError::Api(format!("acme-dns update failed: {err}"))
                }
            })?;

        match response.status() {
            status if status.is_success() => Ok(()),
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                Err(ProviderError::Authentication(format!(
                    "acme-dns rejected credentials for '{domain}'"
                )))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ProviderError::Api(format!(
                    "acme-dns update returned HTTP {status}: {body}"
                )))
            }
        }
    }

    async fn deprovision(
        &self,
        domain: &str,
        _token: &str,
        _key_auth: &str,
    ) -> Result<(), ProviderError> {
        // acme-dns exposes no delete; the next update overwrites the record.
        log::debug!("acme-dns deprovision for {domain} is a no-op");
        Ok(())
    }
}
