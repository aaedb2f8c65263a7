//! DNS-01 provider for generic REST DNS management APIs.
//!
//! Talks to a webhook-shaped record API:
//!
//! ```text
//! PUT    {base}/records            upsert a TXT record (idempotent)
//! DELETE {base}/records/{fqdn}     remove it; 404 counts as removed
//! ```
//!
//! Records are keyed by fully qualified name, so retrying an upsert after an
//! ambiguous failure cannot leave duplicates behind. Transport errors and
//! 5xx responses are retried with exponential backoff up to a fixed attempt
//! count before surfacing.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ProviderError;

use super::{dns01_record_name, dns01_txt_value, ChallengeProvider, ChallengeType, CHALLENGE_TTL};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Manages challenge TXT records through a remote DNS management API.
#[derive(Debug)]
pub struct DnsApiProvider {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
    auth_header: Option<String>,
}

#[derive(Debug, Serialize)]
struct UpsertRecord<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    _type: &'a str,
    value: &'a str,
    ttl: u32,
}

impl DnsApiProvider {
    pub fn new(
        base_url: &str,
        api_token: Option<String>,
        auth_header: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        if auth_header.is_some() && api_token.is_none() {
            return Err(ProviderError::Configuration(
                "auth_header set without an api_token".to_owned(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ProviderError::Configuration(format!("http client: {err}")))?;

        Ok(DnsApiProvider {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_token,
            auth_header,
        })
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match (&self.auth_header, &self.api_token) {
            (Some(header), Some(token)) => request.header(header.as_str(), token),
            (None, Some(token)) => request.bearer_auth(token),
            _ => request,
        }
    }

    /// Send `build()`'s request, retrying transport errors and 5xx with
    /// backoff. Returns the first conclusive response.
    async fn send_with_retry<F>(&self, build: F) -> Result<reqwest::Response, ProviderError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut delay = RETRY_BASE_DELAY;
        let mut last_err = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            match self.authed(build()).send().await {
                Ok(response) if response.status().is_server_error() => {
                    last_err = format!("HTTP {}", response.status());
                }
                Ok(response) => return Ok(response),
                Err(err) => {
                    last_err = err.to_string();
                }
            }

            if attempt < MAX_ATTEMPTS {
                log::debug!("dns api call failed ({last_err}), retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }

        Err(ProviderError::Api(format!(
            "giving up after {MAX_ATTEMPTS} attempts: {last_err}"
        )))
    }

    fn check_auth(response: &reqwest::Response) -> Result<(), ProviderError> {
        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ProviderError::Authentication(
                "DNS API rejected the configured token".to_owned(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ChallengeProvider for DnsApiProvider {
    fn name(&self) -> &'static str {
        "dns-01 api"
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
        let record_name = dns01_record_name(domain);
        let record_value = dns01_txt_value(key_auth);

        log::info!("upserting TXT record {record_name} via DNS API");

        let url = format!("{}/records", self.base_url);
        let response = self
            .send_with_retry(|| {
                self.client.put(&url).json(&UpsertRecord {
                    name: &record_name,
                    _type: "TXT",
                    value: &record_value,
                    ttl: CHALLENGE_TTL,
                })
            })
            .await?;

        Self::check_auth(&response)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(format!(
                "record upsert returned HTTP {status}: {body}"
            )));
        }

        Ok(())
    }

    async fn deprovision(
        &self,
        domain: &str,
        _token: &str,
        _key_auth: &str,
    ) -> Result<(), ProviderError> {
        let record_name = dns01_record_name(domain);

        log::info!("deleting TXT record {record_name} via DNS API");

        let url = format!("{}/records/{record_name}", self.base_url);
        let response = self.send_with_retry(|| self.client.delete(&url)).await?;

        Self::check_auth(&response)?;

        // already gone is fine
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(format!(
                "record delete returned HTTP {status}: {body}"
            )));
        }

        Ok(())
    }
}
