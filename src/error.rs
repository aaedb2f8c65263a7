//! Error taxonomy.
//!
//! Failures fall into five classes with different blast radii:
//!
//! - [`ProviderError`] — provisioning a single validation resource failed;
//!   scoped to one authorization.
//! - [`CheckError`] — the DNS propagation gate could not confirm a record;
//!   scoped to one authorization attempt.
//! - [`ClientError`] — a call against the ACME collaborator failed, either
//!   transiently (retried with backoff) or terminally (a problem document).
//! - [`OrderError`] — terminal for one order, never for the process.
//! - [`SwapError`]/[`FatalError`] — a provider hot-swap failed; the fatal
//!   variant means the process has no safe configuration left to serve.

use std::time::Duration;

use thiserror::Error;

use crate::api;

/// Errors raised by [`crate::challenge::ChallengeProvider`] implementations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Provider settings were rejected during construction.
    #[error("invalid provider configuration: {0}")]
    Configuration(String),

    /// No provider rule matches the domain.
    #[error("no provider configured for domain '{domain}'")]
    UnservableDomain { domain: String },

    /// An external provisioning command exited non-zero.
    #[error("command '{program}' exited with {code:?}: {stderr}")]
    Script {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// An external call exceeded its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Authentication with a DNS management API failed.
    #[error("authentication with DNS API failed: {0}")]
    Authentication(String),

    /// A DNS management API call failed after exhausting retries.
    #[error("DNS API request failed: {0}")]
    Api(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised by the DNS propagation checker.
#[derive(Debug, Error)]
pub enum CheckError {
    /// The record never became visible within the configured maximum wait.
    #[error("TXT record for '{record}' not visible after {waited:?}")]
    Timeout { record: String, waited: Duration },

    /// The checker itself could not be constructed.
    #[error("failed to construct DNS checker: {0}")]
    Construction(String),

    /// A resolver query failed in a way that is not plain record absence.
    #[error("DNS lookup for '{record}' failed: {message}")]
    Lookup { record: String, message: String },
}

/// Errors surfaced by the ACME client collaborator.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network hiccup or other retryable condition.
    #[error("transient ACME client error: {0}")]
    Transient(String),

    /// The server returned a problem document; not retryable.
    #[error("ACME problem: {0}")]
    Protocol(api::Problem),
}

impl ClientError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Transient(_))
    }
}

/// Unrecoverable registry condition: neither the new nor the previous
/// provider configuration is serving.
///
/// The only legal response for the caller is an orderly process shutdown.
/// Continuing would mean silently serving no validation capability at all.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("failed to stop active challenge providers: {0}")]
    StopFailed(String),

    #[error("failed to restart previous challenge providers: {0}")]
    RestartFailed(String),
}

/// Outcome of a failed provider hot-swap.
#[derive(Debug, Error)]
pub enum SwapError {
    /// The submitted configuration was rejected; the previous provider set
    /// is still (or again) active and the system is stable.
    #[error("provider configuration rejected: {0}")]
    Rejected(String),

    /// The system has no safe configuration left. See [`FatalError`].
    #[error("unrecoverable provider state: {0}")]
    Fatal(#[from] FatalError),
}

/// Terminal failure of one order.
#[derive(Debug, Error)]
pub enum OrderError {
    /// A challenge provider failed, or no rule covers the domain.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// An authorization ended `invalid` or `expired`.
    #[error("authorization for '{domain}' is {status:?}: {detail}")]
    AuthorizationFailed {
        domain: String,
        status: api::AuthorizationStatus,
        detail: String,
    },

    /// Propagation gating failed for a DNS-01 authorization.
    #[error("propagation check for '{domain}' failed: {source}")]
    Propagation {
        domain: String,
        source: CheckError,
    },

    /// Retries against the ACME collaborator were exhausted.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: ClientError },

    /// The server moved the order to `invalid`.
    #[error("order is invalid: {0}")]
    OrderInvalid(String),

    /// The overall order deadline elapsed.
    #[error("order abandoned after exceeding {0:?}")]
    DeadlineExceeded(Duration),

    /// CSR construction or certificate parsing failed.
    #[error("certificate handling failed: {0}")]
    Certificate(String),

    #[error(transparent)]
    Client(#[from] ClientError),
}
