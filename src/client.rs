//! ACME client collaborator.
//!
//! The orchestrator never speaks the wire protocol itself; it drives these
//! primitives through [`AcmeClient`]. The implementation behind the trait
//! owns JWS signing, nonce handling and transport retry — none of which leak
//! into this crate. Errors come back split into [`ClientError::Transient`]
//! (worth retrying with backoff) and [`ClientError::Protocol`] (a problem
//! document, terminal for the operation).

use async_trait::async_trait;

use crate::api;
use crate::error::ClientError;

/// Primitives an ACME server round-trip implementation must provide.
///
/// URLs are the ones the server handed out in earlier responses; callers
/// thread them through unmodified. All calls are idempotent from this
/// crate's point of view except [`request_validation`], which the
/// orchestrator issues at most once per challenge.
///
/// [`request_validation`]: AcmeClient::request_validation
#[async_trait]
pub trait AcmeClient: Send + Sync {
    /// Create a new order for the given identifiers. Returns the order URL
    /// and the order object, normally in `pending` state.
    async fn create_order(
        &self,
        identifiers: &[api::Identifier],
    ) -> Result<(String, api::Order), ClientError>;

    /// Fetch one authorization object by its URL.
    async fn fetch_authorization(&self, url: &str) -> Result<api::Authorization, ClientError>;

    /// Tell the server the challenge resource is in place and validation may
    /// begin.
    async fn request_validation(&self, challenge_url: &str) -> Result<(), ClientError>;

    /// Re-fetch an authorization to observe validation progress.
    async fn poll_authorization(&self, url: &str) -> Result<api::Authorization, ClientError>;

    /// Re-fetch the order object.
    async fn refresh_order(&self, order_url: &str) -> Result<api::Order, ClientError>;

    /// Submit the CSR (DER) to the order's finalize URL.
    async fn finalize_order(&self, finalize_url: &str, csr_der: &[u8])
        -> Result<(), ClientError>;

    /// Download the issued certificate chain as PEM.
    async fn download_certificate(&self, certificate_url: &str) -> Result<String, ClientError>;

    /// Round-trip the account object, picking up server-side status changes.
    async fn refresh_account(&self) -> Result<api::Account, ClientError>;
}
