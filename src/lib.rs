//! Challenge provisioning and order orchestration for ACME (Automatic Certificate Management
//! Environment) certificate issuance, following the [RFC 8555](https://datatracker.ietf.org/doc/html/rfc8555)
//! flow against providers such as [Let's Encrypt](https://letsencrypt.org/).
//!
//! This crate is the engine of an automated certificate manager: it decides *how* each domain in
//! an order proves ownership, puts the proof in place, gates on it being externally observable,
//! and drives the order through validation, finalization and download. The ACME wire transport
//! (JWS signing, nonces, HTTP retry) and persistent storage are external collaborators consumed
//! through the [`AcmeClient`](client::AcmeClient) and [`Store`](storage::Store) traits.
//!
//! # Challenge Providers
//!
//! Domain ownership is proven by either:
//!
//! - answering an HTTP request for the domain at the ACME well-known path (`http-01`), or
//! - publishing a TXT record under `_acme-challenge.<domain>` (`dns-01`).
//!
//! The [`challenge`] module ships one `http-01` provider (an in-memory token store an HTTP
//! handler serves from) and three `dns-01` providers: operator scripts, an
//! [acme-dns](https://github.com/joohoi/acme-dns) server, and a generic REST record API.
//! Wildcard certificates require `dns-01`.
//!
//! # Hot Reconfiguration
//!
//! The mapping from domains to providers is operator configuration
//! ([`ProviderConfig`](config::ProviderConfig)) and can be replaced at runtime through
//! [`ProviderRegistry::swap`](registry::ProviderRegistry::swap) without restarting or dropping
//! in-flight validations. A rejected configuration leaves the previous one serving; the rare
//! unrecoverable case surfaces as [`SwapError::Fatal`](error::SwapError::Fatal) and the
//! supervisor is expected to shut down.
//!
//! # Propagation
//!
//! Authoritative DNS updates take time to become visible. Before requesting validation of a
//! `dns-01` challenge the orchestrator gates on the [`dns_checker`], which polls the configured
//! resolvers until every one of them observes the expected record value.

#![deny(rust_2018_idioms, nonstandard_style, future_incompatible)]

pub mod api;
pub mod challenge;
pub mod client;
pub mod config;
pub mod error;
pub mod storage;

mod account;
mod cert;
mod dns_checker;
mod orchestrator;
mod registry;

pub use crate::{
    account::{Account, AccountKey},
    cert::{create_p256_key, Certificate},
    dns_checker::{DnsChecker, TxtLookup},
    orchestrator::{IssuedOrder, OrderOrchestrator, RetryPolicy},
    registry::ProviderRegistry,
};
