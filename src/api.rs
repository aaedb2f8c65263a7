//! ACME protocol object model.
//!
//! Serde representations of the RFC 8555 resources the orchestrator moves
//! through: orders, authorizations, challenges and the problem documents the
//! server attaches to failures. The wire transport that produces these is an
//! external collaborator (see [`crate::client::AcmeClient`]); this module only
//! defines the shapes and the status predicates the state machine needs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An identifier in an order, currently always of type `dns`.
///
/// See [RFC 8555 §7.1.3].
///
/// [RFC 8555 §7.1.3]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.3
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub _type: String,
    pub value: String,
}

impl Identifier {
    /// A DNS identifier for `domain`.
    pub fn dns(domain: &str) -> Self {
        Identifier {
            _type: "dns".to_owned(),
            value: domain.to_owned(),
        }
    }
}

/// The status of an [`Order`].
///
/// See [RFC 8555 §7.1.6].
///
/// [RFC 8555 §7.1.6]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.6
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Ready,
    Processing,
    Valid,
    Invalid,
}

/// An ACME order object.
///
/// Represents one certificate request and tracks its progress through to
/// issuance. Orders are only ever advanced by the orchestrator; once the
/// status reaches `valid` or `invalid` the object is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub status: OrderStatus,

    /// RFC 3339 timestamp after which the server considers the order invalid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,

    pub identifiers: Vec<Identifier>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_after: Option<String>,

    /// Error that occurred while processing the order, if any.
    pub error: Option<Problem>,

    /// Authorization URLs, one per identifier that still needs proving.
    #[serde(default)]
    pub authorizations: Vec<String>,

    /// URL the CSR is posted to once all authorizations are valid.
    pub finalize: String,

    /// URL of the issued certificate, present once the order is `valid`.
    pub certificate: Option<String>,
}

impl Order {
    /// All domains covered by this order, in order of the identifiers.
    pub fn domains(&self) -> Vec<&str> {
        self.identifiers.iter().map(|id| id.value.as_str()).collect()
    }

    pub fn is_ready(&self) -> bool {
        self.status == OrderStatus::Ready
    }

    pub fn is_processing(&self) -> bool {
        self.status == OrderStatus::Processing
    }

    pub fn is_valid(&self) -> bool {
        self.status == OrderStatus::Valid
    }

    pub fn is_invalid(&self) -> bool {
        self.status == OrderStatus::Invalid
    }

    /// Terminal orders must not be driven any further.
    pub fn is_terminal(&self) -> bool {
        self.is_valid() || self.is_invalid()
    }
}

/// The status of an [`Authorization`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationStatus {
    Pending,
    Valid,
    Invalid,
    Deactivated,
    Expired,
    Revoked,
}

/// An ACME authorization object: one domain's proof obligation within an
/// order.
///
/// See [RFC 8555 §7.1.4].
///
/// [RFC 8555 §7.1.4]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.4
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub identifier: Identifier,
    pub status: AuthorizationStatus,

    /// RFC 3339 timestamp after which the authorization expires.
    pub expires: Option<String>,

    /// Challenges offered by the server. Completing any one of them is
    /// sufficient to make the authorization valid.
    pub challenges: Vec<Challenge>,

    /// Present and true for authorizations created for a wildcard identifier.
    pub wildcard: Option<bool>,
}

impl Authorization {
    /// The domain this authorization covers.
    pub fn domain(&self) -> &str {
        &self.identifier.value
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard.unwrap_or(false)
    }

    pub fn is_pending(&self) -> bool {
        self.status == AuthorizationStatus::Pending
    }

    pub fn is_valid(&self) -> bool {
        self.status == AuthorizationStatus::Valid
    }

    /// Returns an `http-01` challenge, if one is offered.
    pub fn http_challenge(&self) -> Option<&Challenge> {
        self.challenges.iter().find(|c| c._type == "http-01")
    }

    /// Returns a `dns-01` challenge, if one is offered.
    pub fn dns_challenge(&self) -> Option<&Challenge> {
        self.challenges.iter().find(|c| c._type == "dns-01")
    }

    /// The first validation error the server recorded on any challenge.
    pub fn first_error(&self) -> Option<&Problem> {
        self.challenges.iter().filter_map(|c| c.error.as_ref()).next()
    }
}

/// The status of a [`Challenge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    Pending,
    Processing,
    Valid,
    Invalid,
}

/// An ACME challenge object.
///
/// See [RFC 8555 §7.1.5].
///
/// [RFC 8555 §7.1.5]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.5
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Challenge type, e.g. `http-01` or `dns-01`.
    #[serde(rename = "type")]
    pub _type: String,

    /// URL a validation request is posted to.
    pub url: String,

    pub status: ChallengeStatus,

    /// Time at which the server validated this challenge (RFC 3339).
    pub validated: Option<String>,

    /// Error recorded by the server while validating, if any.
    pub error: Option<Problem>,

    pub token: String,
}

/// The status of a remote ACME [`Account`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Valid,
    Deactivated,
    Revoked,
}

/// An ACME account object as returned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub status: AccountStatus,

    #[serde(default)]
    pub contact: Vec<String>,

    #[serde(rename = "createdAt")]
    pub created_at: Option<String>,
}

/// Finalize payload: the base64url DER-encoded CSR.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finalize {
    pub csr: String,
}

/// A problem document attached to failed requests or failed validations.
///
/// See [RFC 7807].
///
/// [RFC 7807]: https://datatracker.ietf.org/doc/html/rfc7807
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub _type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subproblems: Option<Vec<Subproblem>>,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {detail}", self._type),
            _ => write!(f, "{}", self._type),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subproblem {
    #[serde(rename = "type")]
    pub _type: String,
    pub detail: Option<String>,
    pub identifier: Option<Identifier>,
}
