//! Operator-submitted provider configuration.
//!
//! The document maps domain-match rules to provider settings. It is accepted
//! or rejected as a whole when the registry constructs providers from it, and
//! the accepted document is echoed back verbatim on query.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Full provider configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Ordered provider rules; the first rule whose `domains` entry matches
    /// wins.
    pub providers: Vec<ProviderEntry>,

    /// Propagation checker settings, used only if any provider resolves
    /// DNS-01 challenges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_checker: Option<DnsCheckerConfig>,
}

/// One rule: which domains it serves and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEntry {
    /// Domain patterns: exact name, `*.suffix` wildcard, or `*` catch-all.
    pub domains: Vec<String>,

    #[serde(flatten)]
    pub settings: ProviderSettings,
}

/// Provider-specific settings, tagged by provider type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderSettings {
    /// HTTP-01 token store served by the (external) HTTP handler.
    Http01 {},

    /// DNS-01 via operator-supplied create/delete executables.
    Dns01Script {
        create_command: Vec<String>,
        delete_command: Vec<String>,
        #[serde(default)]
        environment: HashMap<String, String>,
        /// Per-invocation deadline in seconds.
        #[serde(default = "default_script_timeout_secs")]
        timeout_secs: u64,
    },

    /// DNS-01 via an acme-dns server.
    Dns01AcmeDns {
        base_url: String,
        /// Per-domain acme-dns registrations.
        credentials: HashMap<String, AcmeDnsCredential>,
    },

    /// DNS-01 via a generic REST DNS management API.
    Dns01Api {
        base_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_token: Option<String>,
        /// Custom auth header name; bearer auth when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auth_header: Option<String>,
        #[serde(default = "default_api_timeout_secs")]
        timeout_secs: u64,
    },
}

impl ProviderSettings {
    /// Whether this provider fulfils DNS-01 challenges (and therefore needs
    /// the propagation checker).
    pub fn is_dns01(&self) -> bool {
        !matches!(self, ProviderSettings::Http01 {})
    }
}

/// acme-dns registration for one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcmeDnsCredential {
    pub username: String,
    pub password: String,
    /// Registered subdomain the TXT value is written to.
    pub subdomain: String,
    /// Full domain of the acme-dns record the operator CNAMEs to.
    pub full_domain: String,
}

/// Propagation checker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsCheckerConfig {
    /// Resolver addresses to query, e.g. `1.1.1.1:53`.
    #[serde(default)]
    pub resolvers: Vec<String>,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,

    /// Skip mode: sleep this long instead of querying DNS at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_wait_secs: Option<u64>,
}

impl Default for DnsCheckerConfig {
    fn default() -> Self {
        DnsCheckerConfig {
            resolvers: Vec::new(),
            poll_interval_secs: default_poll_interval_secs(),
            max_wait_secs: default_max_wait_secs(),
            skip_wait_secs: None,
        }
    }
}

impl DnsCheckerConfig {
    /// Degraded fallback used when the configured checker cannot be built:
    /// no resolvers, fixed sleep instead of active polling.
    pub fn skip_fallback(wait_secs: u64) -> Self {
        DnsCheckerConfig {
            resolvers: Vec::new(),
            poll_interval_secs: default_poll_interval_secs(),
            max_wait_secs: default_max_wait_secs(),
            skip_wait_secs: Some(wait_secs),
        }
    }
}

fn default_script_timeout_secs() -> u64 {
    60
}

fn default_api_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_secs() -> u64 {
    15
}

fn default_max_wait_secs() -> u64 {
    300
}

/// A compiled domain-match rule.
///
/// `*` matches everything, `*.suffix` matches any single-or-deeper label
/// under `suffix` (and the wildcard name itself), anything else is an exact
/// match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainMatcher {
    Any,
    Wildcard(String),
    Exact(String),
}

impl DomainMatcher {
    pub fn parse(pattern: &str) -> DomainMatcher {
        if pattern == "*" {
            DomainMatcher::Any
        } else if let Some(suffix) = pattern.strip_prefix("*.") {
            DomainMatcher::Wildcard(suffix.to_ascii_lowercase())
        } else {
            DomainMatcher::Exact(pattern.to_ascii_lowercase())
        }
    }

    pub fn matches(&self, domain: &str) -> bool {
        // Certificate wildcards request authorization for the base name.
        let domain = domain.strip_prefix("*.").unwrap_or(domain);
        let domain = domain.to_ascii_lowercase();

        match self {
            DomainMatcher::Any => true,
            DomainMatcher::Exact(name) => domain == *name,
            DomainMatcher::Wildcard(suffix) => {
                domain == *suffix || domain.ends_with(&format!(".{suffix}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matcher_exact_and_wildcard() {
        let exact = DomainMatcher::parse("example.com");
        assert!(exact.matches("example.com"));
        assert!(exact.matches("EXAMPLE.com"));
        assert!(!exact.matches("www.example.com"));

        let wild = DomainMatcher::parse("*.example.com");
        assert!(wild.matches("www.example.com"));
        assert!(wild.matches("a.b.example.com"));
        assert!(wild.matches("example.com"));
        assert!(!wild.matches("example.org"));

        let any = DomainMatcher::parse("*");
        assert!(any.matches("anything.at.all"));
    }

    #[test]
    fn matcher_strips_certificate_wildcard() {
        let wild = DomainMatcher::parse("*.example.com");
        assert!(wild.matches("*.example.com"));
        let exact = DomainMatcher::parse("example.com");
        assert!(exact.matches("*.example.com"));
    }

    #[test]
    fn config_document_roundtrips() {
        let json = r#"{
            "providers": [
                {
                    "domains": ["example.com", "*.example.com"],
                    "type": "dns01_script",
                    "create_command": ["/opt/dns/create.sh"],
                    "delete_command": ["/opt/dns/delete.sh"]
                },
                {
                    "domains": ["*"],
                    "type": "http01"
                }
            ],
            "dns_checker": {
                "resolvers": ["1.1.1.1:53"],
                "poll_interval_secs": 5,
                "max_wait_secs": 120
            }
        }"#;

        let cfg: ProviderConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.providers.len(), 2);
        assert!(cfg.providers[0].settings.is_dns01());
        assert!(!cfg.providers[1].settings.is_dns01());

        match &cfg.providers[0].settings {
            ProviderSettings::Dns01Script { timeout_secs, .. } => assert_eq!(*timeout_secs, 60),
            other => panic!("unexpected settings: {other:?}"),
        }

        // echoed back on query, so it must serialize losslessly
        let echoed = serde_json::to_string(&cfg).unwrap();
        let back: ProviderConfig = serde_json::from_str(&echoed).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn checker_skip_fallback_never_polls() {
        let cfg = DnsCheckerConfig::skip_fallback(120);
        assert_eq!(cfg.skip_wait_secs, Some(120));
        assert!(cfg.resolvers.is_empty());
    }
}
