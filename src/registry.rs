//! Provider registry and the hot-swap protocol.
//!
//! The registry owns the active provider set: an immutable snapshot of
//! domain-match rules, provider instances and (when any provider resolves
//! DNS-01) the propagation checker. Readers clone the snapshot `Arc`, so a
//! concurrent swap is invisible to them — they see the fully-old or the
//! fully-new configuration, never a mix.
//!
//! Swapping in a new configuration follows a strict order: stop the old
//! providers, construct the new set (this is where all validation happens),
//! sort out the checker lifecycle, commit. A failure while the old set is
//! stopped is recovered by rebuilding the old set; if even that fails the
//! registry returns [`SwapError::Fatal`] — the process has no safe
//! configuration left and the supervisor must shut it down.

use std::{sync::Arc, time::Duration};

use parking_lot::RwLock;
use tokio::sync::{Mutex, RwLock as AsyncRwLock};

use crate::challenge::{
    AcmeDnsProvider, ChallengeProvider, ChallengeType, DnsApiProvider, Http01Provider,
    ScriptProvider,
};
use crate::config::{DomainMatcher, ProviderConfig, ProviderSettings};
use crate::dns_checker::DnsChecker;
use crate::error::{FatalError, ProviderError, SwapError};

/// Fixed sleep used by the degraded checker when the configured one cannot
/// be built.
const DEGRADED_CHECKER_WAIT_SECS: u64 = 120;

/// One domain-match rule bound to a provider instance.
pub(crate) struct Rule {
    pub(crate) matchers: Vec<DomainMatcher>,
    pub(crate) provider: Arc<dyn ChallengeProvider>,
}

impl Rule {
    fn matches(&self, domain: &str) -> bool {
        self.matchers.iter().any(|m| m.matches(domain))
    }
}

/// An immutable snapshot of the active configuration.
struct ProviderSet {
    rules: Vec<Rule>,
    dns_checker: Option<Arc<DnsChecker>>,
    config: ProviderConfig,
}

impl ProviderSet {
    fn empty() -> Self {
        ProviderSet {
            rules: Vec::new(),
            dns_checker: None,
            config: ProviderConfig::default(),
        }
    }

    fn provider_for(&self, domain: &str) -> Option<Arc<dyn ChallengeProvider>> {
        self.rules
            .iter()
            .find(|rule| rule.matches(domain))
            .map(|rule| Arc::clone(&rule.provider))
    }

    fn uses_dns(&self) -> bool {
        self.rules
            .iter()
            .any(|rule| rule.provider.challenge_type() == ChallengeType::Dns01)
    }
}

/// Construct provider instances from a configuration document.
///
/// This is the single validation point: a malformed entry fails the whole
/// set and nothing half-built escapes.
fn build_providers(config: &ProviderConfig) -> Result<Vec<Rule>, ProviderError> {
    if config.providers.is_empty() {
        return Err(ProviderError::Configuration(
            "configuration contains no providers".to_owned(),
        ));
    }

    let mut rules = Vec::with_capacity(config.providers.len());

    for entry in &config.providers {
        if entry.domains.is_empty() {
            return Err(ProviderError::Configuration(
                "provider entry with no domain patterns".to_owned(),
            ));
        }

        let matchers = entry.domains.iter().map(|d| DomainMatcher::parse(d)).collect();

        let provider: Arc<dyn ChallengeProvider> = match &entry.settings {
            ProviderSettings::Http01 {} => Arc::new(Http01Provider::new()),

            ProviderSettings::Dns01Script {
                create_command,
                delete_command,
                environment,
                timeout_secs,
            } => Arc::new(ScriptProvider::new(
                create_command.clone(),
                delete_command.clone(),
                environment.clone(),
                Duration::from_secs(*timeout_secs),
            )?),

            ProviderSettings::Dns01AcmeDns {
                base_url,
                credentials,
            } => Arc::new(AcmeDnsProvider::new(
                base_url,
                &entry.domains,
                credentials.clone(),
                Duration::from_secs(30),
            )?),

            ProviderSettings::Dns01Api {
                base_url,
                api_token,
                auth_header,
                timeout_secs,
            } => Arc::new(DnsApiProvider::new(
                base_url,
                api_token.clone(),
                auth_header.clone(),
                Duration::from_secs(*timeout_secs),
            )?),
        };

        rules.push(Rule { matchers, provider });
    }

    Ok(rules)
}

/// Owns the active provider set and serializes reconfiguration.
pub struct ProviderRegistry {
    active: RwLock<Arc<ProviderSet>>,
    /// Only one swap may be in flight.
    swap_lock: Mutex<()>,
    /// Provision/deprovision calls hold the read side; a swap's stop phase
    /// takes the write side, so in-flight calls against the outgoing set
    /// complete first.
    gate: AsyncRwLock<()>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    /// A registry with no providers. The first successful [`swap`] makes it
    /// serve.
    ///
    /// [`swap`]: ProviderRegistry::swap
    pub fn new() -> Self {
        ProviderRegistry {
            active: RwLock::new(Arc::new(ProviderSet::empty())),
            swap_lock: Mutex::new(()),
            gate: AsyncRwLock::new(()),
        }
    }

    /// Replace the active provider set with one built from `config`.
    ///
    /// On `Ok` the new set is live. On [`SwapError::Rejected`] the previous
    /// set is still (or again) live and the system is stable. On
    /// [`SwapError::Fatal`] no set is live; the caller must shut the
    /// process down after logging the diagnostic — continuing would mean
    /// silently losing all validation capability.
    pub async fn swap(&self, config: ProviderConfig) -> Result<(), SwapError> {
        self.swap_with(config, build_providers).await
    }

    pub(crate) async fn swap_with<F>(&self, config: ProviderConfig, factory: F) -> Result<(), SwapError>
    where
        F: Fn(&ProviderConfig) -> Result<Vec<Rule>, ProviderError>,
    {
        let _swap = self.swap_lock.lock().await;

        // Let in-flight provisioning against the old set drain; new calls
        // block until the swap commits.
        let _gate = self.gate.write().await;

        let old = Arc::clone(&self.active.read());

        // 1. stop the old providers
        if let Err(err) = Self::stop_all(&old).await {
            log::error!("failed to stop challenge providers ({err}), provider state is unrecoverable");
            return Err(FatalError::StopFailed(err.to_string()).into());
        }

        // 2. validate & construct the new set
        let rules = match factory(&config) {
            Ok(rules) => rules,
            Err(make_err) => {
                // 3. restart the previous configuration
                self.restore(&old, &factory)?;
                log::debug!("rejected new provider configuration: {make_err}");
                return Err(SwapError::Rejected(make_err.to_string()));
            }
        };

        let uses_dns = rules
            .iter()
            .any(|rule| rule.provider.challenge_type() == ChallengeType::Dns01);

        // 4. checker lifecycle follows provider need
        let dns_checker = if uses_dns {
            match &old.dns_checker {
                Some(checker) => Some(Arc::clone(checker)),
                None => {
                    log::info!("new providers use dns-01, enabling propagation checker");
                    let checker_config = config.dns_checker.clone().unwrap_or_default();

                    match DnsChecker::from_config(&checker_config) {
                        Ok(checker) => Some(Arc::new(checker)),
                        Err(err) => {
                            log::error!(
                                "failed to configure dns checker ({err}), \
                                 falling back to skip mode with {DEGRADED_CHECKER_WAIT_SECS}s sleep"
                            );

                            let fallback = crate::config::DnsCheckerConfig::skip_fallback(
                                DEGRADED_CHECKER_WAIT_SECS,
                            );
                            match DnsChecker::from_config(&fallback) {
                                Ok(checker) => Some(Arc::new(checker)),
                                Err(fallback_err) => {
                                    log::error!(
                                        "degraded dns checker also failed ({fallback_err}), \
                                         reverting to previous providers"
                                    );
                                    self.restore(&old, &factory)?;
                                    return Err(SwapError::Rejected(format!(
                                        "dns checker construction failed: {err}"
                                    )));
                                }
                            }
                        }
                    }
                }
            }
        } else {
            if old.dns_checker.is_some() {
                log::info!("new providers do not use dns-01, disabling propagation checker");
            }
            None
        };

        // 5. commit
        *self.active.write() = Arc::new(ProviderSet {
            rules,
            dns_checker,
            config,
        });
        log::info!("challenge providers updated");

        Ok(())
    }

    /// Rebuild and recommit the previous configuration after a failed swap
    /// attempt. Failing here is unrecoverable.
    fn restore<F>(&self, old: &ProviderSet, factory: &F) -> Result<(), SwapError>
    where
        F: Fn(&ProviderConfig) -> Result<Vec<Rule>, ProviderError>,
    {
        let rules = if old.config.providers.is_empty() {
            // the registry had never been configured; "restoring" is empty
            Vec::new()
        } else {
            match factory(&old.config) {
                Ok(rules) => rules,
                Err(err) => {
                    log::error!(
                        "failed to restart previous challenge providers ({err}), \
                         provider state is unrecoverable"
                    );
                    return Err(FatalError::RestartFailed(err.to_string()).into());
                }
            }
        };

        *self.active.write() = Arc::new(ProviderSet {
            rules,
            dns_checker: old.dns_checker.clone(),
            config: old.config.clone(),
        });

        Ok(())
    }

    async fn stop_all(set: &ProviderSet) -> Result<(), ProviderError> {
        for rule in &set.rules {
            rule.provider.stop().await?;
        }
        Ok(())
    }

    /// The provider whose rule covers `domain`, first match wins.
    pub fn provider_for(&self, domain: &str) -> Option<Arc<dyn ChallengeProvider>> {
        self.active.read().provider_for(domain)
    }

    /// The challenge type `domain` would be validated with.
    pub fn challenge_type_for(&self, domain: &str) -> Option<ChallengeType> {
        self.provider_for(domain).map(|p| p.challenge_type())
    }

    /// Provision through the matching provider, holding the in-flight gate
    /// so a concurrent swap cannot stop the provider mid-call.
    pub async fn provision(
        &self,
        domain: &str,
        token: &str,
        key_auth: &str,
    ) -> Result<(), ProviderError> {
        let _gate = self.gate.read().await;
        let provider =
            self.provider_for(domain)
                .ok_or_else(|| ProviderError::UnservableDomain {
                    domain: domain.to_owned(),
                })?;
        provider.provision(domain, token, key_auth).await
    }

    /// Deprovision through the matching provider. Best-effort at the call
    /// sites; errors are the caller's to log.
    pub async fn deprovision(
        &self,
        domain: &str,
        token: &str,
        key_auth: &str,
    ) -> Result<(), ProviderError> {
        let _gate = self.gate.read().await;
        let provider =
            self.provider_for(domain)
                .ok_or_else(|| ProviderError::UnservableDomain {
                    domain: domain.to_owned(),
                })?;
        provider.deprovision(domain, token, key_auth).await
    }

    pub fn dns_checker(&self) -> Option<Arc<DnsChecker>> {
        self.active.read().dns_checker.clone()
    }

    pub fn has_dns_checker(&self) -> bool {
        self.active.read().dns_checker.is_some()
    }

    /// Whether any active provider resolves DNS-01 challenges.
    pub fn uses_dns(&self) -> bool {
        self.active.read().uses_dns()
    }

    /// The accepted configuration document, echoed back for operator query.
    pub fn config(&self) -> ProviderConfig {
        self.active.read().config.clone()
    }
}
