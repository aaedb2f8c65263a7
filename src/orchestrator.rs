//! Order and authorization state machine.
//!
//! [`OrderOrchestrator::execute`] drives one certificate order end to end:
//! create the order, validate every authorization concurrently, finalize
//! with a fresh CSR and download the issued chain. Failures are terminal for
//! the order only; the orchestrator never takes the process down.

use std::{future::Future, sync::Arc, time::Duration};

use parking_lot::Mutex;
use rand::Rng as _;
use tokio::task::JoinSet;

use crate::account::Account;
use crate::api::{self, AuthorizationStatus};
use crate::cert::{self, Certificate};
use crate::challenge::{self, ChallengeType};
use crate::client::AcmeClient;
use crate::error::{ClientError, OrderError, ProviderError};
use crate::registry::ProviderRegistry;

/// Backoff and deadline knobs for one order.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts per retryable operation, polling included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Wall-clock budget for the whole order. An order that cannot finish
    /// inside it is abandoned as failed rather than retried forever.
    pub order_deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 8,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            order_deadline: Duration::from_secs(600),
        }
    }
}

impl RetryPolicy {
    /// Run `call`, retrying transient client errors with exponential backoff.
    /// Protocol errors surface immediately.
    async fn run<T, F, Fut>(&self, what: &str, mut call: F) -> Result<T, OrderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut delay = self.base_delay;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    log::warn!(
                        "{what} failed ({err}), attempt {attempt}/{}, retrying in {delay:?}",
                        self.max_attempts
                    );
                    tokio::time::sleep(jittered(delay)).await;
                    delay = (delay * 2).min(self.max_delay);
                }
                Err(err) if err.is_transient() => {
                    return Err(OrderError::RetriesExhausted {
                        attempts: self.max_attempts,
                        last: err,
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// Randomize a backoff delay by up to a quarter so concurrent pollers do not
/// hit the server in lockstep.
fn jittered(delay: Duration) -> Duration {
    let spread = (delay.as_millis() / 4) as u64;
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
}

/// A successfully completed order.
#[derive(Debug)]
pub struct IssuedOrder {
    pub order_url: String,
    pub order: api::Order,
    pub certificate: Certificate,
}

/// A challenge resource that was provisioned and still needs tearing down.
struct ProvisionedRecord {
    domain: String,
    token: String,
    key_auth: String,
}

/// Drives orders against the ACME collaborator using the active provider
/// set.
pub struct OrderOrchestrator {
    client: Arc<dyn AcmeClient>,
    registry: Arc<ProviderRegistry>,
    account: Arc<Account>,
    retry: RetryPolicy,
}

impl OrderOrchestrator {
    pub fn new(
        client: Arc<dyn AcmeClient>,
        registry: Arc<ProviderRegistry>,
        account: Arc<Account>,
        retry: RetryPolicy,
    ) -> Self {
        OrderOrchestrator {
            client,
            registry,
            account,
            retry,
        }
    }

    /// Obtain a certificate for `domains`.
    ///
    /// Authorizations are validated concurrently; a failure in any of them
    /// fails the order. Every provisioned challenge resource is deprovisioned
    /// before this returns, success or not.
    pub async fn execute(&self, domains: &[&str]) -> Result<IssuedOrder, OrderError> {
        // owned here, not by `run`: the deadline drops the `run` future
        // mid-flight, and whatever it provisioned still needs tearing down
        let provisioned = Arc::new(Mutex::new(Vec::new()));

        let result = match tokio::time::timeout(
            self.retry.order_deadline,
            self.run(domains, &provisioned),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                log::warn!(
                    "order for {domains:?} abandoned after {:?}",
                    self.retry.order_deadline
                );
                Err(OrderError::DeadlineExceeded(self.retry.order_deadline))
            }
        };

        self.cleanup(&provisioned).await;

        result
    }

    async fn run(
        &self,
        domains: &[&str],
        provisioned: &Arc<Mutex<Vec<ProvisionedRecord>>>,
    ) -> Result<IssuedOrder, OrderError> {
        // Every domain must have a provider rule before we spend a round
        // trip on the server.
        for domain in domains {
            if self.registry.provider_for(domain).is_none() {
                return Err(ProviderError::UnservableDomain {
                    domain: (*domain).to_owned(),
                }
                .into());
            }
        }

        let identifiers: Vec<_> = domains.iter().map(|d| api::Identifier::dns(d)).collect();
        let (order_url, order) = self
            .retry
            .run("create order", || self.client.create_order(&identifiers))
            .await?;

        log::info!("created order {order_url} for {domains:?}");

        let mut tasks = JoinSet::new();
        for auth_url in &order.authorizations {
            tasks.spawn(validate_authorization(
                Arc::clone(&self.client),
                Arc::clone(&self.registry),
                Arc::clone(&self.account),
                self.retry,
                auth_url.clone(),
                Arc::clone(provisioned),
            ));
        }

        let mut first_err: Option<OrderError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    if first_err.is_none() {
                        log::warn!("authorization failed ({err}), aborting the rest");
                        first_err = Some(err);
                        tasks.abort_all();
                    }
                }
                Err(join_err) if join_err.is_cancelled() => {}
                Err(join_err) => std::panic::resume_unwind(join_err.into_panic()),
            }
        }

        // challenge resources are done with before finalize either way
        self.cleanup(provisioned).await;

        if let Some(err) = first_err {
            return Err(err);
        }

        // all authorizations valid; the server should move the order to ready
        let order = self
            .poll_order(&order_url, |o| o.is_ready() || o.is_valid())
            .await?;

        let cert_key = cert::create_p256_key();
        if !order.is_valid() {
            let csr = cert::create_csr_der(&cert_key, domains)
                .map_err(|err| OrderError::Certificate(err.to_string()))?;
            self.retry
                .run("finalize order", || {
                    self.client.finalize_order(&order.finalize, &csr)
                })
                .await?;
        }

        let order = self.poll_order(&order_url, |o| o.is_valid()).await?;

        let certificate_url = order.certificate.clone().ok_or_else(|| {
            OrderError::Certificate("order is valid but carries no certificate URL".to_owned())
        })?;
        let chain_pem = self
            .retry
            .run("download certificate", || {
                self.client.download_certificate(&certificate_url)
            })
            .await?;

        let key_pem = pkcs8::EncodePrivateKey::to_pkcs8_pem(&cert_key, der::pem::LineEnding::LF)
            .map_err(|err| OrderError::Certificate(err.to_string()))?;

        log::info!("order {order_url} issued");

        Ok(IssuedOrder {
            order_url,
            order,
            certificate: Certificate::new(key_pem, chain_pem),
        })
    }

    /// Refresh the order until `done` accepts it or attempts run out. An
    /// `invalid` order short-circuits.
    async fn poll_order<F>(&self, order_url: &str, done: F) -> Result<api::Order, OrderError>
    where
        F: Fn(&api::Order) -> bool,
    {
        let mut delay = self.retry.base_delay;

        for attempt in 1..=self.retry.max_attempts {
            let order = self
                .retry
                .run("refresh order", || self.client.refresh_order(order_url))
                .await?;

            if order.is_invalid() {
                let detail = order
                    .error
                    .as_ref()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "no problem document".to_owned());
                return Err(OrderError::OrderInvalid(detail));
            }

            if done(&order) {
                return Ok(order);
            }

            if attempt < self.retry.max_attempts {
                tokio::time::sleep(jittered(delay)).await;
                delay = (delay * 2).min(self.retry.max_delay);
            }
        }

        Err(OrderError::RetriesExhausted {
            attempts: self.retry.max_attempts,
            last: ClientError::Transient("order did not settle".to_owned()),
        })
    }

    /// Tear down everything the authorization tasks provisioned. Drains the
    /// list, so calling it again is a no-op. Best-effort: a failed
    /// deprovision is logged, never propagated.
    async fn cleanup(&self, provisioned: &Mutex<Vec<ProvisionedRecord>>) {
        let records: Vec<_> = std::mem::take(&mut *provisioned.lock());

        for record in records {
            if let Err(err) = self
                .registry
                .deprovision(&record.domain, &record.token, &record.key_auth)
                .await
            {
                log::warn!(
                    "failed to deprovision challenge for {}: {err}",
                    record.domain
                );
            }
        }
    }
}

/// Validate one authorization: provision, gate on propagation for DNS-01,
/// request validation, poll to a settled status.
///
/// Provisioned resources are pushed onto `provisioned` so the orchestrator
/// can tear them down even if this task is aborted mid-way.
async fn validate_authorization(
    client: Arc<dyn AcmeClient>,
    registry: Arc<ProviderRegistry>,
    account: Arc<Account>,
    policy: RetryPolicy,
    auth_url: String,
    provisioned: Arc<Mutex<Vec<ProvisionedRecord>>>,
) -> Result<(), OrderError> {
    let auth = policy
        .run("fetch authorization", || {
            client.fetch_authorization(&auth_url)
        })
        .await?;
    let domain = auth.domain().to_owned();

    match auth.status {
        // already proven, e.g. cached from a recent order
        AuthorizationStatus::Valid => return Ok(()),
        AuthorizationStatus::Pending => {}
        status => {
            return Err(OrderError::AuthorizationFailed {
                domain,
                status,
                detail: auth
                    .first_error()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "authorization not serviceable".to_owned()),
            });
        }
    }

    // the provider set may have been swapped since the pre-flight check
    let challenge_type =
        registry
            .challenge_type_for(&domain)
            .ok_or_else(|| ProviderError::UnservableDomain {
                domain: domain.clone(),
            })?;

    let challenge = match challenge_type {
        ChallengeType::Http01 => auth.http_challenge(),
        ChallengeType::Dns01 => auth.dns_challenge(),
    }
    .ok_or_else(|| OrderError::AuthorizationFailed {
        domain: domain.clone(),
        status: auth.status,
        detail: format!("server offered no {} challenge", challenge_type.as_str()),
    })?;

    let key_auth = account
        .key()
        .key_authorization(&challenge.token)
        .map_err(|err| OrderError::Certificate(err.to_string()))?;

    log::info!("provisioning {} challenge for {domain}", challenge_type.as_str());
    registry
        .provision(&domain, &challenge.token, &key_auth)
        .await?;
    provisioned.lock().push(ProvisionedRecord {
        domain: domain.clone(),
        token: challenge.token.clone(),
        key_auth: key_auth.clone(),
    });

    if challenge_type == ChallengeType::Dns01 {
        if let Some(checker) = registry.dns_checker() {
            let record = challenge::dns01_record_name(&domain);
            let value = challenge::dns01_txt_value(&key_auth);
            checker
                .wait_for_propagation(&record, &value)
                .await
                .map_err(|source| OrderError::Propagation {
                    domain: domain.clone(),
                    source,
                })?;
        }
    }

    policy
        .run("request validation", || {
            client.request_validation(&challenge.url)
        })
        .await?;

    let mut delay = policy.base_delay;
    for attempt in 1..=policy.max_attempts {
        let auth = policy
            .run("poll authorization", || client.poll_authorization(&auth_url))
            .await?;

        match auth.status {
            AuthorizationStatus::Valid => {
                log::info!("authorization for {domain} is valid");
                return Ok(());
            }
            AuthorizationStatus::Pending => {
                if attempt < policy.max_attempts {
                    tokio::time::sleep(jittered(delay)).await;
                    delay = (delay * 2).min(policy.max_delay);
                }
            }
            status => {
                return Err(OrderError::AuthorizationFailed {
                    domain,
                    status,
                    detail: auth
                        .first_error()
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "validation failed".to_owned()),
                });
            }
        }
    }

    Err(OrderError::RetriesExhausted {
        attempts: policy.max_attempts,
        last: ClientError::Transient(format!("authorization for {domain} still pending")),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use crate::account::AccountKey;
    use crate::config::{DnsCheckerConfig, ProviderConfig, ProviderEntry, ProviderSettings};

    use super::*;

    const CHAIN_PEM: &str = "TEST CHAIN PEM";

    #[derive(Default)]
    struct MockState {
        orders_created: u32,
        validation_requested: HashSet<String>,
        finalized: bool,
    }

    /// Scripted ACME server: authorizations become valid one poll after
    /// validation is requested, unless the domain is listed as invalid.
    struct MockAcmeClient {
        state: Mutex<MockState>,
        invalid_domains: HashSet<String>,
        hold_pending: bool,
    }

    impl MockAcmeClient {
        fn new() -> Self {
            MockAcmeClient {
                state: Mutex::new(MockState::default()),
                invalid_domains: HashSet::new(),
                hold_pending: false,
            }
        }

        fn invalid_for(mut self, domain: &str) -> Self {
            self.invalid_domains.insert(domain.to_owned());
            self
        }

        fn hold_pending(mut self) -> Self {
            self.hold_pending = true;
            self
        }

        fn domain_of(url: &str) -> String {
            url.split("://").nth(1).unwrap().to_owned()
        }

        fn validated(&self, domain: &str) -> bool {
            self.state
                .lock()
                .validation_requested
                .contains(domain)
        }

        fn orders_created(&self) -> u32 {
            self.state.lock().orders_created
        }

        fn challenge(kind: &str, domain: &str) -> api::Challenge {
            api::Challenge {
                _type: kind.to_owned(),
                url: format!("chall-{kind}://{domain}"),
                status: api::ChallengeStatus::Pending,
                validated: None,
                error: None,
                token: format!("tok-{domain}"),
            }
        }
    }

    #[async_trait]
    impl AcmeClient for MockAcmeClient {
        async fn create_order(
            &self,
            identifiers: &[api::Identifier],
        ) -> Result<(String, api::Order), ClientError> {
            self.state.lock().orders_created += 1;

            let order = api::Order {
                status: api::OrderStatus::Pending,
                expires: None,
                identifiers: identifiers.to_vec(),
                not_before: None,
                not_after: None,
                error: None,
                authorizations: identifiers
                    .iter()
                    .map(|id| format!("auth://{}", id.value))
                    .collect(),
                finalize: "finalize://order".to_owned(),
                certificate: None,
            };
            Ok(("order://1".to_owned(), order))
        }

        async fn fetch_authorization(
            &self,
            url: &str,
        ) -> Result<api::Authorization, ClientError> {
            let domain = Self::domain_of(url);
            Ok(api::Authorization {
                identifier: api::Identifier::dns(&domain),
                status: AuthorizationStatus::Pending,
                expires: None,
                challenges: vec![
                    Self::challenge("http-01", &domain),
                    Self::challenge("dns-01", &domain),
                ],
                wildcard: None,
            })
        }

        async fn request_validation(&self, challenge_url: &str) -> Result<(), ClientError> {
            let domain = Self::domain_of(challenge_url);
            self.state.lock().validation_requested.insert(domain);
            Ok(())
        }

        async fn poll_authorization(
            &self,
            url: &str,
        ) -> Result<api::Authorization, ClientError> {
            let domain = Self::domain_of(url);

            let status = if self.invalid_domains.contains(&domain) {
                AuthorizationStatus::Invalid
            } else if self.hold_pending || !self.validated(&domain) {
                AuthorizationStatus::Pending
            } else {
                AuthorizationStatus::Valid
            };

            let error = (status == AuthorizationStatus::Invalid).then(|| api::Problem {
                _type: "urn:ietf:params:acme:error:unauthorized".to_owned(),
                detail: Some(format!("validation failed for {domain}")),
                subproblems: None,
            });

            Ok(api::Authorization {
                identifier: api::Identifier::dns(&domain),
                status,
                expires: None,
                challenges: vec![api::Challenge {
                    error,
                    ..Self::challenge("http-01", &domain)
                }],
                wildcard: None,
            })
        }

        async fn refresh_order(&self, _order_url: &str) -> Result<api::Order, ClientError> {
            let finalized = self.state.lock().finalized;
            Ok(api::Order {
                status: if finalized {
                    api::OrderStatus::Valid
                } else {
                    api::OrderStatus::Ready
                },
                expires: None,
                identifiers: Vec::new(),
                not_before: None,
                not_after: None,
                error: None,
                authorizations: Vec::new(),
                finalize: "finalize://order".to_owned(),
                certificate: finalized.then(|| "cert://1".to_owned()),
            })
        }

        async fn finalize_order(
            &self,
            _finalize_url: &str,
            csr_der: &[u8],
        ) -> Result<(), ClientError> {
            assert!(!csr_der.is_empty());
            self.state.lock().finalized = true;
            Ok(())
        }

        async fn download_certificate(
            &self,
            _certificate_url: &str,
        ) -> Result<String, ClientError> {
            Ok(CHAIN_PEM.to_owned())
        }

        async fn refresh_account(&self) -> Result<api::Account, ClientError> {
            Ok(api::Account {
                status: api::AccountStatus::Valid,
                contact: Vec::new(),
                created_at: None,
            })
        }
    }

    async fn http01_registry(domains: &[&str]) -> Arc<ProviderRegistry> {
        let registry = Arc::new(ProviderRegistry::new());
        registry
            .swap(ProviderConfig {
                providers: vec![ProviderEntry {
                    domains: domains.iter().map(|d| d.to_string()).collect(),
                    settings: ProviderSettings::Http01 {},
                }],
                dns_checker: None,
            })
            .await
            .unwrap();
        registry
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            order_deadline: Duration::from_secs(5),
        }
    }

    fn orchestrator(
        client: Arc<MockAcmeClient>,
        registry: Arc<ProviderRegistry>,
        retry: RetryPolicy,
    ) -> OrderOrchestrator {
        let account = Arc::new(Account::new(AccountKey::generate(), None));
        OrderOrchestrator::new(client, registry, account, retry)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn issues_certificate_when_all_authorizations_validate() {
        let client = Arc::new(MockAcmeClient::new());
        let registry = http01_registry(&["*"]).await;
        let orch = orchestrator(Arc::clone(&client), registry, fast_policy());

        let issued = orch
            .execute(&["a.example.com", "b.example.com"])
            .await
            .unwrap();

        assert!(issued.order.is_valid());
        assert_eq!(issued.certificate.certificate(), CHAIN_PEM);
        assert!(!issued.certificate.private_key().is_empty());
        assert!(client.validated("a.example.com"));
        assert!(client.validated("b.example.com"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unmatched_domain_fails_before_creating_an_order() {
        let client = Arc::new(MockAcmeClient::new());
        let registry = http01_registry(&["example.com"]).await;
        let orch = orchestrator(Arc::clone(&client), registry, fast_policy());

        let err = orch.execute(&["other.net"]).await.unwrap_err();
        assert!(matches!(
            err,
            OrderError::Provider(ProviderError::UnservableDomain { .. })
        ));
        assert_eq!(client.orders_created(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_authorization_fails_the_order() {
        let client = Arc::new(MockAcmeClient::new().invalid_for("b.example.com"));
        let registry = http01_registry(&["*"]).await;
        let orch = orchestrator(Arc::clone(&client), registry, fast_policy());

        let err = orch
            .execute(&["a.example.com", "b.example.com"])
            .await
            .unwrap_err();

        match err {
            OrderError::AuthorizationFailed { domain, status, .. } => {
                assert_eq!(domain, "b.example.com");
                assert_eq!(status, AuthorizationStatus::Invalid);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sibling_authorizations_proceed_past_a_provision_failure() {
        let client = Arc::new(MockAcmeClient::new());

        // b.example.com routes to a script provider whose create command
        // fails after a delay; a.example.com validates over http-01 first
        let registry = Arc::new(ProviderRegistry::new());
        registry
            .swap(ProviderConfig {
                providers: vec![
                    ProviderEntry {
                        domains: vec!["b.example.com".to_owned()],
                        settings: ProviderSettings::Dns01Script {
                            create_command: vec![
                                "sh".to_owned(),
                                "-c".to_owned(),
                                "sleep 0.3; exit 1".to_owned(),
                            ],
                            delete_command: vec!["true".to_owned()],
                            environment: Default::default(),
                            timeout_secs: 5,
                        },
                    },
                    ProviderEntry {
                        domains: vec!["*".to_owned()],
                        settings: ProviderSettings::Http01 {},
                    },
                ],
                dns_checker: Some(DnsCheckerConfig::skip_fallback(0)),
            })
            .await
            .unwrap();

        let orch = orchestrator(Arc::clone(&client), registry, fast_policy());
        let err = orch
            .execute(&["a.example.com", "b.example.com"])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrderError::Provider(ProviderError::Script { .. })
        ));
        // the sibling was not dragged down before its validation request
        assert!(client.validated("a.example.com"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn order_is_abandoned_at_the_deadline() {
        let client = Arc::new(MockAcmeClient::new().hold_pending());
        let registry = http01_registry(&["*"]).await;

        let policy = RetryPolicy {
            max_attempts: 100,
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(20),
            order_deadline: Duration::from_millis(150),
        };
        let orch = orchestrator(Arc::clone(&client), registry, policy);

        let err = orch.execute(&["a.example.com"]).await.unwrap_err();
        assert!(matches!(err, OrderError::DeadlineExceeded(_)));
    }

    /// Counts provision/deprovision pairs so tests can assert no residue.
    #[derive(Default)]
    struct CountingProvider {
        provisions: AtomicU32,
        deprovisions: AtomicU32,
    }

    #[async_trait]
    impl crate::challenge::ChallengeProvider for CountingProvider {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn challenge_type(&self) -> ChallengeType {
            ChallengeType::Http01
        }

        async fn provision(&self, _: &str, _: &str, _: &str) -> Result<(), ProviderError> {
            self.provisions.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn deprovision(&self, _: &str, _: &str, _: &str) -> Result<(), ProviderError> {
            self.deprovisions.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn counting_registry() -> (Arc<ProviderRegistry>, Arc<CountingProvider>) {
        use crate::config::DomainMatcher;
        use crate::registry::Rule;

        let provider = Arc::new(CountingProvider::default());
        let registry = Arc::new(ProviderRegistry::new());

        let handle = Arc::clone(&provider);
        registry
            .swap_with(
                ProviderConfig {
                    providers: vec![ProviderEntry {
                        domains: vec!["*".to_owned()],
                        settings: ProviderSettings::Http01 {},
                    }],
                    dns_checker: None,
                },
                move |_| {
                    Ok(vec![Rule {
                        matchers: vec![DomainMatcher::Any],
                        provider: handle.clone(),
                    }])
                },
            )
            .await
            .unwrap();

        (registry, provider)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn challenge_resources_are_torn_down_after_failure() {
        let (registry, provider) = counting_registry().await;
        let client = Arc::new(MockAcmeClient::new().invalid_for("a.example.com"));
        let orch = orchestrator(Arc::clone(&client), registry, fast_policy());

        orch.execute(&["a.example.com"]).await.unwrap_err();

        let p = provider.provisions.load(Ordering::SeqCst);
        let d = provider.deprovisions.load(Ordering::SeqCst);
        assert_eq!(p, 1);
        assert_eq!(d, p, "every provisioned resource must be deprovisioned");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deadline_abandoned_order_still_deprovisions() {
        let (registry, provider) = counting_registry().await;
        // authorizations never leave pending, so only the deadline ends this
        let client = Arc::new(MockAcmeClient::new().hold_pending());

        let policy = RetryPolicy {
            max_attempts: 100,
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(20),
            order_deadline: Duration::from_millis(300),
        };
        let orch = orchestrator(Arc::clone(&client), registry, policy);

        let err = orch.execute(&["a.example.com"]).await.unwrap_err();
        assert!(matches!(err, OrderError::DeadlineExceeded(_)));

        let p = provider.provisions.load(Ordering::SeqCst);
        let d = provider.deprovisions.load(Ordering::SeqCst);
        assert_eq!(p, 1);
        assert_eq!(
            d, p,
            "deadline-abandoned order must still deprovision its resources"
        );
    }
}
