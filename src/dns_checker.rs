//! DNS propagation gate for DNS-01 validation.
//!
//! Before the orchestrator asks the ACME server to validate a DNS-01
//! challenge, the checker polls the configured resolvers until every one of
//! them observes the expected TXT value, or the maximum wait elapses. A
//! degraded skip mode sleeps a fixed duration and never queries DNS; it is
//! the fallback when no functioning resolver can be configured.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use hickory_resolver::{
    config::{NameServerConfig, ResolverConfig, ResolverOpts},
    name_server::TokioConnectionProvider,
    proto::xfer::Protocol,
    Resolver, TokioResolver,
};
use tokio::time::Instant;

use crate::config::DnsCheckerConfig;
use crate::error::CheckError;

/// TXT lookup seam. Absent records are `Ok` with no values; only real
/// resolver faults are errors.
#[async_trait]
pub trait TxtLookup: Send + Sync {
    async fn txt(&self, record: &str) -> Result<Vec<String>, CheckError>;
}

/// [`TxtLookup`] backed by one hickory resolver endpoint.
struct HickoryLookup {
    resolver: TokioResolver,
}

#[async_trait]
impl TxtLookup for HickoryLookup {
    async fn txt(&self, record: &str) -> Result<Vec<String>, CheckError> {
        match self.resolver.txt_lookup(record).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|txt| {
                    txt.txt_data()
                        .iter()
                        .map(|data| String::from_utf8_lossy(data))
                        .collect()
                })
                .collect()),
            Err(err) => {
                // NXDOMAIN or an empty answer is the normal state while
                // propagating, only real resolver faults are errors
                let message = err.to_string().to_lowercase();
                if message.contains("no records found")
                    || message.contains("nxdomain")
                    || message.contains("record not found")
                {
                    Ok(Vec::new())
                } else {
                    Err(CheckError::Lookup {
                        record: record.to_owned(),
                        message: err.to_string(),
                    })
                }
            }
        }
    }
}

enum Mode {
    /// Fixed sleep, no DNS queries at all.
    Skip(Duration),
    /// Active polling against every resolver.
    Poll {
        resolvers: Vec<Arc<dyn TxtLookup>>,
        interval: Duration,
        max_wait: Duration,
    },
}

/// Confirms a DNS-01 record is externally observable before validation.
pub struct DnsChecker {
    mode: Mode,
}

impl DnsChecker {
    /// Build a checker from operator configuration.
    ///
    /// All validation happens here: a bad resolver address or nonsensical
    /// timing fails construction, not the first check.
    pub fn from_config(config: &DnsCheckerConfig) -> Result<Self, CheckError> {
        if let Some(wait_secs) = config.skip_wait_secs {
            log::info!("dns checker in skip mode, fixed wait {wait_secs}s");
            return Ok(DnsChecker {
                mode: Mode::Skip(Duration::from_secs(wait_secs)),
            });
        }

        let interval = Duration::from_secs(config.poll_interval_secs);
        let max_wait = Duration::from_secs(config.max_wait_secs);

        if interval.is_zero() || max_wait < interval {
            return Err(CheckError::Construction(format!(
                "poll interval {interval:?} and max wait {max_wait:?} are inconsistent"
            )));
        }

        let mut resolvers: Vec<Arc<dyn TxtLookup>> = Vec::new();
        for addr in &config.resolvers {
            let addr: SocketAddr = addr.parse().map_err(|err| {
                CheckError::Construction(format!("bad resolver address '{addr}': {err}"))
            })?;

            let mut resolver_config = ResolverConfig::new();
            resolver_config.add_name_server(NameServerConfig::new(addr, Protocol::Udp));

            resolvers.push(Arc::new(HickoryLookup {
                resolver: Self::build_resolver(resolver_config),
            }));
        }

        if resolvers.is_empty() {
            // public defaults when the operator names no resolvers
            resolvers.push(Arc::new(HickoryLookup {
                resolver: Self::build_resolver(ResolverConfig::default()),
            }));
        }

        Ok(DnsChecker {
            mode: Mode::Poll {
                resolvers,
                interval,
                max_wait,
            },
        })
    }

    fn build_resolver(resolver_config: ResolverConfig) -> TokioResolver {
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(5);
        opts.attempts = 2;
        // propagation checks must not be answered from cache
        opts.cache_size = 0;

        Resolver::builder_with_config(resolver_config, TokioConnectionProvider::default())
            .with_options(opts)
            .build()
    }

    #[cfg(test)]
    fn poll_with(
        resolvers: Vec<Arc<dyn TxtLookup>>,
        interval: Duration,
        max_wait: Duration,
    ) -> Self {
        DnsChecker {
            mode: Mode::Poll {
                resolvers,
                interval,
                max_wait,
            },
        }
    }

    /// Whether this checker is the degraded fixed-sleep variant.
    pub fn is_skip_mode(&self) -> bool {
        matches!(self.mode, Mode::Skip(_))
    }

    /// Block until `record` carries `expected_value` on every resolver, the
    /// maximum wait elapses, or (in skip mode) the fixed sleep finishes.
    ///
    /// Checks for different records are independent; callers run them
    /// concurrently without coordination.
    pub async fn wait_for_propagation(
        &self,
        record: &str,
        expected_value: &str,
    ) -> Result<(), CheckError> {
        let (resolvers, interval, max_wait) = match &self.mode {
            Mode::Skip(wait) => {
                log::debug!("skip mode: sleeping {wait:?} instead of checking {record}");
                tokio::time::sleep(*wait).await;
                return Ok(());
            }
            Mode::Poll {
                resolvers,
                interval,
                max_wait,
            } => (resolvers, *interval, *max_wait),
        };

        let started = Instant::now();
        let deadline = started + max_wait;

        log::debug!(
            "waiting up to {max_wait:?} for {record} on {} resolver(s)",
            resolvers.len()
        );

        loop {
            if self.observed_everywhere(resolvers, record, expected_value).await {
                log::info!("record {record} propagated after {:?}", started.elapsed());
                return Ok(());
            }

            if Instant::now() + interval > deadline {
                return Err(CheckError::Timeout {
                    record: record.to_owned(),
                    waited: max_wait,
                });
            }

            tokio::time::sleep(interval).await;
        }
    }

    async fn observed_everywhere(
        &self,
        resolvers: &[Arc<dyn TxtLookup>],
        record: &str,
        expected_value: &str,
    ) -> bool {
        for lookup in resolvers {
            match lookup.txt(record).await {
                Ok(values) if values.iter().any(|v| v == expected_value) => {}
                Ok(_) => return false,
                Err(err) => {
                    // transient resolver faults count as "not yet visible"
                    log::warn!("lookup failed for {record}: {err}");
                    return false;
                }
            }
        }
        true
    }
}

impl std::fmt::Debug for DnsChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.mode {
            Mode::Skip(wait) => f.debug_struct("DnsChecker").field("skip", wait).finish(),
            Mode::Poll {
                resolvers,
                interval,
                max_wait,
            } => f
                .debug_struct("DnsChecker")
                .field("resolvers", &resolvers.len())
                .field("interval", interval)
                .field("max_wait", max_wait)
                .finish(),
        }
    }
}
