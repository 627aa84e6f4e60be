use super::admission::AdmissionGate;
use super::health::{HealthChecker, ServerHealth};
use super::proxy::{Outcome, Proxy, TlsUpstreamConfig};
use super::query::{query_proxy, ForwardResponse};
use super::strategy::Selector;
use dns_forward_domain::{ConfigError, DomainError, ForwardConfig, Protocol};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The set of upstreams serving one `forward` zone, and the per-request
/// pipeline that sends queries to them.
///
/// Proxies are fixed at construction. Each gets its own health checker, all
/// tied to the pool's shutdown token.
pub struct ProxyPool {
    config: ForwardConfig,
    proxies: Vec<Arc<Proxy>>,
    checkers: Vec<HealthChecker>,
    selector: Selector,
    gate: AdmissionGate,
    shutdown: CancellationToken,
}

impl ProxyPool {
    /// Builds the proxies and starts their health checkers on the current
    /// runtime.
    pub async fn from_config(config: &ForwardConfig) -> Result<Self, DomainError> {
        if config.upstreams.is_empty() {
            return Err(ConfigError::ArgumentCount("forward".to_string()).into());
        }

        let tls = Self::tls_config(config)?;

        let proxies = config
            .upstreams
            .iter()
            .map(|endpoint| {
                Proxy::new(endpoint.clone(), &config.options, config.expire, tls.as_ref())
                    .map(Arc::new)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let shutdown = CancellationToken::new();
        let checkers = proxies
            .iter()
            .filter_map(|proxy| {
                HealthChecker::start(proxy, &config.health_check, config.max_fails, &shutdown)
            })
            .collect::<Vec<_>>();

        info!(
            zone = %config.from,
            upstreams = proxies.len(),
            policy = config.policy.as_str(),
            max_fails = config.max_fails,
            max_concurrent = config.max_concurrent,
            health_checks = checkers.len(),
            "Forwarding pool ready"
        );

        Ok(Self {
            config: config.clone(),
            selector: Selector::new(config.policy),
            gate: AdmissionGate::new(config.max_concurrent),
            proxies,
            checkers,
            shutdown,
        })
    }

    #[cfg(feature = "dns-over-rustls")]
    fn tls_config(config: &ForwardConfig) -> Result<Option<TlsUpstreamConfig>, DomainError> {
        if !config.upstreams.iter().any(|u| u.is_tls()) {
            return Ok(None);
        }
        Ok(Some(TlsUpstreamConfig {
            client_config: crate::dns::transport::build_client_config(&config.tls)?,
            server_name: config.tls_server_name().map(str::to_string),
        }))
    }

    #[cfg(not(feature = "dns-over-rustls"))]
    fn tls_config(_config: &ForwardConfig) -> Result<Option<TlsUpstreamConfig>, DomainError> {
        Ok(None)
    }

    /// Forwards a query that arrived over UDP, without external cancellation.
    pub async fn forward(&self, query: &[u8]) -> Result<ForwardResponse, DomainError> {
        self.forward_with(query, Protocol::Udp, &CancellationToken::new())
            .await
    }

    /// Forwards a client query.
    ///
    /// Candidates are tried one after another until one answers. Transport
    /// failures feed the proxies' failure streaks; the caller only sees
    /// `AdmissionDenied`, `QueryCancelled` or `TransportAllServersUnreachable`.
    pub async fn forward_with(
        &self,
        query: &[u8],
        client_protocol: Protocol,
        cancel: &CancellationToken,
    ) -> Result<ForwardResponse, DomainError> {
        if query.len() < 12 {
            return Err(DomainError::InvalidDnsQuery(
                "query shorter than a DNS header".to_string(),
            ));
        }

        let _permit = self.gate.try_acquire().inspect_err(|_| {
            debug!(limit = self.gate.limit(), "Admission denied");
        })?;

        for proxy in self.selector.order(&self.proxies, self.config.max_fails) {
            let protocol = if proxy.is_tls() {
                Protocol::Tls
            } else {
                self.config.options.negotiate(client_protocol)
            };

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(server = %proxy.addr(), "Query cancelled");
                    return Err(DomainError::QueryCancelled);
                }
                result = query_proxy(proxy, query, protocol, self.config.timeout) => result,
            };

            match result {
                Ok(response) => {
                    proxy.record_outcome(Outcome::Success);
                    debug!(
                        server = %response.server,
                        protocol = %response.protocol,
                        latency_ms = response.latency_ms,
                        "Upstream answered"
                    );
                    return Ok(response);
                }
                Err(e) if !e.is_transport_error() => {
                    debug!(
                        server = %proxy.endpoint(),
                        protocol = %protocol,
                        error = %e,
                        "Attempt failed without charging upstream, trying next"
                    );
                }
                Err(e) => {
                    proxy.record_outcome(Outcome::Failure);
                    warn!(
                        server = %proxy.endpoint(),
                        protocol = %protocol,
                        error = %e,
                        consecutive_failures = proxy.consecutive_failures(),
                        "Upstream attempt failed, trying next"
                    );
                }
            }
        }

        Err(DomainError::TransportAllServersUnreachable)
    }

    pub fn proxies(&self) -> &[Arc<Proxy>] {
        &self.proxies
    }

    pub fn upstream_status(&self) -> Vec<ServerHealth> {
        self.proxies
            .iter()
            .map(|p| p.health(self.config.max_fails))
            .collect()
    }

    /// Queries currently holding an admission permit.
    pub fn in_flight(&self) -> usize {
        self.gate.in_flight()
    }

    pub fn max_fails(&self) -> u32 {
        self.config.max_fails
    }

    pub fn config(&self) -> &ForwardConfig {
        &self.config
    }

    /// Whether `qname` falls inside this pool's zone and outside its
    /// exceptions.
    pub fn is_routable(&self, qname: &str) -> bool {
        self.config.is_routable(qname)
    }

    /// Stops every health checker and closes cached connections. Idempotent.
    pub fn close(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        for checker in &self.checkers {
            checker.stop();
        }
        for proxy in &self.proxies {
            proxy.close();
        }
        info!(zone = %self.config.from, "Forwarding pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for ProxyPool {
    fn drop(&mut self) {
        self.close();
    }
}
