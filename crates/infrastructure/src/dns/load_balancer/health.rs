use super::proxy::{Outcome, Proxy};
use crate::dns::forwarding::MessageBuilder;
use dns_forward_domain::{DomainError, HealthCheckConfig};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Healthy,
    Unhealthy,
}

/// Point-in-time view of one upstream.
#[derive(Debug, Clone)]
pub struct ServerHealth {
    pub server: Arc<str>,
    pub status: ServerStatus,
    pub consecutive_failures: u32,
    pub in_flight: usize,
}

/// Background liveness loop for a single proxy.
///
/// Every interval it sends `. IN NS` and records the outcome on the proxy.
/// Checks never overlap: the next tick waits for the current one, and ticks
/// missed meanwhile are skipped. The loop only holds a `Weak` reference, so it
/// also ends once the proxy is gone.
pub struct HealthChecker {
    token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl HealthChecker {
    /// Spawns the loop on the current runtime. `None` when the configured
    /// interval is zero.
    pub fn start(
        proxy: &Arc<Proxy>,
        config: &HealthCheckConfig,
        max_fails: u32,
        shutdown: &CancellationToken,
    ) -> Option<Self> {
        if !config.is_enabled() {
            debug!(server = %proxy.endpoint(), "Health checking disabled");
            return None;
        }

        let token = shutdown.child_token();
        let handle = tokio::spawn(run(
            Arc::downgrade(proxy),
            config.interval,
            config.timeout,
            max_fails,
            token.clone(),
        ));

        Some(Self {
            token,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Stops the loop. Safe to call any number of times.
    pub fn stop(&self) {
        self.token.cancel();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for HealthChecker {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(
    proxy: Weak<Proxy>,
    period: Duration,
    timeout: Duration,
    max_fails: u32,
    token: CancellationToken,
) {
    let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(proxy) = proxy.upgrade() else {
            break;
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = check(&proxy, timeout, max_fails) => {}
        }
    }

    debug!("Health checker stopped");
}

async fn check(proxy: &Proxy, timeout: Duration, max_fails: u32) {
    let was_down = proxy.is_down(max_fails);
    let start = Instant::now();

    match check_once(proxy, timeout).await {
        Ok(()) => {
            proxy.record_outcome(Outcome::Success);
            debug!(
                server = %proxy.endpoint(),
                latency_ms = start.elapsed().as_millis() as u64,
                "Health check: OK"
            );
            if was_down {
                info!(server = %proxy.endpoint(), "Server marked HEALTHY");
            }
        }
        Err(e) => {
            proxy.record_outcome(Outcome::Failure);
            warn!(server = %proxy.endpoint(), error = %e, "Health check: FAILED");
            if !was_down && proxy.is_down(max_fails) {
                warn!(server = %proxy.endpoint(), "Server marked UNHEALTHY");
            }
        }
    }
}

/// Sends one health-check query over the proxy's check protocol. Any well-formed reply
/// counts as reachable, whatever its rcode.
pub async fn check_once(proxy: &Proxy, timeout: Duration) -> Result<(), DomainError> {
    let query = MessageBuilder::build_health_query(proxy.health_check_recursion_desired())?;
    proxy
        .exchange(&query, proxy.health_check_protocol(), timeout)
        .await
        .map(|_| ())
}
