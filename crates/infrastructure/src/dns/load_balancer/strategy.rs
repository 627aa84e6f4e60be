use super::proxy::Proxy;
use dns_forward_domain::ForwardPolicy;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Candidate list for one request; pools hold at most 15 upstreams.
pub type Candidates<'a> = SmallVec<[&'a Arc<Proxy>; 16]>;

/// Orders the pool's proxies for one request.
///
/// The list is walked cyclically from a policy-dependent start, each proxy
/// exactly once. Proxies that are currently down go after the healthy ones,
/// keeping their relative order, so a request still reaches them when
/// everything else fails.
pub struct Selector {
    policy: ForwardPolicy,
    counter: AtomicUsize,
}

impl Selector {
    pub fn new(policy: ForwardPolicy) -> Self {
        Self {
            policy,
            counter: AtomicUsize::new(0),
        }
    }

    pub fn policy(&self) -> ForwardPolicy {
        self.policy
    }

    fn start_index(&self, server_count: usize) -> usize {
        match self.policy {
            ForwardPolicy::Random => fastrand::usize(..server_count),
            ForwardPolicy::RoundRobin => {
                self.counter.fetch_add(1, Ordering::Relaxed) % server_count
            }
            ForwardPolicy::Sequential => 0,
        }
    }

    pub fn order<'a>(&self, proxies: &'a [Arc<Proxy>], max_fails: u32) -> Candidates<'a> {
        if proxies.is_empty() {
            return Candidates::new();
        }

        let start_index = self.start_index(proxies.len());
        let mut healthy = Candidates::new();
        let mut down = Candidates::new();

        for i in 0..proxies.len() {
            let proxy = &proxies[(start_index + i) % proxies.len()];
            if proxy.is_down(max_fails) {
                down.push(proxy);
            } else {
                healthy.push(proxy);
            }
        }

        debug!(
            policy = self.policy.as_str(),
            start_index,
            healthy = healthy.len(),
            down = down.len(),
            "Candidates ordered"
        );

        healthy.extend(down);
        healthy
    }
}
