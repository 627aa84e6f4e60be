use std::time::Duration;

/// Check schedule for the per-upstream health checker.
///
/// An `interval` of zero disables health checks; eligibility then rests on live
/// traffic accounting alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCheckConfig {
    pub interval: Duration,

    pub timeout: Duration,
}

impl HealthCheckConfig {
    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            timeout: default_timeout(),
        }
    }
}

fn default_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_timeout() -> Duration {
    Duration::from_secs(1)
}
