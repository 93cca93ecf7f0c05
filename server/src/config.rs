use std::time::Duration;

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Runtime configuration, read once at startup. Database settings live in
/// [`crate::db::DbConfig`].
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// How long an OFFLINE operator keeps their allocated conversations.
    pub grace_period: Duration,
    /// Sweep cadence of the grace reclaimer.
    pub grace_reclaim_interval: Duration,
    /// Max tickets processed per reclaimer tick.
    pub grace_reclaim_batch_size: i64,
    /// Lifetime of cached idempotent responses.
    pub idempotency_ttl: Duration,
    /// Cadence of the idempotency reaper.
    pub idempotency_cleanup_interval: Duration,
    /// Max records deleted per reaper tick.
    pub idempotency_cleanup_batch_size: i64,
    /// Per-request deadline enforced by the HTTP layer.
    pub request_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            grace_period: Duration::from_secs(env_u64("GRACE_PERIOD_SECS", 300)),
            grace_reclaim_interval: Duration::from_secs(env_u64("GRACE_RECLAIM_INTERVAL_SECS", 30)),
            grace_reclaim_batch_size: env_u64("GRACE_RECLAIM_BATCH_SIZE", 100) as i64,
            idempotency_ttl: Duration::from_secs(env_u64("IDEMPOTENCY_TTL_SECS", 24 * 3600)),
            idempotency_cleanup_interval: Duration::from_secs(env_u64(
                "IDEMPOTENCY_CLEANUP_INTERVAL_SECS",
                3600,
            )),
            idempotency_cleanup_batch_size: env_u64("IDEMPOTENCY_CLEANUP_BATCH_SIZE", 1000) as i64,
            request_timeout: Duration::from_secs(env_u64("REQUEST_TIMEOUT_SECS", 30)),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
