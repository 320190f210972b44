//! Environment-driven configuration for the bus/task/workflow subsystems,
//! `lazy_static!`-backed the same way `graph::components::store`'s
//! `SUBSCRIPTION_THROTTLE_INTERVAL` / `LARGE_NOTIFICATION_CLEANUP_INTERVAL`
//! derive their defaults from the environment.

use std::time::Duration;

lazy_static! {
    static ref DEFAULT_TASK_RETRY_LIMIT: usize = std::env::var("INVGRAPH_TASK_RETRY_LIMIT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3);
    static ref DEFAULT_SUBSCRIPTION_TIMEOUT: Duration = std::env::var("INVGRAPH_SUBSCRIPTION_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(60));
    static ref DEFAULT_MERGE_SUBSCRIPTION_THROTTLE: Duration = std::env::var("INVGRAPH_MERGE_SUBSCRIPTION_THROTTLE_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(200));
}

/// Runtime configuration for the bus and task subsystems.
#[derive(Clone, Debug)]
pub struct Config {
    /// How many times a worker task is retried before it is failed
    /// outright (resolved to 3 by default).
    pub task_retry_limit: usize,
    /// How long a subscriber channel may remain idle before it is
    /// considered stale.
    pub subscription_timeout: Duration,
    /// Minimum interval between successive merge-completion notifications
    /// sent to a single subscriber, throttling bursty syncs.
    pub merge_subscription_throttle: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            task_retry_limit: *DEFAULT_TASK_RETRY_LIMIT,
            subscription_timeout: *DEFAULT_SUBSCRIPTION_TIMEOUT,
            merge_subscription_throttle: *DEFAULT_MERGE_SUBSCRIPTION_THROTTLE,
        }
    }
}

#[test]
fn default_config_uses_documented_defaults_absent_env_overrides() {
    let config = Config::default();
    assert!(config.task_retry_limit >= 1);
    assert!(config.subscription_timeout >= Duration::from_secs(1));
}
