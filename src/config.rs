use std::time::Duration;

use crate::store::TransitionPolicy;

/// Configuration for a [`JobSync`](crate::JobSync) session.
///
/// Use [`SyncConfig::builder()`] for ergonomic construction, or
/// [`SyncConfig::new()`] for defaults against one endpoint.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the job backend, e.g. `http://127.0.0.1:8000`.
    pub endpoint: String,

    /// Delay between event stream reconnect attempts. A server `retry:`
    /// field overrides it.
    pub reconnect_delay: Duration,

    /// How stream events are applied to known jobs.
    pub transition_policy: TransitionPolicy,

    /// Reload the snapshot every time the stream reconnects, to pick up
    /// events missed while it was down.
    pub resync_on_reconnect: bool,

    /// Custom HTTP client (timeouts, TLS, pooling). `None` = reqwest defaults.
    pub http_client: Option<reqwest::Client>,
}

impl SyncConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            reconnect_delay: Duration::from_secs(3),
            transition_policy: TransitionPolicy::default(),
            resync_on_reconnect: true,
            http_client: None,
        }
    }

    /// Start building a config with the builder pattern.
    pub fn builder(endpoint: impl Into<String>) -> SyncConfigBuilder {
        SyncConfigBuilder {
            config: SyncConfig::new(endpoint),
        }
    }
}

/// Builder for [`SyncConfig`].
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    /// Set the delay between event stream reconnect attempts.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    /// Choose how stream events are applied.
    pub fn with_transition_policy(mut self, policy: TransitionPolicy) -> Self {
        self.config.transition_policy = policy;
        self
    }

    /// Enable or disable the snapshot reload after a stream reconnect.
    pub fn with_resync_on_reconnect(mut self, enabled: bool) -> Self {
        self.config.resync_on_reconnect = enabled;
        self
    }

    /// Use a preconfigured `reqwest::Client` for both REST calls and the stream.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.config.http_client = Some(client);
        self
    }

    /// Build the final [`SyncConfig`].
    pub fn build(self) -> SyncConfig {
        self.config
    }
}
