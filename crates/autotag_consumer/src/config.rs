//! Command-line and environment configuration.

use clap::builder::TypedValueParser;
use autotag_logging::LogFormat;
use autotag_protocol::defaults;
use autotag_repository::{RepositoryConfig, RepositoryError};
use autotag_worker::RetryConfig;
use std::time::Duration;

use crate::connection::BrokerConfig;

#[derive(clap::Parser, Clone)]
#[command(
    name = "autotag-consumer",
    about = "Consume repository events and run tagging and package jobs"
)]
pub struct ConsumerArgs {
    /// Broker host
    #[arg(long, env = "ACTIVEMQ_HOST", default_value = defaults::DEFAULT_BROKER_HOST)]
    pub broker_host: String,

    /// Broker STOMP port
    #[arg(long, env = "ACTIVEMQ_PORT", default_value_t = defaults::DEFAULT_BROKER_PORT)]
    pub broker_port: u16,

    #[arg(long, env = "ACTIVEMQ_USER")]
    pub broker_user: Option<String>,

    #[arg(long, env = "ACTIVEMQ_PASSWORD", hide_env_values = true)]
    pub broker_password: Option<String>,

    /// Queue destination to subscribe to
    #[arg(long, env = "ACTIVEMQ_QUEUE", default_value = defaults::DEFAULT_QUEUE)]
    pub queue: String,

    /// Unacknowledged messages the broker may push ahead
    #[arg(
        long,
        env = "ACTIVEMQ_PREFETCH",
        default_value_t = defaults::DEFAULT_PREFETCH,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub prefetch: u32,

    /// Outgoing heart-beat interval in milliseconds (0 disables)
    #[arg(long, env = "ACTIVEMQ_HEARTBEAT_OUT", default_value_t = defaults::DEFAULT_HEARTBEAT_OUT_MS)]
    pub heartbeat_out_ms: u64,

    /// Expected incoming heart-beat interval in milliseconds (0 disables)
    #[arg(long, env = "ACTIVEMQ_HEARTBEAT_IN", default_value_t = defaults::DEFAULT_HEARTBEAT_IN_MS)]
    pub heartbeat_in_ms: u64,

    /// Idempotency store
    #[arg(long, env = "REDIS_URL", default_value = defaults::DEFAULT_REDIS_URL)]
    pub redis_url: String,

    /// Repository server root, e.g. http://alfresco:8080
    #[arg(long, env = "ALFRESCO_BASE_URL")]
    pub repository_url: String,

    #[arg(long, env = "ALFRESCO_USERNAME")]
    pub repository_user: String,

    #[arg(long, env = "ALFRESCO_PASSWORD", hide_env_values = true)]
    pub repository_password: String,

    /// Seconds to wait for a dispatched job before leaving the message unacknowledged
    #[arg(long, env = "WORKER_TIMEOUT", default_value_t = defaults::DEFAULT_JOB_TIMEOUT_SECS)]
    pub worker_timeout_secs: u64,

    /// Jobs executed at once
    #[arg(
        long,
        env = "WORKER_CONCURRENCY",
        default_value_t = defaults::DEFAULT_WORKER_CONCURRENCY,
        value_parser = clap::value_parser!(u64).range(1..).map(|n| n as usize)
    )]
    pub worker_concurrency: usize,

    /// Retries after a transient job failure
    #[arg(long, env = "WORKER_MAX_RETRIES", default_value_t = defaults::DEFAULT_MAX_RETRIES)]
    pub worker_max_retries: u32,

    /// Seconds an idempotency marker is kept (0 or unset: forever)
    #[arg(long, env = "IDEMPOTENCY_TTL")]
    pub idempotency_ttl_secs: Option<u64>,

    /// trace, debug, info, warn or error
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// text or json
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,
}

impl std::fmt::Debug for ConsumerArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("ConsumerArgs")
            .field("broker_host", &self.broker_host)
            .field("broker_port", &self.broker_port)
            .field("broker_user", &self.broker_user)
            .field("broker_password", &redacted(&self.broker_password))
            .field("queue", &self.queue)
            .field("prefetch", &self.prefetch)
            .field("heartbeat_out_ms", &self.heartbeat_out_ms)
            .field("heartbeat_in_ms", &self.heartbeat_in_ms)
            .field("redis_url", &self.redis_url)
            .field("repository_url", &self.repository_url)
            .field("repository_user", &self.repository_user)
            .field("repository_password", &"[REDACTED]")
            .field("worker_timeout_secs", &self.worker_timeout_secs)
            .field("worker_concurrency", &self.worker_concurrency)
            .field("worker_max_retries", &self.worker_max_retries)
            .field("idempotency_ttl_secs", &self.idempotency_ttl_secs)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl ConsumerArgs {
    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            host: self.broker_host.clone(),
            port: self.broker_port,
            login: self.broker_user.clone(),
            passcode: self.broker_password.clone(),
            destination: self.queue.clone(),
            subscription_id: defaults::DEFAULT_SUBSCRIPTION_ID.to_string(),
            prefetch: self.prefetch,
            heartbeat_out: Duration::from_millis(self.heartbeat_out_ms),
            heartbeat_in: Duration::from_millis(self.heartbeat_in_ms),
        }
    }

    pub fn repository_config(&self) -> Result<RepositoryConfig, RepositoryError> {
        RepositoryConfig::new(
            &self.repository_url,
            self.repository_user.as_str(),
            self.repository_password.as_str(),
        )
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::default().with_max_retries(self.worker_max_retries)
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout_secs)
    }

    pub fn idempotency_ttl(&self) -> Option<Duration> {
        self.idempotency_ttl_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
