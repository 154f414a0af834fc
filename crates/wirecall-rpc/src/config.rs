use std::time::Duration;

use tracing::Dispatch;
use wirecall_frame::{FrameConfig, DEFAULT_MAX_PAYLOAD};

/// Connection retry schedule.
///
/// Capped exponential backoff with a hard attempt limit and no jitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total connection attempts before giving up. Default: 10.
    pub max_attempts: u32,
    /// Wait after the first failed attempt. Default: 100 ms.
    pub retry_base: Duration,
    /// Ceiling for any single wait. Default: 10 s.
    pub max_retry_interval: Duration,
}

impl RetryPolicy {
    /// Wait after failed attempt number `attempt` (1-based):
    /// `min(max_retry_interval, retry_base * 2^(attempt - 1))`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt.saturating_sub(1))
            .and_then(|factor| self.retry_base.checked_mul(factor))
            .map_or(self.max_retry_interval, |delay| delay.min(self.max_retry_interval))
    }

    /// Attempt limit, never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            retry_base: Duration::from_millis(100),
            max_retry_interval: Duration::from_secs(10),
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Runtime worker threads. Default: 1.
    pub threads: usize,
    /// Connection retry schedule.
    pub retry: RetryPolicy,
    /// Timeout for [`Client::call`](crate::Client::call). Default: 10 s.
    pub call_timeout: Duration,
    /// How long `disconnect` waits for the connection to drain. Default: 5 s.
    pub shutdown_grace: Duration,
    /// Maximum frame payload in either direction. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Where this client's log events go. Default: discarded.
    pub logger: Dispatch,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(5),
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            logger: Dispatch::none(),
        }
    }
}

impl ClientConfig {
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_max_connection_attempts(mut self, attempts: u32) -> Self {
        self.retry.max_attempts = attempts;
        self
    }

    pub fn with_connection_retry_base(mut self, base: Duration) -> Self {
        self.retry.retry_base = base;
        self
    }

    pub fn with_max_retry_interval(mut self, interval: Duration) -> Self {
        self.retry.max_retry_interval = interval;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_max_payload_size(mut self, max: usize) -> Self {
        self.max_payload_size = max;
        self
    }

    /// Send log events to `logger`, e.g. `Dispatch::default()` for the
    /// subscriber that is current on the calling thread.
    pub fn with_logger(mut self, logger: Dispatch) -> Self {
        self.logger = logger;
        self
    }

    pub(crate) fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload_size,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Runtime worker threads. Default: 1.
    pub threads: usize,
    /// How long `stop` waits for open connections to drain. Default: 5 s.
    pub shutdown_grace: Duration,
    /// Maximum frame payload in either direction. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Where this server's log events go. Default: discarded.
    pub logger: Dispatch,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            shutdown_grace: Duration::from_secs(5),
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            logger: Dispatch::none(),
        }
    }
}

impl ServerConfig {
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_max_payload_size(mut self, max: usize) -> Self {
        self.max_payload_size = max;
        self
    }

    pub fn with_logger(mut self, logger: Dispatch) -> Self {
        self.logger = logger;
        self
    }

    pub(crate) fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload_size,
        }
    }
}

pub(crate) fn build_runtime(
    threads: usize,
    thread_name: &'static str,
) -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(threads.max(1))
        .thread_name(thread_name)
        .enable_all()
        .build()
}
