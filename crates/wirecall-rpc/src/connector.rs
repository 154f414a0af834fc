use tokio::net::TcpStream;
use tracing::{debug, info, warn};
use wirecall_transport::Endpoint;

use crate::config::RetryPolicy;
use crate::error::{Result, RpcError};

/// Establishes TCP connections, retrying on failure per a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct ConnectionManager {
    policy: RetryPolicy,
}

impl ConnectionManager {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Connect to `endpoint`.
    ///
    /// Waits between attempts are runtime timers. After the last allowed
    /// attempt fails, returns [`RpcError::Connect`] carrying the final
    /// transport error and the number of attempts made.
    pub async fn connect(&self, endpoint: &Endpoint) -> Result<TcpStream> {
        let max_attempts = self.policy.attempts();
        let mut attempt = 1;

        loop {
            match wirecall_transport::connect(endpoint).await {
                Ok(stream) => {
                    info!(%endpoint, attempt, "connection established");
                    return Ok(stream);
                }
                Err(source) if attempt >= max_attempts => {
                    warn!(%endpoint, attempts = attempt, error = %source, "giving up connecting");
                    return Err(RpcError::Connect {
                        endpoint: endpoint.to_string(),
                        attempts: attempt,
                        source,
                    });
                }
                Err(err) => {
                    let delay = self.policy.delay_after(attempt);
                    debug!(%endpoint, attempt, ?delay, error = %err, "connect failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn refusing_endpoint() -> Endpoint {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        Endpoint::from(probe.local_addr().unwrap())
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let manager = ConnectionManager::new(RetryPolicy {
            max_attempts: 3,
            retry_base: Duration::from_millis(20),
            max_retry_interval: Duration::from_secs(1),
        });

        let started = Instant::now();
        let err = manager.connect(&refusing_endpoint()).await.unwrap_err();

        match err {
            RpcError::Connect {
                attempts, source, ..
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(
                    source.io_kind(),
                    Some(std::io::ErrorKind::ConnectionRefused)
                );
            }
            other => panic!("expected connect error, got {other:?}"),
        }
        // 20ms after attempt 1, 40ms after attempt 2.
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn single_attempt_fails_without_waiting() {
        let manager = ConnectionManager::new(RetryPolicy {
            max_attempts: 1,
            retry_base: Duration::from_secs(30),
            max_retry_interval: Duration::from_secs(30),
        });

        let started = Instant::now();
        let err = manager.connect(&refusing_endpoint()).await.unwrap_err();
        assert!(matches!(err, RpcError::Connect { attempts: 1, .. }));
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn connects_once_listener_appears() {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = probe.local_addr().unwrap();
        drop(probe);

        let manager = ConnectionManager::new(RetryPolicy {
            max_attempts: 20,
            retry_base: Duration::from_millis(10),
            max_retry_interval: Duration::from_millis(50),
        });

        let late_listener = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
            let _ = listener.accept().await.unwrap();
        });

        let stream = manager.connect(&Endpoint::from(addr)).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap(), addr);
        late_listener.await.unwrap();
    }
}
