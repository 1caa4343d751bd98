//! Dependency Check - connect, round trip, classify by latency.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::domain::health::HealthCheckResult;
use crate::ports::{DependencyProbe, HealthCheck};

/// Health of one backing dependency reached through a `DependencyProbe`.
///
/// Connection and round-trip errors are returned as `Err` so the retry
/// wrapper can retry them.
pub struct DependencyCheck<P> {
    service: String,
    probe: P,
    degraded_after: Duration,
}

impl<P: DependencyProbe> DependencyCheck<P> {
    pub fn new(service: impl Into<String>, probe: P, degraded_after: Duration) -> Self {
        Self {
            service: service.into(),
            probe,
            degraded_after,
        }
    }
}

#[async_trait]
impl<P: DependencyProbe> HealthCheck for DependencyCheck<P> {
    fn service_name(&self) -> &str {
        &self.service
    }

    async fn perform_check(&self) -> Result<HealthCheckResult> {
        self.probe.connect().await.context("connection failed")?;
        let started = Instant::now();
        self.probe.round_trip().await.context("round trip failed")?;
        let rtt = started.elapsed();

        let rtt_ms = rtt.as_secs_f64() * 1000.0;
        let result = if rtt > self.degraded_after {
            HealthCheckResult::degraded(&self.service, format!("slow round trip ({rtt_ms:.1}ms)"))
        } else {
            HealthCheckResult::healthy(&self.service, "dependency reachable")
        };
        Ok(result
            .with_detail("round_trip_ms", rtt_ms)
            .with_detail("degraded_after_ms", self.degraded_after.as_secs_f64() * 1000.0))
    }
}

/// TCP-level probe with an optional request/expected-reply exchange
/// (e.g. `PING\r\n` / `+PONG` for a Redis-compatible cache).
pub struct TcpProbe {
    address: String,
    exchange: Option<(Vec<u8>, Vec<u8>)>,
    stream: Mutex<Option<TcpStream>>,
}

impl TcpProbe {
    /// Plain connect; the round trip only confirms the socket is open.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            exchange: None,
            stream: Mutex::new(None),
        }
    }

    /// Send `request` and require the reply to start with `expected`.
    #[must_use]
    pub fn with_exchange(mut self, request: impl Into<Vec<u8>>, expected: impl Into<Vec<u8>>) -> Self {
        self.exchange = Some((request.into(), expected.into()));
        self
    }
}

#[async_trait]
impl DependencyProbe for TcpProbe {
    async fn connect(&self) -> Result<()> {
        let stream = TcpStream::connect(&self.address)
            .await
            .with_context(|| format!("connect {}", self.address))?;
        *self.stream.lock().await = Some(stream);
        Ok(())
    }

    async fn round_trip(&self) -> Result<()> {
        let mut guard = self.stream.lock().await;
        let Some(mut stream) = guard.take() else {
            bail!("not connected");
        };
        let Some((request, expected)) = &self.exchange else {
            return Ok(());
        };

        stream.write_all(request).await.context("write probe request")?;
        let mut reply = vec![0u8; expected.len().max(1)];
        let mut read = 0;
        while read < expected.len() {
            let n = stream.read(&mut reply[read..]).await.context("read probe reply")?;
            if n == 0 {
                bail!("connection closed after {read} bytes");
            }
            read += n;
        }
        if !reply.starts_with(expected) {
            bail!("unexpected probe reply");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::health::HealthStatus;
    use tokio::net::TcpListener;

    struct SlowProbe(Duration);

    #[async_trait]
    impl DependencyProbe for SlowProbe {
        async fn connect(&self) -> Result<()> {
            Ok(())
        }

        async fn round_trip(&self) -> Result<()> {
            tokio::time::sleep(self.0).await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_round_trip_is_degraded() {
        let check = DependencyCheck::new("db", SlowProbe(Duration::from_millis(300)), Duration::from_millis(100));
        let result = check.perform_check().await.unwrap();
        assert_eq!(result.status(), HealthStatus::Degraded);

        let fast = DependencyCheck::new("db", SlowProbe(Duration::ZERO), Duration::from_millis(100));
        assert_eq!(fast.perform_check().await.unwrap().status(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_tcp_probe_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 6];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(b"+PONG\r\n").await.unwrap();
        });

        let probe = TcpProbe::new(addr.to_string()).with_exchange(b"PING\r\n".to_vec(), b"+PONG".to_vec());
        let check = DependencyCheck::new("cache", probe, Duration::from_secs(1));
        assert_eq!(check.perform_check().await.unwrap().status(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_refused_connection_is_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let check = DependencyCheck::new("db", TcpProbe::new(addr.to_string()), Duration::from_secs(1));
        let err = check.perform_check().await.unwrap_err();
        assert!(format!("{err:#}").contains("connection failed"));
    }
}
