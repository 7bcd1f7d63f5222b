//! Outbound delivery: one envelope, one connection, one boolean.

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::protocol::EncryptedEnvelope;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// The ack line a server writes after a successful exchange.
const ACK_OK: &str = "true";

/// Pushes encrypted envelopes to peers.
///
/// Fails closed: [`DeliveryClient::send`] returns `false` rather than
/// propagating transport or protocol errors. The configured timeout bounds
/// the connect and the ack-read phases independently.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    timeout: Duration,
}

impl DeliveryClient {
    /// Create a client using the configured connection timeout.
    pub fn new(settings: &Settings) -> Self {
        Self {
            timeout: Duration::from_millis(settings.connection_timeout_ms()),
        }
    }

    /// Deliver one envelope to `addr` and report whether the peer
    /// acknowledged it.
    ///
    /// Opens and closes a connection per call; two calls with the same
    /// envelope are two independent exchanges. Returns `false` for connect
    /// timeouts, write failures, and any ack line other than the literal
    /// `true`.
    pub async fn send(&self, envelope: &EncryptedEnvelope, addr: SocketAddr) -> bool {
        match self.exchange(envelope, addr).await {
            Ok(acked) => acked,
            Err(e) => {
                debug!(%addr, error = %e, "delivery failed");
                false
            }
        }
    }

    async fn exchange(&self, envelope: &EncryptedEnvelope, addr: SocketAddr) -> Result<bool> {
        let stream = timeout(self.timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::Timeout)??;
        let (read_half, mut write_half) = stream.into_split();

        let mut line = envelope.to_wire();
        line.push('\n');
        write_half.write_all(line.as_bytes()).await?;
        write_half.flush().await?;

        let mut ack = String::new();
        let mut reader = BufReader::new(read_half);
        timeout(self.timeout, reader.read_line(&mut ack))
            .await
            .map_err(|_| Error::Timeout)??;

        Ok(ack.trim_end_matches(['\r', '\n']) == ACK_OK)
    }
}

impl Default for DeliveryClient {
    fn default() -> Self {
        Self::new(&Settings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn envelope() -> EncryptedEnvelope {
        EncryptedEnvelope::new("a2V5".into(), "Ym9keQ==".into()).expect("valid envelope")
    }

    async fn one_shot_server(reply: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");
            let mut buf = vec![0u8; 1024];
            let n = stream.read(&mut buf).await.expect("read");
            assert!(n > 0);
            stream.write_all(reply.as_bytes()).await.expect("write");
        });
        addr
    }

    #[tokio::test]
    async fn test_send_acked() {
        let addr = one_shot_server("true\n").await;
        assert!(DeliveryClient::default().send(&envelope(), addr).await);
    }

    #[tokio::test]
    async fn test_send_nacked() {
        let addr = one_shot_server("false\n").await;
        assert!(!DeliveryClient::default().send(&envelope(), addr).await);
    }

    #[tokio::test]
    async fn test_send_rejects_nonliteral_ack() {
        let addr = one_shot_server("TRUE\n").await;
        assert!(!DeliveryClient::default().send(&envelope(), addr).await);
    }

    #[tokio::test]
    async fn test_send_to_dead_port_fails_closed() {
        // Bind then drop to get a port nothing listens on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            listener.local_addr().expect("addr")
        };
        assert!(!DeliveryClient::default().send(&envelope(), addr).await);
    }
}
