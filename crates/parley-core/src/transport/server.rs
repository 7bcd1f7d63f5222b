//! Inbound delivery: the accept loop every peer runs.
//!
//! Server-side exchange, terminal states in brackets:
//!
//! ```text
//! Listening -> Accepted -> Reading -> Decoding -> [Acked-true]
//!                                         \-----> [Acked-false]
//! ```
//!
//! After either terminal state the connection is closed and the loop is
//! back at Listening. A transport error during accept or read is reported
//! and the loop continues; one failed exchange never terminates the
//! server.

use crate::crypto::{HybridCipher, KeyWrap, StaticKeypair, SymmetricCipher};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::protocol::{EncryptedEnvelope, PlainMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// How often the accept loop wakes up to check the running flag.
const ACCEPT_POLL: Duration = Duration::from_secs(1);

/// Receives decrypted messages after a successful inbound exchange.
///
/// A sink failure is translated into the `false` ack for that exchange; it
/// never propagates further.
pub trait MessageSink: Send + Sync {
    /// Take ownership of one inbound message.
    fn accept(&self, message: PlainMessage) -> Result<()>;
}

/// Remote control for a running [`Server`].
#[derive(Debug, Clone)]
pub struct ServerHandle {
    running: Arc<RwLock<bool>>,
}

impl ServerHandle {
    /// Ask the server loop to stop after the current exchange.
    pub async fn shutdown(&self) {
        *self.running.write().await = false;
    }
}

/// The inbound message server.
///
/// Handles one exchange at a time: accept, read one line, decrypt,
/// dispatch, ack, close. The listening socket is owned exclusively by the
/// loop and closed exactly once when [`Server::run`] returns.
pub struct Server {
    listener: TcpListener,
    exchange_timeout: Duration,
    running: Arc<RwLock<bool>>,
}

impl Server {
    /// Bind to the configured host and port.
    pub async fn bind(settings: &Settings) -> Result<Self> {
        Self::bind_to(
            settings.host(),
            settings.port(),
            Duration::from_millis(settings.connection_timeout_ms()),
        )
        .await
    }

    /// Bind to an explicit host and port (port 0 picks a free one).
    pub async fn bind_to(host: &str, port: u16, exchange_timeout: Duration) -> Result<Self> {
        let listener = TcpListener::bind((host, port)).await.map_err(|e| {
            Error::Transport(format!("not able to bind to {}:{}: {}", host, port, e))
        })?;
        Ok(Self {
            listener,
            exchange_timeout,
            running: Arc::new(RwLock::new(true)),
        })
    }

    /// The address the server actually listens on.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// A handle that can stop the loop from another task.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            running: self.running.clone(),
        }
    }

    /// Run the accept loop until the handle asks for shutdown.
    ///
    /// Consumes the server; the listening socket closes when this returns.
    pub async fn run<S, W>(
        self,
        cipher: HybridCipher<S, W>,
        local: StaticKeypair,
        sink: Arc<dyn MessageSink>,
    ) where
        S: SymmetricCipher,
        W: KeyWrap,
    {
        match self.local_addr() {
            Ok(addr) => info!(%addr, "listening for inbound messages"),
            Err(e) => warn!(error = %e, "listening on unknown address"),
        }

        loop {
            {
                let running = self.running.read().await;
                if !*running {
                    break;
                }
            }

            match timeout(ACCEPT_POLL, self.listener.accept()).await {
                // Poll tick so the running flag gets checked.
                Err(_) => continue,
                Ok(Err(e)) => {
                    error!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_POLL).await;
                }
                Ok(Ok((stream, peer_addr))) => {
                    debug!(%peer_addr, "handling inbound exchange");
                    if let Err(e) = self
                        .handle_exchange(stream, &cipher, &local, sink.as_ref())
                        .await
                    {
                        warn!(%peer_addr, error = %e, "error while handling connection");
                    }
                }
            }
        }

        info!("listener stopped");
    }

    /// One complete exchange: read a line, decrypt, dispatch, ack.
    ///
    /// Decrypt and dispatch failures are answered with `false`; only
    /// transport failures bubble up to the loop (which logs and carries
    /// on).
    async fn handle_exchange<S, W>(
        &self,
        mut stream: TcpStream,
        cipher: &HybridCipher<S, W>,
        local: &StaticKeypair,
        sink: &dyn MessageSink,
    ) -> Result<()>
    where
        S: SymmetricCipher,
        W: KeyWrap,
    {
        let (read_half, mut write_half) = stream.split();

        let mut line = String::new();
        let mut reader = BufReader::new(read_half);
        let n = timeout(self.exchange_timeout, reader.read_line(&mut line))
            .await
            .map_err(|_| Error::Timeout)??;
        if n == 0 {
            return Err(Error::Transport(
                "connection closed before a line arrived".into(),
            ));
        }

        let line = line.trim_end_matches(['\r', '\n']);
        debug!(data = %crate::logging::Redacted(&line), bytes = line.len(), "received data");
        let outcome = EncryptedEnvelope::from_wire(line)
            .and_then(|envelope| cipher.decrypt(&envelope, local))
            .and_then(|message| sink.accept(message));

        let ack = match outcome {
            Ok(()) => {
                debug!("inbound message accepted");
                "true\n"
            }
            Err(e) => {
                warn!(error = %e, "inbound message rejected");
                "false\n"
            }
        };
        write_half.write_all(ack.as_bytes()).await?;
        write_half.flush().await?;
        Ok(())
    }
}
