//! TCP listener with port recovery.
//!
//! # Responsibilities
//! - Bind the plain listener, walking forward past occupied ports
//! - Bind the optional TLS listener on its exact port
//! - Accept incoming TCP connections and hand them to the worker pool
//! - Graceful handling of accept errors
//!
//! # Design Decisions
//! - Port search is bounded; an exhausted range is fatal to the caller
//! - The accept loop returns its socket instead of closing it, so the
//!   coordinator decides when the port is released

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;

use super::connection::{IncomingConnection, Transport};
use super::tls::load_tls_acceptor;
use crate::config::TlsConfig;
use crate::lifecycle;
use crate::pool::WorkerPool;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
    /// Every port in the retry window was occupied.
    #[error("no free port on {host} between {first} and {last}")]
    PortsExhausted { host: String, first: u16, last: u16 },
    /// Certificate or key could not be loaded.
    #[error("failed to load TLS material: {0}")]
    Tls(#[source] io::Error),
}

/// A bound socket plus what it takes to serve its connections.
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
    tls: Option<TlsAcceptor>,
}

impl Listener {
    /// Bind `host:port`, moving to the next port while the current one is in use.
    ///
    /// At most `attempts` ports are tried. Port 0 asks the OS for any free port.
    pub async fn bind_with_retry(
        host: &str,
        port: u16,
        attempts: u32,
    ) -> Result<Self, ListenerError> {
        let mut candidate = port;
        let mut last_tried = port;

        for _ in 0..attempts.max(1) {
            last_tried = candidate;
            match TcpListener::bind((host, candidate)).await {
                Ok(listener) => {
                    let listener = Self::from_tcp(listener, None, host)?;
                    if candidate != port {
                        tracing::warn!(
                            requested_port = port,
                            port = candidate,
                            "Configured port in use, bound next free port"
                        );
                    }
                    return Ok(listener);
                }
                Err(e) if e.kind() == io::ErrorKind::AddrInUse && port != 0 => {
                    tracing::debug!(port = candidate, "Port in use");
                    match candidate.checked_add(1) {
                        Some(next) => candidate = next,
                        None => break,
                    }
                }
                Err(e) => {
                    return Err(ListenerError::Bind {
                        address: format!("{host}:{candidate}"),
                        source: e,
                    })
                }
            }
        }

        Err(ListenerError::PortsExhausted {
            host: host.to_string(),
            first: port,
            last: last_tried,
        })
    }

    /// Bind the TLS listener on exactly the configured port.
    pub async fn bind_tls(host: &str, config: &TlsConfig) -> Result<Self, ListenerError> {
        let acceptor = load_tls_acceptor(&config.cert_path, &config.key_path)
            .await
            .map_err(ListenerError::Tls)?;

        let listener = TcpListener::bind((host, config.port))
            .await
            .map_err(|e| ListenerError::Bind {
                address: format!("{host}:{}", config.port),
                source: e,
            })?;

        Self::from_tcp(listener, Some(acceptor), host)
    }

    fn from_tcp(
        inner: TcpListener,
        tls: Option<TlsAcceptor>,
        host: &str,
    ) -> Result<Self, ListenerError> {
        let local_addr = inner.local_addr().map_err(|e| ListenerError::Bind {
            address: host.to_string(),
            source: e,
        })?;

        let listener = Self {
            inner,
            local_addr,
            tls,
        };
        tracing::info!(address = %local_addr, transport = %listener.transport(), "Listener bound");
        Ok(listener)
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn transport(&self) -> Transport {
        if self.tls.is_some() {
            Transport::Tls
        } else {
            Transport::Plain
        }
    }

    /// Accept until `stop` flips to true, submitting every socket to `pool`.
    ///
    /// Returns the still-open socket.
    pub async fn run(self, pool: Arc<WorkerPool>, mut stop: watch::Receiver<bool>) -> TcpListener {
        tracing::info!(
            address = %self.local_addr,
            transport = %self.transport(),
            "Accepting connections"
        );

        loop {
            tokio::select! {
                biased;
                _ = lifecycle::triggered(&mut stop) => break,
                accepted = self.inner.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        tracing::trace!(peer_addr = %peer_addr, "Connection accepted");
                        pool.submit(IncomingConnection::new(stream, peer_addr, self.tls.clone()));
                    }
                    Err(e) => {
                        // EMFILE and friends: back off instead of spinning.
                        tracing::warn!(error = %e, address = %self.local_addr, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },
            }
        }

        tracing::info!(address = %self.local_addr, "Stopped accepting connections");
        self.inner
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("local_addr", &self.local_addr)
            .field("transport", &self.transport())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn occupied_port_moves_to_next() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = occupied.local_addr().unwrap().port();

        let listener = Listener::bind_with_retry("127.0.0.1", port, 16).await.unwrap();
        assert!(listener.local_addr().port() > port);
        assert_eq!(listener.transport(), Transport::Plain);
    }

    #[tokio::test]
    async fn single_attempt_on_occupied_port_fails() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = occupied.local_addr().unwrap().port();

        let err = Listener::bind_with_retry("127.0.0.1", port, 1).await.unwrap_err();
        assert!(matches!(
            err,
            ListenerError::PortsExhausted { first, last, .. } if first == port && last == port
        ));
    }

    #[tokio::test]
    async fn port_zero_binds_ephemeral() {
        let listener = Listener::bind_with_retry("127.0.0.1", 0, 1).await.unwrap();
        assert_ne!(listener.local_addr().port(), 0);
    }
}
