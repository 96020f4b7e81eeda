//! HTTP server setup and lifecycle.
//!
//! # Responsibilities
//! - Own the listeners, the worker pool and the shared context
//! - Start: register built-in routes, bind, warm caches, accept
//! - Stop: stop accepting, drain workers, close sockets, flush caches
//!
//! # Design Decisions
//! - `start` returns once sockets are bound and accepting; serving happens
//!   on spawned tasks
//! - The plain listener is required; a TLS listener that fails to come up is
//!   logged and skipped
//! - Every shutdown step runs even if an earlier one failed

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use super::dispatch::Dispatcher;
use crate::config::ServerConfig;
use crate::context::{BoundAddresses, ServerContext};
use crate::lifecycle::startup::{register_builtin_routes, warm_cache};
use crate::lifecycle::{LifecycleError, LifecycleState, Shutdown};
use crate::net::{Listener, ListenerError};
use crate::pool::{ConnectionSettings, WorkerPool};
use crate::routing::{RouteError, Router};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("failed to register built-in routes: {0}")]
    Routes(#[from] RouteError),
}

/// The server coordinator.
pub struct HttpServer {
    context: ServerContext,
    accept_stop: Shutdown,
    pool: Option<Arc<WorkerPool>>,
    listeners: Vec<JoinHandle<TcpListener>>,
}

impl HttpServer {
    /// Create a server with an empty router.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_router(config, Arc::new(Router::new()))
    }

    /// Create a server around an existing router.
    pub fn with_router(config: ServerConfig, router: Arc<Router>) -> Self {
        Self {
            context: ServerContext::new(config, router),
            accept_stop: Shutdown::new(),
            pool: None,
            listeners: Vec::new(),
        }
    }

    pub fn context(&self) -> &ServerContext {
        &self.context
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.context.router
    }

    pub fn state(&self) -> LifecycleState {
        self.context.lifecycle.current()
    }

    pub fn addresses(&self) -> Option<BoundAddresses> {
        self.context.addresses()
    }

    /// Register built-in routes and log the table. Called by `start` if needed.
    pub fn initialize(&mut self) -> Result<(), ServerError> {
        self.context.lifecycle.transition(LifecycleState::Initialized)?;
        register_builtin_routes(&self.context)?;
        self.context.router.dump();
        Ok(())
    }

    /// Bind, warm caches and begin accepting.
    ///
    /// Fails if the server is already running or stopped, or if no plain
    /// port could be bound.
    pub async fn start(&mut self) -> Result<BoundAddresses, ServerError> {
        if self.state() == LifecycleState::Created {
            self.initialize()?;
        }
        if self.state() != LifecycleState::Initialized {
            return Err(LifecycleError::InvalidTransition {
                from: self.state(),
                to: LifecycleState::Running,
            }
            .into());
        }

        let config = Arc::clone(&self.context.config);
        let listener_config = &config.listener;

        let http = Listener::bind_with_retry(
            &listener_config.host,
            listener_config.port,
            listener_config.port_retry_attempts,
        )
        .await?;

        let https = match &listener_config.tls {
            Some(tls) => match Listener::bind_tls(&listener_config.host, tls).await {
                Ok(listener) => Some(listener),
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        port = tls.port,
                        "HTTPS listener not started, continuing with HTTP only"
                    );
                    None
                }
            },
            None => None,
        };

        warm_cache(&self.context);

        let pool = Arc::new(WorkerPool::start(
            Dispatcher::new(self.context.clone()),
            &config.workers,
            ConnectionSettings::from(listener_config),
        ));

        let addresses = BoundAddresses {
            http: http.local_addr(),
            https: https.as_ref().map(Listener::local_addr),
        };

        for listener in std::iter::once(http).chain(https) {
            let task = listener.run(Arc::clone(&pool), self.accept_stop.subscribe());
            self.listeners.push(tokio::spawn(task));
        }
        self.pool = Some(pool);

        self.context.set_addresses(addresses);
        self.context.lifecycle.transition(LifecycleState::Running)?;

        tracing::info!(
            "Accepting connections on 'http://{}:{}/'",
            config.hostname,
            addresses.http.port()
        );
        if let Some(https) = addresses.https {
            tracing::info!(
                "Accepting connections on 'https://{}:{}/'",
                config.hostname,
                https.port()
            );
        }

        Ok(addresses)
    }

    /// Graceful shutdown. Safe to call on a server that never started.
    pub async fn stop(&mut self) -> Result<(), LifecycleError> {
        match self.state() {
            LifecycleState::Created | LifecycleState::Initialized => {
                self.context.lifecycle.transition(LifecycleState::Stopped)?;
                return Ok(());
            }
            _ => {
                self.context.lifecycle.transition(LifecycleState::Stopping)?;
            }
        }
        tracing::info!("Shutting down");

        // 1. Stop accepting.
        self.accept_stop.trigger();
        let mut sockets = Vec::new();
        for task in self.listeners.drain(..) {
            match task.await {
                Ok(socket) => sockets.push(socket),
                Err(e) => tracing::warn!(error = %e, "Listener task failed during shutdown"),
            }
        }

        // 2. Drain in-flight and queued connections.
        if let Some(pool) = self.pool.take() {
            if !pool.drain(self.context.config.workers.drain_timeout()).await {
                tracing::warn!(
                    active_connections = self.context.connections.active_count(),
                    "Shutdown continued with connections still open"
                );
            }
        }

        // 3. Release the ports.
        for socket in sockets {
            if let Ok(addr) = socket.local_addr() {
                tracing::debug!(address = %addr, "Listener socket closed");
            }
            drop(socket);
        }

        // 4. Flush caches.
        if let Err(e) = self.context.cache.save_to_file() {
            tracing::warn!(error = %e, "Failed to persist response cache");
        }

        self.context.lifecycle.transition(LifecycleState::Stopped)?;
        tracing::info!("Shutdown complete");
        Ok(())
    }

    /// Start, wait for `signal`, then stop.
    pub async fn run_until<F>(mut self, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        signal.await;
        self.stop().await?;
        Ok(())
    }
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("state", &self.state())
            .field("addresses", &self.addresses())
            .finish_non_exhaustive()
    }
}
