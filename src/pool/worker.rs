//! A single worker: takes connections off the queue and serves them.

use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{self, HeaderValue};
use futures_util::FutureExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::Request;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use tokio::sync::{mpsc, watch, Mutex};
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use super::WorkItem;
use crate::config::ListenerConfig;
use crate::http::dispatch::Dispatcher;
use crate::http::request::UuidRequestId;
use crate::lifecycle;
use crate::net::Connection;

/// Value of the `Server` response header.
pub const SERVER_NAME: &str = concat!("dispatch-server/", env!("CARGO_PKG_VERSION"));

/// Per-connection protocol settings, fixed for the process lifetime.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub keep_alive: bool,
    pub header_read_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl From<&ListenerConfig> for ConnectionSettings {
    fn from(config: &ListenerConfig) -> Self {
        Self {
            keep_alive: config.keep_alive,
            header_read_timeout: config.header_read_timeout(),
            handshake_timeout: config.handshake_timeout(),
        }
    }
}

pub(crate) struct Worker {
    pub(crate) id: usize,
    pub(crate) queue: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) settings: ConnectionSettings,
    pub(crate) drain: watch::Receiver<bool>,
}

impl Worker {
    /// Serve connections until the queue is closed and empty.
    pub(crate) async fn run(self) {
        tracing::debug!(worker = self.id, "Worker started");

        loop {
            let next = {
                let mut queue = self.queue.lock().await;
                queue.recv().await
            };
            let Some(item) = next else {
                break;
            };

            // A panic here must not cost the pool a worker.
            if AssertUnwindSafe(self.serve(item)).catch_unwind().await.is_err() {
                tracing::error!(worker = self.id, "Connection task panicked, worker continues");
            }
        }

        tracing::debug!(worker = self.id, "Worker stopped");
    }

    async fn serve(&self, item: WorkItem) {
        let queued = item.waited();
        let Connection {
            id,
            stream,
            peer_addr,
            transport,
        } = match item.negotiate(self.settings.handshake_timeout).await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::debug!(worker = self.id, error = %e, "Connection setup failed");
                return;
            }
        };

        let _guard = self.dispatcher.context().connections.track(id);
        tracing::debug!(
            worker = self.id,
            connection_id = %id,
            peer_addr = %peer_addr,
            transport = %transport,
            queued_ms = queued.as_millis() as u64,
            "Serving connection"
        );

        let dispatcher = Arc::clone(&self.dispatcher);
        let service = ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetResponseHeaderLayer::if_not_present(
                header::SERVER,
                HeaderValue::from_static(SERVER_NAME),
            ))
            .service_fn(move |request: Request<Incoming>| {
                let dispatcher = Arc::clone(&dispatcher);
                async move {
                    let response = dispatcher.dispatch(request, peer_addr, transport).await;
                    Ok::<_, Infallible>(response)
                }
            });

        // Picked up after the drain began: answer one request, then close.
        let draining = *self.drain.borrow();

        let mut builder = http1::Builder::new();
        builder
            .timer(TokioTimer::new())
            .keep_alive(self.settings.keep_alive && !draining)
            .header_read_timeout(self.settings.header_read_timeout);

        let conn =
            builder.serve_connection(TokioIo::new(stream), TowerToHyperService::new(service));
        tokio::pin!(conn);

        let result = if draining {
            conn.await
        } else {
            let mut drain = self.drain.clone();
            tokio::select! {
                result = conn.as_mut() => result,
                _ = lifecycle::triggered(&mut drain) => {
                    conn.as_mut().graceful_shutdown();
                    conn.as_mut().await
                }
            }
        };

        if let Err(e) = result {
            tracing::debug!(
                worker = self.id,
                connection_id = %id,
                error = %e,
                "Connection ended with error"
            );
        }
    }
}
